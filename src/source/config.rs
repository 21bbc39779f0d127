//! 数据源配置：凭据与 API 地址，显式传入各客户端

use std::time::Duration;

use super::SourceError;

pub const AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";
pub const BETTERWORKS_API_URL: &str = "https://app.betterworks.com/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub airtable_api_key: Option<String>,
    pub betterworks_api_token: Option<String>,
    pub airtable_api_url: String,
    pub betterworks_api_url: String,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            airtable_api_key: None,
            betterworks_api_token: None,
            airtable_api_url: AIRTABLE_API_URL.to_string(),
            betterworks_api_url: BETTERWORKS_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SourceConfig {
    pub fn airtable_key(&self) -> Result<&str, SourceError> {
        non_empty(self.airtable_api_key.as_deref()).ok_or(SourceError::MissingCredential("AIRTABLE_API_KEY"))
    }

    pub fn betterworks_token(&self) -> Result<&str, SourceError> {
        non_empty(self.betterworks_api_token.as_deref())
            .ok_or(SourceError::MissingCredential("BETTERWORKS_API_TOKEN"))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
