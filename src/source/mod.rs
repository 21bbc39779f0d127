//! 远程数据源：Airtable 表格与 BetterWorks 目标
//!
//! 负责分页取数并把各自的字段映射成 `SourceRecord`，树本身对字段名一无所知。

pub mod airtable;
pub mod betterworks;
pub mod config;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::model::builder::ExpandableRecord;
use crate::model::rooted_tree::NodeId;

pub use config::SourceConfig;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API返回错误 {status}: {body}")]
    Api { status: u16, body: String },
    #[error("缺少数据: {0}")]
    MissingData(String),
    #[error("缺少凭据: {0}，请在命令行或环境变量中提供")]
    MissingCredential(&'static str),
}

/// 可按标识逐个取回记录的数据源（递归展开用）
pub trait RecordSource {
    fn fetch(&self, id: &NodeId) -> Result<ExpandableRecord, SourceError>;
}

pub(crate) fn http_client(config: &SourceConfig) -> Result<Client, SourceError> {
    Ok(Client::builder().timeout(config.timeout).build()?)
}

/// 发送请求并解析 JSON；404 视为数据缺失
pub(crate) fn get_json(request: RequestBuilder) -> Result<Value, SourceError> {
    let response = request.send()?;
    let status = response.status();
    let url = response.url().to_string();
    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::MissingData(format!("{} 返回 404", url)));
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SourceError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json()?)
}

/// 把 JSON 中的数字或字符串解析为节点标识
pub(crate) fn id_from_value(value: &Value) -> Option<NodeId> {
    match value {
        Value::Number(n) => n.as_i64().map(NodeId::Number),
        Value::String(s) if !s.trim().is_empty() => Some(NodeId::parse(s)),
        _ => None,
    }
}
