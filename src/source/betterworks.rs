//! BetterWorks：按目标 ID 逐个取数，沿 children 指针递归展开
//!
//! API 中所有条目都叫 goal，不论界面上显示为目标还是关键结果。

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;

use super::{get_json, http_client, id_from_value, RecordSource, SourceConfig, SourceError};
use crate::model::builder::{ExpandableRecord, SourceRecord};
use crate::model::rooted_tree::{Attributes, NodeId};

#[derive(Debug, Deserialize)]
struct GoalPayload {
    id: Option<Value>,
    name: Option<String>,
    #[serde(default)]
    children: Option<Vec<GoalRef>>,
    #[serde(default)]
    is_key_result: Option<bool>,
    parent: Option<GoalRef>,
    owner: Option<GoalOwner>,
    start: Option<Value>,
    end: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GoalRef {
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GoalOwner {
    user: Option<GoalUser>,
}

#[derive(Debug, Deserialize)]
struct GoalUser {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoalPage {
    #[serde(default)]
    results: Vec<GoalRef>,
    #[serde(default)]
    more: bool,
    #[serde(rename = "nextURL")]
    next_url: Option<String>,
}

/// BetterWorks 目标的部分字段
#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: NodeId,
    pub name: String,
    /// None 表示没有父目标
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub owner: String,
    pub start: Value,
    pub end: Value,
    pub node_type: &'static str,
}

impl Goal {
    pub fn from_value(value: Value) -> Result<Self, SourceError> {
        let payload: GoalPayload = serde_json::from_value(value)
            .map_err(|e| SourceError::MissingData(format!("目标返回格式异常: {}", e)))?;
        let id = payload
            .id
            .as_ref()
            .and_then(id_from_value)
            .ok_or_else(|| SourceError::MissingData("目标缺少 id".into()))?;
        let children = payload
            .children
            .unwrap_or_default()
            .iter()
            .filter_map(|c| c.id.as_ref().and_then(id_from_value))
            .collect();
        let owner = payload
            .owner
            .and_then(|o| o.user)
            .and_then(|u| u.name)
            .unwrap_or_default();
        let node_type = if payload.is_key_result.unwrap_or(false) {
            "Key Result"
        } else {
            "Objective"
        };
        Ok(Self {
            name: payload.name.unwrap_or_else(|| "no name".to_string()),
            parent_id: payload.parent.and_then(|p| p.id.as_ref().and_then(id_from_value)),
            id,
            children,
            owner,
            start: payload.start.unwrap_or(Value::Null),
            end: payload.end.unwrap_or(Value::Null),
            node_type,
        })
    }

    /// 属性包：没有父目标时 parent_id 记为根标识
    pub fn attributes(&self) -> Attributes {
        let parent = self.parent_id.clone().unwrap_or(NodeId::ROOT);
        let mut data = Attributes::new();
        data.insert("id".into(), id_to_value(&self.id));
        data.insert("name".into(), Value::String(self.name.clone()));
        data.insert("node_type".into(), Value::String(self.node_type.to_string()));
        data.insert("parent_id".into(), id_to_value(&parent));
        data.insert("owner".into(), Value::String(self.owner.clone()));
        data.insert("start".into(), self.start.clone());
        data.insert("end".into(), self.end.clone());
        data
    }

    pub fn into_record(self) -> ExpandableRecord {
        let data = self.attributes();
        ExpandableRecord {
            record: SourceRecord {
                id: self.id,
                label: self.name,
                parent: self.parent_id,
                data,
            },
            children: self.children,
        }
    }
}

fn id_to_value(id: &NodeId) -> Value {
    match id {
        NodeId::Number(n) => Value::from(*n),
        NodeId::Text(s) => Value::String(s.clone()),
    }
}

pub struct BetterWorksClient {
    http: Client,
    token: String,
    api_url: String,
}

impl BetterWorksClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            token: config.betterworks_token()?.to_string(),
            http: http_client(config)?,
            api_url: config.betterworks_api_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        tracing::debug!("请求 {}", url);
        self.http
            .get(url)
            .header(AUTHORIZATION, format!("APIToken {}", self.token))
    }

    pub fn fetch_goal(&self, goal_id: &NodeId) -> Result<Goal, SourceError> {
        let url = format!("{}/goals/{}/", self.api_url, goal_id);
        Goal::from_value(get_json(self.get(&url))?)
    }

    /// 某用户拥有的全部目标 ID；每页最多 30 条，按 more + nextURL 翻页
    pub fn goals_for_user(&self, user_id: &NodeId) -> Result<Vec<NodeId>, SourceError> {
        let first = format!("{}/goals/filter", self.api_url);
        let mut request = self.get(&first).query(&[("owner", user_id.to_string())]);
        let mut goal_ids = Vec::new();
        loop {
            let page: GoalPage = serde_json::from_value(get_json(request)?)
                .map_err(|e| SourceError::MissingData(format!("目标搜索返回格式异常: {}", e)))?;
            goal_ids.extend(page.results.iter().filter_map(|g| g.id.as_ref().and_then(id_from_value)));
            match page.next_url {
                Some(next) if page.more && !next.is_empty() => request = self.get(&next),
                _ => break,
            }
        }
        if goal_ids.is_empty() {
            tracing::warn!("用户 {} 没有任何目标", user_id);
        }
        Ok(goal_ids)
    }

    /// 按邮箱或用户 ID 查找用户，返回 (用户ID, 姓名)
    pub fn lookup_user(&self, user: &str) -> Result<(NodeId, String), SourceError> {
        let url = format!("{}/users/{}", self.api_url, user);
        let body = get_json(self.get(&url))?;
        let id = body
            .get("id")
            .and_then(id_from_value)
            .ok_or_else(|| SourceError::MissingData(format!("用户 {} 缺少 id", user)))?;
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(user)
            .to_string();
        Ok((id, name))
    }
}

impl RecordSource for BetterWorksClient {
    fn fetch(&self, id: &NodeId) -> Result<ExpandableRecord, SourceError> {
        Ok(self.fetch_goal(id)?.into_record())
    }
}
