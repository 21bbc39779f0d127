//! 层级重塑：标签键控的嵌套 JSON → d3 风格的 `name`/`children` 层级
//!
//! 输入（树的 SerializedNode 输出）：
//! `{"root": {"children": [{"Priority: Brand": {"data": {...}}}]}}`
//!
//! 输出：
//! `{"name": "root", "children": [{"name": "Priority: Brand", "data": {...}}]}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// owner 前缀在重载名称中保留的字符数
const OWNER_PREFIX_CHARS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReshapeError {
    #[error("节点格式错误（深度 {depth}）: {reason}")]
    MalformedNode { depth: usize, reason: String },
}

impl ReshapeError {
    fn malformed(depth: usize, reason: impl Into<String>) -> Self {
        Self::MalformedNode {
            depth,
            reason: reason.into(),
        }
    }
}

/// 展示策略
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReshapeOptions {
    /// 名称最多保留的字符数；None 或 0 表示不截断
    pub trim_length: Option<usize>,
    /// 深度达到该值的节点不再输出子节点（根为 0）
    pub max_depth: Option<usize>,
    /// 在名称前加上类型首字母和 owner 前缀
    pub overload_name: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReshapedNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ReshapedNode>>,
}

impl ReshapedNode {
    /// 子树节点总数（含自身）
    pub fn count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(ReshapedNode::count)
            .sum::<usize>()
    }
}

/// 将 SerializedNode 重塑为 ReshapedNode；不修改输入
pub fn reshape(node: &Value, options: &ReshapeOptions) -> Result<ReshapedNode, ReshapeError> {
    reshape_at(node, options, 0)
}

fn reshape_at(node: &Value, options: &ReshapeOptions, depth: usize) -> Result<ReshapedNode, ReshapeError> {
    let (label, body) = single_entry(node, depth)?;

    let mut name = match options.trim_length.filter(|limit| *limit > 0) {
        Some(limit) => label.chars().take(limit).collect(),
        None => label.to_string(),
    };

    let data = body.get("data").filter(|d| !d.is_null()).cloned();
    if options.overload_name {
        if let Some(data) = &data {
            name = overload(&name, data);
        }
    }

    let children = match body.get("children") {
        None | Some(Value::Null) => None,
        Some(Value::Array(list)) if list.is_empty() => None,
        Some(Value::Array(_)) if options.max_depth.is_some_and(|max| depth >= max) => {
            tracing::debug!("在深度 {} 截断 \"{}\" 的子节点", depth, label);
            None
        }
        Some(Value::Array(list)) => Some(
            list.iter()
                .map(|child| reshape_at(child, options, depth + 1))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(other) => {
            return Err(ReshapeError::malformed(
                depth,
                format!("\"{}\" 的 children 不是数组: {}", label, other),
            ))
        }
    };

    Ok(ReshapedNode { name, data, children })
}

/// 取出唯一的 标签 → 内容 键值对
fn single_entry(node: &Value, depth: usize) -> Result<(&str, &Map<String, Value>), ReshapeError> {
    let map = node
        .as_object()
        .ok_or_else(|| ReshapeError::malformed(depth, format!("期望对象，实际为 {}", node)))?;
    let mut entries = map.iter();
    let (label, body) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(ReshapeError::malformed(
                depth,
                format!("期望恰好一个键，实际为 {} 个", map.len()),
            ))
        }
    };
    let body = body
        .as_object()
        .ok_or_else(|| ReshapeError::malformed(depth, format!("\"{}\" 的值不是对象", label)))?;
    Ok((label.as_str(), body))
}

/// `"{类型首字母} [{owner前5字符}] {名称}"`，缺失的部分直接省略
fn overload(name: &str, data: &Value) -> String {
    let type_char = data
        .get("node_type")
        .and_then(Value::as_str)
        .and_then(|t| t.chars().next());
    let owner: Option<String> = data
        .get("owner")
        .and_then(Value::as_str)
        .map(|o| o.chars().take(OWNER_PREFIX_CHARS).collect());

    let mut parts = Vec::with_capacity(3);
    if let Some(c) = type_char {
        parts.push(c.to_string());
    }
    if let Some(o) = owner {
        parts.push(format!("[{}]", o));
    }
    parts.push(name.to_string());
    parts.join(" ")
}
