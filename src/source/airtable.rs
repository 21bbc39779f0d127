//! Airtable：按表分页取数，每张表对应工作分解的一个层级
//!
//! 层级顺序 Priorities → Outcomes → KDs → Projects → Activities，
//! 后面的表通过链接字段引用前面表的记录，所以必须逐表完成插入。

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{get_json, http_client, SourceConfig, SourceError};
use crate::model::builder::{RecordLevel, SourceRecord};
use crate::model::rooted_tree::{Attributes, NodeId};

#[derive(Debug, Clone, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AirtablePage {
    #[serde(default)]
    records: Vec<AirtableRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaseList {
    #[serde(default)]
    bases: Vec<BaseInfo>,
}

#[derive(Debug, Deserialize)]
struct BaseInfo {
    id: String,
    name: String,
}

/// 一张表的记录映射规则
pub struct TableMapping {
    pub table: &'static str,
    pub map: fn(&AirtableRecord, bool) -> Result<SourceRecord, SourceError>,
}

/// 工作分解的表顺序（父层在前）
pub const WORK_BREAKDOWN: [TableMapping; 5] = [
    TableMapping { table: "Priorities", map: map_priority },
    TableMapping { table: "Outcomes", map: map_outcome },
    TableMapping { table: "KDs", map: map_key_deliverable },
    TableMapping { table: "Projects", map: map_project },
    TableMapping { table: "Activities", map: map_activity },
];

pub struct AirtableClient {
    http: Client,
    api_key: String,
    api_url: String,
    base_id: String,
}

impl AirtableClient {
    pub fn new(config: &SourceConfig, base_id: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            api_key: config.airtable_key()?.to_string(),
            http: http_client(config)?,
            api_url: config.airtable_api_url.trim_end_matches('/').to_string(),
            base_id: base_id.into(),
        })
    }

    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    /// 取回整张表；Airtable 每页最多 100 条，按 offset 继续翻页直到没有 offset
    pub fn fetch_table(&self, table: &str) -> Result<Vec<AirtableRecord>, SourceError> {
        let url = format!("{}/{}/{}", self.api_url, self.base_id, table);
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            tracing::debug!("请求 {}，offset {:?}", url, offset);
            let mut request = self
                .http
                .get(&url)
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key));
            if let Some(o) = &offset {
                request = request.query(&[("offset", o)]);
            }
            let page: AirtablePage = serde_json::from_value(get_json(request)?)
                .map_err(|e| SourceError::MissingData(format!("{} 返回格式异常: {}", table, e)))?;
            records.extend(page.records);
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        tracing::info!("表 {} 共 {} 条记录", table, records.len());
        Ok(records)
    }

    /// 查询 base 的显示名称，查不到时沿用 base id
    pub fn fetch_base_name(&self) -> Result<String, SourceError> {
        let url = format!("{}/meta/bases", self.api_url);
        let request = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        let list: BaseList = serde_json::from_value(get_json(request)?)
            .map_err(|e| SourceError::MissingData(format!("bases 返回格式异常: {}", e)))?;
        Ok(base_name(&list.bases, &self.base_id))
    }

    /// 按层级顺序取回并映射全部表
    pub fn fetch_levels(&self, add_type_in_name: bool) -> Result<Vec<RecordLevel>, SourceError> {
        WORK_BREAKDOWN
            .iter()
            .map(|mapping| {
                let records = self.fetch_table(mapping.table)?;
                Ok(map_records(mapping, &records, add_type_in_name))
            })
            .collect()
    }
}

fn base_name(bases: &[BaseInfo], base_id: &str) -> String {
    bases
        .iter()
        .find(|b| b.id == base_id)
        .map(|b| b.name.clone())
        .unwrap_or_else(|| base_id.to_string())
}

/// 映射一张表的全部记录；缺少必填字段的记录跳过，不影响其他记录
pub fn map_records(mapping: &TableMapping, records: &[AirtableRecord], add_type_in_name: bool) -> RecordLevel {
    let mut level = RecordLevel {
        category: mapping.table.to_string(),
        records: Vec::with_capacity(records.len()),
        skipped: 0,
    };
    for record in records {
        match (mapping.map)(record, add_type_in_name) {
            Ok(r) => level.records.push(r),
            Err(e) => {
                tracing::warn!("跳过 {} 中的记录 {}: {}", mapping.table, record.id, e);
                level.skipped += 1;
            }
        }
    }
    level
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(record: &AirtableRecord, key: &str) -> Result<String, SourceError> {
    text_field(&record.fields, key)
        .ok_or_else(|| SourceError::MissingData(format!("记录 {} 缺少字段 \"{}\"", record.id, key)))
}

/// 链接字段取第一个引用（可能有多个，目前只用第一个）
fn first_link(record: &AirtableRecord, key: &str, label: &str) -> Option<NodeId> {
    let link = record
        .fields
        .get(key)
        .and_then(Value::as_array)
        .and_then(|links| links.first())
        .and_then(Value::as_str)
        .map(NodeId::from);
    if link.is_none() {
        tracing::warn!("\"{}\" 是孤儿：缺少 {}", label, key);
    }
    link
}

/// 可选字段缺失时仍写入键，值为 null，保证同类节点的属性键一致
fn attributes(node_type: &str, extra: Vec<(&str, Option<String>)>) -> Attributes {
    let mut data = Attributes::new();
    for (key, value) in extra {
        data.insert(key.to_string(), value.map(Value::String).unwrap_or(Value::Null));
    }
    data.insert("node_type".to_string(), Value::String(node_type.to_string()));
    data
}

fn map_priority(record: &AirtableRecord, add_type: bool) -> Result<SourceRecord, SourceError> {
    let name = required_text(record, "ID")?;
    let label = if add_type { format!("Priority: {}", name) } else { name };
    Ok(SourceRecord {
        id: NodeId::from(record.id.as_str()),
        label,
        parent: None,
        data: attributes("MTP Priority", vec![]),
    })
}

fn map_outcome(record: &AirtableRecord, add_type: bool) -> Result<SourceRecord, SourceError> {
    let name = required_text(record, "Name")?;
    let code = required_text(record, "ID")?;
    let label = if add_type { format!("Outcome: {}: {}", code, name) } else { name };
    let parent = first_link(record, "Priority", &label);
    Ok(SourceRecord {
        id: NodeId::from(record.id.as_str()),
        data: attributes(
            "MTP Outcome",
            vec![("department", text_field(&record.fields, "Department")), ("code", Some(code))],
        ),
        label,
        parent,
    })
}

fn map_key_deliverable(record: &AirtableRecord, add_type: bool) -> Result<SourceRecord, SourceError> {
    let name = required_text(record, "KD Budget Name")?;
    let code = text_field(&record.fields, "K-ID").unwrap_or_default();
    let label = if add_type { format!("KD: {}: {}", code, name) } else { name };
    let parent = first_link(record, "Outcome", &label);
    Ok(SourceRecord {
        id: NodeId::from(record.id.as_str()),
        data: attributes(
            "MTP Key Deliverable",
            vec![("description", text_field(&record.fields, "KD Description")), ("code", Some(code))],
        ),
        label,
        parent,
    })
}

fn map_project(record: &AirtableRecord, add_type: bool) -> Result<SourceRecord, SourceError> {
    let name = text_field(&record.fields, "Project Name").unwrap_or_else(|| "no name".to_string());
    let label = if add_type { format!("Project: {}", name) } else { name };
    let parent = first_link(record, "KD", &label);
    Ok(SourceRecord {
        id: NodeId::from(record.id.as_str()),
        data: attributes("Projects", vec![]),
        label,
        parent,
    })
}

fn map_activity(record: &AirtableRecord, add_type: bool) -> Result<SourceRecord, SourceError> {
    let name = text_field(&record.fields, "Activity").unwrap_or_else(|| "no name".to_string());
    let label = if add_type { format!("Activity: {}", name) } else { name };
    let parent = first_link(record, "KeyDeliverable", &label);
    Ok(SourceRecord {
        id: NodeId::from(record.id.as_str()),
        data: attributes("Activities", vec![]),
        label,
        parent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_levels;
    use crate::model::rooted_tree::RootedTree;
    use serde_json::json;

    fn rec(value: Value) -> AirtableRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_page_parsing_with_offset() {
        let page: AirtablePage = serde_json::from_value(json!({
            "records": [{"id": "rec1", "fields": {"ID": "Brand"}}],
            "offset": "itrNext/rec1"
        }))
        .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.offset.as_deref(), Some("itrNext/rec1"));

        let last: AirtablePage = serde_json::from_value(json!({"records": []})).unwrap();
        assert!(last.offset.is_none());
    }

    #[test]
    fn test_priority_mapping() {
        let r = map_priority(&rec(json!({"id": "recP", "fields": {"ID": "Brand Awareness"}})), true).unwrap();
        assert_eq!(r.label, "Priority: Brand Awareness");
        assert_eq!(r.parent, None);
        assert_eq!(r.data, attributes("MTP Priority", vec![]));

        let plain = map_priority(&rec(json!({"id": "recP", "fields": {"ID": "Brand Awareness"}})), false).unwrap();
        assert_eq!(plain.label, "Brand Awareness");
    }

    #[test]
    fn test_outcome_mapping() {
        let r = map_outcome(
            &rec(json!({"id": "recO", "fields": {
                "Name": "Clarify and strengthen brand arch",
                "ID": "B-O2",
                "Department": "Comms",
                "Priority": ["recP", "recQ"]
            }})),
            true,
        )
        .unwrap();
        assert_eq!(r.label, "Outcome: B-O2: Clarify and strengthen brand arch");
        assert_eq!(r.parent, Some(NodeId::from("recP")));
        assert_eq!(r.data["department"], "Comms");
        assert_eq!(r.data["code"], "B-O2");
        assert_eq!(r.data["node_type"], "MTP Outcome");
    }

    #[test]
    fn test_missing_link_gives_no_parent() {
        let r = map_key_deliverable(&rec(json!({"id": "recK", "fields": {"KD Budget Name": "Brand"}})), true).unwrap();
        assert_eq!(r.label, "KD: : Brand");
        assert_eq!(r.parent, None);
        assert_eq!(r.data.get("description"), Some(&Value::Null), "缺失字段以 null 写入属性包");
    }

    #[test]
    fn test_outcome_without_department_keeps_key() {
        let r = map_outcome(&rec(json!({"id": "recO", "fields": {"Name": "Arch", "ID": "B-O2"}})), true).unwrap();
        let keys: Vec<&str> = r.data.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["department", "code", "node_type"]);
        assert!(r.data["department"].is_null());
    }

    #[test]
    fn test_default_names() {
        let p = map_project(&rec(json!({"id": "recJ", "fields": {"KD": ["recK"]}})), true).unwrap();
        assert_eq!(p.label, "Project: no name");
        let a = map_activity(&rec(json!({"id": "recA", "fields": {"KeyDeliverable": ["recK", "recL"]}})), false)
            .unwrap();
        assert_eq!(a.label, "no name");
        assert_eq!(a.parent, Some(NodeId::from("recK")));
    }

    #[test]
    fn test_record_missing_required_field_is_skipped() {
        let records = vec![
            rec(json!({"id": "recO1", "fields": {"Name": "No code"}})),
            rec(json!({"id": "recO2", "fields": {"Name": "Ok", "ID": "B-O1"}})),
        ];
        let level = map_records(&WORK_BREAKDOWN[1], &records, true);
        assert_eq!(level.category, "Outcomes");
        assert_eq!(level.records.len(), 1);
        assert_eq!(level.records[0].id, NodeId::from("recO2"));
        assert_eq!(level.skipped, 1);
    }

    #[test]
    fn test_levels_build_expected_tree() {
        let tables = [
            vec![rec(json!({"id": "recP", "fields": {"ID": "Brand"}}))],
            vec![rec(json!({"id": "recO", "fields": {"Name": "Arch", "ID": "B-O2", "Priority": ["recP"]}}))],
            vec![rec(json!({"id": "recK", "fields": {"KD Budget Name": "Brand", "K-ID": "B-O2-D1", "Outcome": ["recO"]}}))],
            vec![rec(json!({"id": "recJ", "fields": {"Project Name": "Logo", "KD": ["recGone"]}}))],
            vec![rec(json!({"id": "recA", "fields": {"Activity": "Models", "KeyDeliverable": ["recK"]}}))],
        ];
        let levels: Vec<RecordLevel> = WORK_BREAKDOWN
            .iter()
            .zip(tables.iter())
            .map(|(m, records)| map_records(m, records, true))
            .collect();

        let mut tree = RootedTree::new("WMF Plan");
        let stats = build_levels(&mut tree, levels);

        assert_eq!(tree.len(), 6);
        assert_eq!(stats.orphaned, 1, "引用不存在 KD 的项目挂到根");
        assert!(tree.parent_of(&"recJ".into()).unwrap().identifier.is_root());
        assert_eq!(tree.parent_of(&"recA".into()).unwrap().label, "KD: B-O2-D1: Brand");
    }

    #[test]
    fn test_base_name_lookup() {
        let bases = vec![BaseInfo { id: "appX".into(), name: "Annual Plan".into() }];
        assert_eq!(base_name(&bases, "appX"), "Annual Plan");
        assert_eq!(base_name(&bases, "appY"), "appY");
    }

    #[test]
    fn test_client_requires_api_key() {
        let err = AirtableClient::new(&SourceConfig::default(), "appX").err();
        assert!(matches!(err, Some(SourceError::MissingCredential(_))));
    }
}
