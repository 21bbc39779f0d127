//! 扁平导出：CSV、Graphviz dot、文本树

use std::fmt::Write as _;
use std::io::Write;

use serde_json::Value;

use crate::model::rooted_tree::{NodeId, RootedTree, TreeNode};

pub const CSV_HEADER: [&str; 7] = ["id", "name", "node_type", "parent_id", "owner", "start", "end"];

fn attribute_text(node: &TreeNode, key: &str) -> String {
    match node.data.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 每个节点一行（按插入顺序），根节点的 parent_id 为空
pub fn write_csv<W: Write>(tree: &RootedTree, writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CSV_HEADER)?;
    for node in tree.iter() {
        let parent_id = node.parent.as_ref().map(NodeId::to_string).unwrap_or_default();
        out.write_record([
            node.identifier.to_string(),
            node.label.clone(),
            attribute_text(node, "node_type"),
            parent_id,
            attribute_text(node, "owner"),
            attribute_text(node, "start"),
            attribute_text(node, "end"),
        ])?;
    }
    out.flush()?;
    Ok(())
}

fn dot_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn to_graphviz(tree: &RootedTree) -> String {
    let mut out = String::from("digraph tree {\n\tnode [shape=box];\n");
    let walk = tree.depth_first();
    for (_, node) in &walk {
        let _ = writeln!(
            out,
            "\t{} [label={}]",
            dot_quote(&node.identifier.to_string()),
            dot_quote(&node.label)
        );
    }
    out.push('\n');
    for (_, node) in &walk {
        for child in &node.children {
            let _ = writeln!(
                out,
                "\t{} -> {}",
                dot_quote(&node.identifier.to_string()),
                dot_quote(&child.to_string())
            );
        }
    }
    out.push_str("}\n");
    out
}

/// 文本树（├── / └── 连线）
pub fn to_text(tree: &RootedTree) -> String {
    let mut out = String::new();
    let root = tree.root();
    out.push_str(&root.label);
    out.push('\n');
    fn walk(tree: &RootedTree, id: &NodeId, prefix: &str, out: &mut String) {
        let children: Vec<&TreeNode> = tree.children_of(id).collect();
        let last = children.len().saturating_sub(1);
        for (idx, child) in children.iter().enumerate() {
            let (branch, extension) = if idx == last { ("└── ", "    ") } else { ("├── ", "│   ") };
            out.push_str(prefix);
            out.push_str(branch);
            out.push_str(&child.label);
            out.push('\n');
            walk(tree, &child.identifier, &format!("{}{}", prefix, extension), out);
        }
    }
    walk(tree, &root.identifier, "", &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rooted_tree::Attributes;
    use serde_json::json;

    fn sample_tree() -> RootedTree {
        let mut tree = RootedTree::default();
        let mut data = Attributes::new();
        data.insert("node_type".into(), json!("Objective"));
        data.insert("owner".into(), json!("Alice, Jr."));
        data.insert("start".into(), json!("2024-07-01"));
        data.insert("end".into(), Value::Null);
        tree.insert_with_default_root(NodeId::Number(1), "Grow", None, data);
        tree.insert_with_default_root(NodeId::Number(2), "Reach \"new\" readers", Some(NodeId::Number(1)), Attributes::new());
        tree.insert_with_default_root("recB".into(), "Brand", None, Attributes::new());
        tree
    }

    #[test]
    fn test_csv_rows() {
        let mut buf = Vec::new();
        write_csv(&sample_tree(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "id,name,node_type,parent_id,owner,start,end");
        assert_eq!(lines[1], "-1,root,,,,,", "根节点 parent_id 为空");
        assert_eq!(lines[2], "1,Grow,Objective,-1,\"Alice, Jr.\",2024-07-01,");
        assert_eq!(lines[3], "2,\"Reach \"\"new\"\" readers\",,1,,,");
        assert_eq!(lines[4], "recB,Brand,,-1,,,");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_graphviz_output() {
        let dot = to_graphviz(&sample_tree());
        assert!(dot.starts_with("digraph tree {"));
        assert!(dot.contains("\"2\" [label=\"Reach \\\"new\\\" readers\"]"));
        assert!(dot.contains("\"-1\" -> \"1\""));
        assert!(dot.contains("\"1\" -> \"2\""));
        assert!(dot.contains("\"-1\" -> \"recB\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_text_tree() {
        let text = to_text(&sample_tree());
        let expected = "root\n├── Grow\n│   └── Reach \"new\" readers\n└── Brand\n";
        assert_eq!(text, expected);
    }
}
