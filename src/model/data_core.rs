//! 应用层：错误汇总、树文件读写与各类导出

use std::io::Write;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::model::render;
use crate::model::reshape::{reshape, ReshapeError, ReshapeOptions, ReshapedNode};
use crate::model::rooted_tree::{RootedTree, TreeError, TreeFile};
use crate::utils::fs::{read_json_as, read_json_file, write_json_file};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("树结构错误: {0}")]
    Tree(#[from] TreeError),
    #[error("重塑失败: {0}")]
    Reshape(#[from] ReshapeError),
    #[error("CSV写入失败: {0}")]
    Csv(#[from] csv::Error),
    #[error("状态错误: {0}")]
    State(String),
}

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    Text,
    #[default]
    Json,
    Csv,
    Graphviz,
}

/// 保存树文件（平铺节点列表）
pub fn save_tree(tree: &RootedTree, path: &Path) -> Result<(), AppError> {
    write_json_file(path, &TreeFile::from(tree))?;
    tracing::info!("树已保存到: {}（{} 个节点）", path.display(), tree.len());
    Ok(())
}

/// 读取树文件并重建树
pub fn load_tree(path: &Path) -> Result<RootedTree, AppError> {
    let file: TreeFile = read_json_as(path)?;
    if file.nodes.is_empty() {
        return Err(AppError::State(format!("{} 中没有任何节点", path.display())));
    }
    Ok(RootedTree::try_from(file)?)
}

/// 以指定格式输出整棵树
pub fn export_tree<W: Write>(tree: &RootedTree, output: OutputType, mut writer: W) -> Result<(), AppError> {
    match output {
        OutputType::Json => {
            serde_json::to_writer_pretty(&mut writer, &tree.to_serialized())?;
            writeln!(writer)?;
        }
        OutputType::Csv => render::write_csv(tree, &mut writer)?,
        OutputType::Graphviz => writer.write_all(render::to_graphviz(tree).as_bytes())?,
        OutputType::Text => writer.write_all(render::to_text(tree).as_bytes())?,
    }
    writer.flush()?;
    Ok(())
}

/// 读取 SerializedNode 文件，重塑后写出 ReshapedNode 文件
pub fn reshape_file(input: &Path, output: &Path, options: &ReshapeOptions) -> Result<ReshapedNode, AppError> {
    let value: Value = read_json_file(input)?;
    let reshaped = reshape(&value, options)?;
    write_json_file(output, &reshaped)?;
    tracing::info!("重塑完成: {} → {}（{} 个节点）", input.display(), output.display(), reshaped.count());
    Ok(reshaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rooted_tree::{Attributes, NodeId};
    use serde_json::json;
    use tempfile::NamedTempFile;

    /// 创建临时JSON文件用于测试
    fn create_test_json_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("创建临时文件失败");
        file.write_all(content.as_bytes()).expect("写入临时文件失败");
        file
    }

    fn sample_tree() -> RootedTree {
        let mut tree = RootedTree::new("Plan");
        let mut data = Attributes::new();
        data.insert("node_type".into(), json!("MTP Priority"));
        data.insert("owner".into(), json!("Alice"));
        tree.insert_with_default_root("recP".into(), "Priority: Brand Awareness", None, data);
        tree.insert_with_default_root("recO".into(), "Outcome: B-O2", Some("recP".into()), Attributes::new());
        tree
    }

    #[test]
    fn test_save_and_load_tree() {
        let file = NamedTempFile::new().expect("创建临时文件失败");
        let tree = sample_tree();
        save_tree(&tree, file.path()).unwrap();
        let loaded = load_tree(file.path()).unwrap();
        assert_eq!(loaded, tree);
        assert_eq!(loaded.root().label, "Plan");
    }

    #[test]
    fn test_load_tree_rejects_empty_and_invalid() {
        let empty = create_test_json_file(r#"{"nodes": []}"#);
        assert!(matches!(load_tree(empty.path()), Err(AppError::State(_))));

        let broken = create_test_json_file("{not json");
        assert!(matches!(load_tree(broken.path()), Err(AppError::Parse(_))));

        let dangling = create_test_json_file(r#"{"nodes": [{"id": -1, "label": "root"}, {"id": 3, "label": "x", "parent": 9}]}"#);
        assert!(matches!(load_tree(dangling.path()), Err(AppError::Tree(_))));
    }

    #[test]
    fn test_export_json_is_serialized_form() {
        let mut buf = Vec::new();
        export_tree(&sample_tree(), OutputType::Json, &mut buf).unwrap();
        let value: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(
            value,
            json!({"Plan": {"children": [
                {"Priority: Brand Awareness": {
                    "children": [{"Outcome: B-O2": {}}],
                    "data": {"node_type": "MTP Priority", "owner": "Alice"}
                }}
            ]}})
        );
    }

    #[test]
    fn test_export_other_formats() {
        let tree = sample_tree();
        for output in [OutputType::Csv, OutputType::Graphviz, OutputType::Text] {
            let mut buf = Vec::new();
            export_tree(&tree, output, &mut buf).unwrap();
            let text = String::from_utf8(buf).unwrap();
            assert!(text.contains("Outcome: B-O2"), "{:?} 输出应包含节点名称", output);
        }
    }

    #[test]
    fn test_reshape_file_end_to_end() {
        let mut tree = sample_tree();
        tree.insert_with_default_root(NodeId::Number(5), "Orphan goal", Some(NodeId::Number(77)), Attributes::new());

        let serialized = NamedTempFile::new().expect("创建临时文件失败");
        let mut buf = Vec::new();
        export_tree(&tree, OutputType::Json, &mut buf).unwrap();
        std::fs::write(serialized.path(), &buf).unwrap();

        let output = NamedTempFile::new().expect("创建临时文件失败");
        let options = ReshapeOptions {
            trim_length: Some(5),
            max_depth: None,
            overload_name: true,
        };
        let reshaped = reshape_file(serialized.path(), output.path(), &options).unwrap();
        assert_eq!(reshaped.count(), 4);

        let written = read_json_file(output.path()).unwrap();
        assert_eq!(written["name"], "Plan");
        assert_eq!(written["children"][0]["name"], "M [Alice] Prior");
        assert_eq!(written["children"][1]["name"], "Orpha");
        assert!(written["children"][0]["children"][0].get("data").is_none());
    }

    #[test]
    fn test_reshape_file_reads_deep_chain() {
        let mut tree = RootedTree::default();
        let mut parent = None;
        for i in 1..=50i64 {
            tree.insert_with_default_root(NodeId::Number(i), format!("level {}", i), parent.clone(), Attributes::new());
            parent = Some(NodeId::Number(i));
        }

        let serialized = NamedTempFile::new().expect("创建临时文件失败");
        let mut buf = Vec::new();
        export_tree(&tree, OutputType::Json, &mut buf).unwrap();
        std::fs::write(serialized.path(), &buf).unwrap();

        let output = NamedTempFile::new().expect("创建临时文件失败");
        let reshaped = reshape_file(serialized.path(), output.path(), &ReshapeOptions::default()).unwrap();
        assert_eq!(reshaped.count(), 51);

        let written: ReshapedNode = read_json_as(output.path()).unwrap();
        assert_eq!(written.count(), 51, "写出的深层文件也能再读回");
    }

    #[test]
    fn test_reshape_file_malformed_input() {
        let input = create_test_json_file(r#"{"a": {}, "b": {}}"#);
        let output = NamedTempFile::new().expect("创建临时文件失败");
        let result = reshape_file(input.path(), output.path(), &ReshapeOptions::default());
        assert!(matches!(result, Err(AppError::Reshape(ReshapeError::MalformedNode { .. }))));
    }
}
