//! 带哨兵根节点的工作分解树（Rooted Tree）
//!
//! 所有节点都挂在一个合成的根节点之下：父节点缺失或尚未插入的记录
//! 统一挂到根上，保证整棵树始终连通且无环。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 节点属性包（owner/start/end/node_type 等，开放式键值）
pub type Attributes = Map<String, Value>;

/// 节点标识：BetterWorks 使用整数，Airtable 使用 `rec…` 字符串
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Number(i64),
    Text(String),
}

impl NodeId {
    /// 哨兵根节点的保留标识
    pub const ROOT: NodeId = NodeId::Number(-1);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// 解析命令行传入的标识：能解析为整数则视为整数标识
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => NodeId::Number(n),
            Err(_) => NodeId::Text(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Number(n) => write!(f, "{}", n),
            NodeId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        NodeId::Number(n)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::Text(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId::Text(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("节点已存在: {0}")]
    DuplicateNode(NodeId),
    #[error("节点 {node} 的父节点 {parent} 不在树中")]
    UnresolvedParent { node: NodeId, parent: NodeId },
}

/// 带默认根兜底的插入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// 挂在声明的父节点（或无父节点时直接挂在根）下
    Attached,
    /// 父节点无法解析，改挂到根
    Orphaned,
    /// 标识重复，未做任何修改
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub identifier: NodeId,
    /// 显示名称
    pub label: String,
    pub data: Attributes,
    /// 仅根节点为 None
    pub parent: Option<NodeId>,
    /// 子节点标识，保持插入顺序
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootedTree {
    nodes: HashMap<NodeId, TreeNode>,
    /// 插入顺序（根节点永远在首位）
    order: Vec<NodeId>,
}

impl RootedTree {
    /// 创建仅包含哨兵根节点的树
    pub fn new(root_label: impl Into<String>) -> Self {
        let root = TreeNode {
            identifier: NodeId::ROOT,
            label: root_label.into(),
            data: Attributes::new(),
            parent: None,
            children: Vec::new(),
        };
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, root);
        Self {
            nodes,
            order: vec![NodeId::ROOT],
        }
    }

    pub fn root(&self) -> &TreeNode {
        // 根节点在构造时插入且永不删除
        &self.nodes[&NodeId::ROOT]
    }

    pub fn set_root_label(&mut self, label: impl Into<String>) {
        if let Some(root) = self.nodes.get_mut(&NodeId::ROOT) {
            root.label = label.into();
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn parent_of(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent.as_ref())
            .and_then(|p| self.nodes.get(p))
    }

    pub fn children_of(&self, id: &NodeId) -> impl Iterator<Item = &TreeNode> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(|c| self.nodes.get(c))
    }

    /// 按插入顺序遍历所有节点
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// 深度优先（先序）遍历，附带节点深度（根为 0）
    pub fn depth_first(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![(0usize, NodeId::ROOT)];
        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, child.clone()));
            }
        }
        out
    }

    /// 插入节点：标识重复或父节点不存在时返回错误，树保持不变
    pub fn insert(
        &mut self,
        id: NodeId,
        label: impl Into<String>,
        parent: &NodeId,
        data: Attributes,
    ) -> Result<(), TreeError> {
        if self.nodes.contains_key(&id) {
            return Err(TreeError::DuplicateNode(id));
        }
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return Err(TreeError::UnresolvedParent {
                node: id,
                parent: parent.clone(),
            });
        };
        parent_node.children.push(id.clone());
        self.order.push(id.clone());
        self.nodes.insert(
            id.clone(),
            TreeNode {
                identifier: id,
                label: label.into(),
                data,
                parent: Some(parent.clone()),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// 插入节点并就地恢复：父节点缺失挂根，父节点无法解析时重试挂根，重复标识忽略
    pub fn insert_with_default_root(
        &mut self,
        id: NodeId,
        label: impl Into<String>,
        parent: Option<NodeId>,
        data: Attributes,
    ) -> Insertion {
        let label = label.into();
        let parent = parent.unwrap_or(NodeId::ROOT);
        match self.insert(id.clone(), label.clone(), &parent, data.clone()) {
            Ok(()) => {
                tracing::debug!("已添加 \"{}\" ({})，父节点 {}", label, id, parent);
                Insertion::Attached
            }
            Err(TreeError::DuplicateNode(_)) => {
                tracing::debug!("重复出现 {}，未添加", id);
                Insertion::Duplicate
            }
            Err(TreeError::UnresolvedParent { .. }) => {
                match self.insert(id.clone(), label.clone(), &NodeId::ROOT, data) {
                    Ok(()) => {
                        tracing::warn!("\"{}\" ({}) 作为孤儿挂到根：父节点 {} 不存在", label, id, parent);
                        Insertion::Orphaned
                    }
                    // 根节点总是存在，只可能是重复
                    Err(_) => Insertion::Duplicate,
                }
            }
        }
    }

    /// 输出标签键控的嵌套 JSON（SerializedNode）
    ///
    /// 同名兄弟节点会产生同名键的多个条目，按标签索引的消费者无法区分它们。
    pub fn to_serialized(&self) -> Value {
        self.serialize_node(&NodeId::ROOT)
    }

    fn serialize_node(&self, id: &NodeId) -> Value {
        let Some(node) = self.nodes.get(id) else {
            return Value::Null;
        };
        let mut body = Map::new();
        if !node.children.is_empty() {
            let children: Vec<Value> = node
                .children
                .iter()
                .map(|c| self.serialize_node(c))
                .collect();
            body.insert("children".to_string(), Value::Array(children));
        }
        if !node.data.is_empty() {
            body.insert("data".to_string(), Value::Object(node.data.clone()));
        }
        let mut wrapper = Map::new();
        wrapper.insert(node.label.clone(), Value::Object(body));
        Value::Object(wrapper)
    }
}

impl Default for RootedTree {
    fn default() -> Self {
        Self::new("root")
    }
}

/// 落盘格式：按插入顺序平铺的节点列表（根在首位）
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeFile {
    pub nodes: Vec<TreeFileNode>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreeFileNode {
    pub id: NodeId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Attributes,
}

impl From<&RootedTree> for TreeFile {
    fn from(tree: &RootedTree) -> Self {
        let nodes = tree
            .iter()
            .map(|n| TreeFileNode {
                id: n.identifier.clone(),
                label: n.label.clone(),
                parent: n.parent.clone(),
                data: n.data.clone(),
            })
            .collect();
        Self { nodes }
    }
}

impl TryFrom<TreeFile> for RootedTree {
    type Error = TreeError;

    /// 逐个重新插入，父节点引用或标识不合法的文件被拒绝
    fn try_from(file: TreeFile) -> Result<Self, Self::Error> {
        let mut tree = RootedTree::default();
        for node in file.nodes {
            match node.parent {
                None if node.id.is_root() => {
                    tree.set_root_label(node.label);
                    if let Some(root) = tree.nodes.get_mut(&NodeId::ROOT) {
                        root.data = node.data;
                    }
                }
                None => tree.insert(node.id, node.label, &NodeId::ROOT, node.data)?,
                Some(parent) => tree.insert(node.id, node.label, &parent, node.data)?,
            }
        }
        Ok(tree)
    }
}
