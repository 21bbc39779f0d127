//! 树构建：把扁平记录（按类别分层，或按子节点指针递归展开）插入 RootedTree
//!
//! 单条记录的数据问题（重复、父节点缺失、取数失败）都在本地恢复并记录日志，
//! 不会中断整棵树的构建。

use crate::model::rooted_tree::{Attributes, Insertion, NodeId, RootedTree};
use crate::source::RecordSource;

/// 已由数据源映射好的扁平记录
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: NodeId,
    pub label: String,
    /// None 表示记录本身没有父引用，直接挂根
    pub parent: Option<NodeId>,
    pub data: Attributes,
}

/// 同一类别的一批记录；父引用只能指向更早的层级或根
#[derive(Debug, Clone, Default)]
pub struct RecordLevel {
    pub category: String,
    pub records: Vec<SourceRecord>,
    /// 映射阶段因缺少数据而丢弃的记录数
    pub skipped: usize,
}

/// 递归展开用：记录本身及其声明的子节点标识
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandableRecord {
    pub record: SourceRecord,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub attached: usize,
    pub orphaned: usize,
    pub duplicates: usize,
    /// 取数失败而跳过的记录（递归模式下连同其子树）
    pub skipped: usize,
}

impl BuildStats {
    fn record(&mut self, outcome: Insertion) {
        match outcome {
            Insertion::Attached => self.attached += 1,
            Insertion::Orphaned => self.orphaned += 1,
            Insertion::Duplicate => self.duplicates += 1,
        }
    }

    pub fn merge(&mut self, other: BuildStats) {
        self.attached += other.attached;
        self.orphaned += other.orphaned;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
    }
}

/// 插入一条记录（统一的孤儿/重复恢复策略）
pub fn insert_record(tree: &mut RootedTree, record: SourceRecord) -> Insertion {
    tree.insert_with_default_root(record.id, record.label, record.parent, record.data)
}

/// 按给定顺序逐层插入：每个类别全部插入完成后才处理下一个类别
pub fn build_levels<I>(tree: &mut RootedTree, levels: I) -> BuildStats
where
    I: IntoIterator<Item = RecordLevel>,
{
    let mut stats = BuildStats::default();
    for level in levels {
        let mut level_stats = BuildStats {
            skipped: level.skipped,
            ..Default::default()
        };
        for record in level.records {
            level_stats.record(insert_record(tree, record));
        }
        tracing::info!(
            "{}: 新增 {}，孤儿 {}，重复 {}，跳过 {}",
            level.category,
            level_stats.attached,
            level_stats.orphaned,
            level_stats.duplicates,
            level_stats.skipped
        );
        stats.merge(level_stats);
    }
    stats
}

/// 取回 `id` 对应的记录并插入，再递归展开其声明的子节点
///
/// 已在树中的标识视为已满足（不重复取数、不重复插入）；取数失败时跳过该节点及其子树。
pub fn insert_subtree<S>(tree: &mut RootedTree, source: &S, id: &NodeId) -> BuildStats
where
    S: RecordSource + ?Sized,
{
    let mut stats = BuildStats::default();
    if tree.contains(id) {
        tracing::debug!("{} 已在树中，跳过", id);
        stats.duplicates += 1;
        return stats;
    }

    let expandable = match source.fetch(id) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("无法获取 {}，跳过该节点及其子树: {}", id, e);
            stats.skipped += 1;
            return stats;
        }
    };

    let ExpandableRecord { record, children } = expandable;
    let outcome = insert_record(tree, record);
    stats.record(outcome);
    if outcome == Insertion::Duplicate {
        // 数据源返回的标识与请求不一致且已存在
        return stats;
    }

    for child in &children {
        stats.merge(insert_subtree(tree, source, child));
    }
    stats
}
