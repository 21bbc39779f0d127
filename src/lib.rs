//! 工作分解树工具库
//!
//! 从 Airtable / BetterWorks 拉取扁平记录构建带哨兵根的层级树，
//! 并导出为标签键控 JSON、d3 层级 JSON、CSV、Graphviz 或文本树。

pub mod model;
pub mod source;
pub mod utils;

// 重新导出主要类型
pub use model::builder::{build_levels, insert_subtree, BuildStats, RecordLevel, SourceRecord};
pub use model::data_core::{AppError, OutputType};
pub use model::reshape::{reshape, ReshapeError, ReshapeOptions, ReshapedNode};
pub use model::rooted_tree::{Attributes, Insertion, NodeId, RootedTree, TreeError};
pub use source::{RecordSource, SourceConfig, SourceError};
