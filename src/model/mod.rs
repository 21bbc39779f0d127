pub mod builder;
pub mod data_core;
pub mod render;
pub mod reshape;
pub mod rooted_tree;
