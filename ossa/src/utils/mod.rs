//! Shared utilities for the ossa CLI

pub mod tree;

pub use tree::{NodeType, TreeNode, TreeOptions, render_tree};
