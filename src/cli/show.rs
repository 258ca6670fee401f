//! # show 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/show.rs`

use clap::Args;
use std::path::PathBuf;

/// show 子命令参数
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Saved dataset (.json)
    pub dataset: PathBuf,

    /// Print every stored fit instead of only the latest
    #[arg(short, long)]
    pub all: bool,

    /// Add a comment line before printing
    #[arg(long)]
    pub comment: Option<String>,

    /// Replace existing comments instead of appending (with --comment)
    #[arg(long, requires = "comment")]
    pub erase_comments: bool,

    /// Set a metadata entry, "KEY=VALUE" (repeatable)
    #[arg(long)]
    pub meta: Vec<String>,
}
