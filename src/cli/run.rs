//! # run 子命令 CLI 定义
//!
//! 按配置文件对单个文件或整个目录执行完整流水线。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input: spectrum file or directory of spectrum files
    pub input: PathBuf,

    /// Pipeline configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Output directory for datasets, tables and figures
    #[arg(short, long, default_value = "thorondor_out")]
    pub output: PathBuf,

    /// File name patterns, comma separated
    #[arg(long, default_value = "*.txt,*.dat,*.csv")]
    pub pattern: String,

    /// Search subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Parallel jobs (0 = all CPUs)
    #[arg(short, long, default_value_t = 0, env = "THORONDOR_JOBS")]
    pub jobs: usize,

    /// Render a fit figure for every dataset
    #[arg(long)]
    pub plot: bool,

    /// Skip inputs whose dataset JSON already exists in the output directory
    #[arg(long)]
    pub skip_existing: bool,
}
