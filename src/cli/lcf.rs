//! # lcf 子命令 CLI 定义
//!
//! 参考谱可以是文本谱文件（按与输入相同的列选项读取）或保存的数据集，
//! 名称取文件名主干。平移和缩放按名称给出：
//!
//! ```text
//! --reference Fe.dat --reference Fe2O3.json --shift Fe=0.4 --scale Fe2O3=0.98
//! ```
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/lcf.rs`

use super::input::InputArgs;
use clap::Args;
use std::path::PathBuf;

/// lcf 子命令参数
#[derive(Args, Debug)]
pub struct LcfArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Reference spectrum or dataset (repeat for each reference, at least 2)
    #[arg(short, long = "reference", required = true)]
    pub references: Vec<PathBuf>,

    /// Energy shift of a reference, "NAME=VALUE" (repeatable)
    #[arg(long, allow_hyphen_values = true)]
    pub shift: Vec<String>,

    /// Intensity scale of a reference, "NAME=VALUE" (repeatable)
    #[arg(long, allow_hyphen_values = true)]
    pub scale_ref: Vec<String>,

    /// Fit window "lo:hi" (defaults to the whole reduced table)
    #[arg(short, long)]
    pub window: Option<String>,

    /// Let the weights sum to any value instead of 1
    #[arg(long)]
    pub free_sum: bool,

    /// Iteration budget
    #[arg(long, default_value_t = 2000)]
    pub max_iter: usize,

    /// Write data, fit and weighted references as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
