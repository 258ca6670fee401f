//! # calibrate 子命令 CLI 定义
//!
//! 参考可以是显式偏移（`--offset`），也可以是窗口内自动检测的边沿
//! （`--edge lo:hi --target E`）。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/calibrate.rs`

use super::input::InputArgs;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 边沿方向
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum DirectionArg {
    /// Intensity drops with energy (Fermi edge on a kinetic axis)
    #[default]
    Falling,
    /// Intensity rises with energy (absorption edge E0)
    Rising,
}

impl std::fmt::Display for DirectionArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectionArg::Falling => write!(f, "falling"),
            DirectionArg::Rising => write!(f, "rising"),
        }
    }
}

/// calibrate 子命令参数
#[derive(Args, Debug)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Rigid shift: x' = x - OFFSET
    #[arg(long, conflicts_with = "edge", allow_hyphen_values = true)]
    pub offset: Option<f64>,

    /// Window where the edge is searched (e.g., "83:86")
    #[arg(long, requires = "target")]
    pub edge: Option<String>,

    /// Energy the detected edge is moved to
    #[arg(long, allow_hyphen_values = true)]
    pub target: Option<f64>,

    /// Edge direction
    #[arg(long, value_enum, default_value = "falling")]
    pub direction: DirectionArg,

    /// Moving-average width (points) before differentiation
    #[arg(long, default_value_t = 3)]
    pub smoothing: usize,

    /// Optional linear scale applied about the reference (> 0)
    #[arg(long)]
    pub scale_factor: Option<f64>,

    /// Write the shifted table as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
