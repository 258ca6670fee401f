//! # reduce 子命令 CLI 定义
//!
//! 顺序固定：去毛刺 → 背景扣除 → 归一化，每一步可单独开关。
//! `--normalize edge-jump` 自带前沿扣除，不能与 `--background` 同用。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/reduce.rs`

use super::input::InputArgs;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 背景模型
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum BackgroundArg {
    /// No background subtraction
    #[default]
    None,
    /// Constant at the window minimum
    Minimum,
    /// Constant at the mean of the window edges
    Edges,
    /// Straight line between the window edges
    Linear,
    /// Iterative Shirley background
    Shirley,
    /// Asymmetric least squares baseline
    Als,
    /// Weighted Chebyshev series
    Chebyshev,
    /// Monotone spline through the data at --anchors
    Anchors,
}

impl std::fmt::Display for BackgroundArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackgroundArg::None => write!(f, "none"),
            BackgroundArg::Minimum => write!(f, "minimum"),
            BackgroundArg::Edges => write!(f, "edges"),
            BackgroundArg::Linear => write!(f, "linear"),
            BackgroundArg::Shirley => write!(f, "shirley"),
            BackgroundArg::Als => write!(f, "als"),
            BackgroundArg::Chebyshev => write!(f, "chebyshev"),
            BackgroundArg::Anchors => write!(f, "anchors"),
        }
    }
}

/// 归一化方式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum NormalizeArg {
    /// No normalization
    #[default]
    None,
    /// Divide by the window mean
    Mean,
    /// Divide by the window maximum
    Maximum,
    /// Divide by the window area
    Area,
    /// Subtract the pre-edge line and divide by the edge jump at E0
    EdgeJump,
}

impl std::fmt::Display for NormalizeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeArg::None => write!(f, "none"),
            NormalizeArg::Mean => write!(f, "mean"),
            NormalizeArg::Maximum => write!(f, "maximum"),
            NormalizeArg::Area => write!(f, "area"),
            NormalizeArg::EdgeJump => write!(f, "edge-jump"),
        }
    }
}

/// reduce 子命令参数
#[derive(Args, Debug)]
pub struct ReduceArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Glitch index ranges to repair, "start:end" (end exclusive), repeatable
    #[arg(long)]
    pub deglitch: Vec<String>,

    /// Background model
    #[arg(short, long, value_enum, default_value = "none")]
    pub background: BackgroundArg,

    /// Background window "lo:hi" (defaults to the whole table)
    #[arg(long)]
    pub bg_window: Option<String>,

    /// Points averaged at each window edge
    #[arg(long, default_value_t = 1)]
    pub edge_points: usize,

    /// Shirley relative tolerance
    #[arg(long, default_value_t = 1e-6)]
    pub shirley_tol: f64,

    /// Shirley iteration cap
    #[arg(long, default_value_t = 100)]
    pub shirley_iter: usize,

    /// ALS smoothness
    #[arg(long, default_value_t = 1e5)]
    pub als_lambda: f64,

    /// ALS asymmetry
    #[arg(long, default_value_t = 0.01)]
    pub als_p: f64,

    /// Chebyshev series degree
    #[arg(long, default_value_t = 3)]
    pub cheb_degree: usize,

    /// Chebyshev weight exponent, points weighted by |y|^-power
    #[arg(long, default_value_t = 2.0)]
    pub cheb_power: f64,

    /// Anchor energies for the anchor background, comma separated
    #[arg(long, value_delimiter = ',')]
    pub anchors: Vec<f64>,

    /// Normalization mode
    #[arg(short, long, value_enum, default_value = "none")]
    pub normalize: NormalizeArg,

    /// Normalization window "lo:hi" (required with --normalize)
    #[arg(long)]
    pub norm_window: Option<String>,

    /// Pre-edge window "lo:hi" (edge-jump)
    #[arg(long)]
    pub pre_edge: Option<String>,

    /// Post-edge window "lo:hi" (edge-jump)
    #[arg(long)]
    pub post_edge: Option<String>,

    /// Edge position; detected between the windows when omitted (edge-jump)
    #[arg(long)]
    pub e0: Option<f64>,

    /// Pre-edge line: a polynomial degree or "victoreen"
    #[arg(long, default_value = "1")]
    pub pre_line: String,

    /// Post-edge line: a polynomial degree or "victoreen"
    #[arg(long, default_value = "1")]
    pub post_line: String,

    /// Write the reduced table (with background column) as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
