//! # fit 子命令 CLI 定义
//!
//! 模型由背景 + 可选台阶 + N 个同类峰组成，再用逐参数选项微调：
//!
//! ```text
//! --set P0_center=284.4        初值
//! --bounds P0_sigma=0.1:1.5    边界（任一侧可留空）
//! --fix Bcgd_c                 固定
//! --link "P1_sigma=P0_sigma"   表达式链接
//! ```
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/fit.rs`

use super::input::InputArgs;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use thorondor::fitting::{FitMethod, ShapeKind, StepForm};

/// 峰形
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum PeakArg {
    Gaussian,
    #[default]
    Lorentzian,
    Voigt,
    PseudoVoigt,
    SplitLorentzian,
    /// Doniach-Sunjic (asymmetric, metallic core levels)
    DoniachSunjic,
}

impl std::fmt::Display for PeakArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", ShapeKind::from(*self))
    }
}

impl From<PeakArg> for ShapeKind {
    fn from(arg: PeakArg) -> Self {
        match arg {
            PeakArg::Gaussian => ShapeKind::Gaussian,
            PeakArg::Lorentzian => ShapeKind::Lorentzian,
            PeakArg::Voigt => ShapeKind::Voigt,
            PeakArg::PseudoVoigt => ShapeKind::PseudoVoigt,
            PeakArg::SplitLorentzian => ShapeKind::SplitLorentzian,
            PeakArg::DoniachSunjic => ShapeKind::DoniachSunjic,
        }
    }
}

/// 背景形状
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum ModelBackgroundArg {
    None,
    #[default]
    Constant,
    Linear,
    Quadratic,
    /// Polynomial of --degree
    Polynomial,
    /// a/x^3 + b/x^4
    Victoreen,
}

impl std::fmt::Display for ModelBackgroundArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelBackgroundArg::None => write!(f, "none"),
            ModelBackgroundArg::Constant => write!(f, "constant"),
            ModelBackgroundArg::Linear => write!(f, "linear"),
            ModelBackgroundArg::Quadratic => write!(f, "quadratic"),
            ModelBackgroundArg::Polynomial => write!(f, "polynomial"),
            ModelBackgroundArg::Victoreen => write!(f, "victoreen"),
        }
    }
}

impl ModelBackgroundArg {
    pub fn to_shape(self, degree: usize) -> Option<ShapeKind> {
        match self {
            ModelBackgroundArg::None => None,
            ModelBackgroundArg::Constant => Some(ShapeKind::Constant),
            ModelBackgroundArg::Linear => Some(ShapeKind::Linear),
            ModelBackgroundArg::Quadratic => Some(ShapeKind::Quadratic),
            ModelBackgroundArg::Polynomial => Some(ShapeKind::Polynomial { degree }),
            ModelBackgroundArg::Victoreen => Some(ShapeKind::Victoreen),
        }
    }
}

/// 台阶形状
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum StepArg {
    Linear,
    Arctan,
    Erf,
    Logistic,
}

impl std::fmt::Display for StepArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", ShapeKind::Step(StepForm::from(*self)))
    }
}

impl From<StepArg> for StepForm {
    fn from(arg: StepArg) -> Self {
        match arg {
            StepArg::Linear => StepForm::Linear,
            StepArg::Arctan => StepForm::Arctan,
            StepArg::Erf => StepForm::Erf,
            StepArg::Logistic => StepForm::Logistic,
        }
    }
}

/// 最小化方法
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum MethodArg {
    /// Levenberg-Marquardt
    #[default]
    Lm,
    /// Nelder-Mead simplex
    NelderMead,
}

impl std::fmt::Display for MethodArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", FitMethod::from(*self))
    }
}

impl From<MethodArg> for FitMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Lm => FitMethod::LevenbergMarquardt,
            MethodArg::NelderMead => FitMethod::NelderMead,
        }
    }
}

/// 残差权重
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum WeightArg {
    #[default]
    None,
    /// 1/|y|
    Intensity,
    /// 1/local RMS deviation
    Rms,
}

impl std::fmt::Display for WeightArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightArg::None => write!(f, "none"),
            WeightArg::Intensity => write!(f, "intensity"),
            WeightArg::Rms => write!(f, "rms"),
        }
    }
}

/// fit 子命令参数
#[derive(Args, Debug)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Model description as JSON (replaces the shape flags below)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Start from the model of the latest fit stored in the dataset
    #[arg(long, conflicts_with = "model")]
    pub retrieve: bool,

    /// Background component
    #[arg(long, value_enum, default_value = "constant")]
    pub bg: ModelBackgroundArg,

    /// Degree of the polynomial background
    #[arg(long, default_value_t = 2)]
    pub degree: usize,

    /// Optional step component
    #[arg(long, value_enum)]
    pub step: Option<StepArg>,

    /// Peak shape
    #[arg(short, long, value_enum, default_value = "lorentzian")]
    pub peak: PeakArg,

    /// Number of peaks
    #[arg(short = 'n', long, default_value_t = 1)]
    pub peaks: usize,

    /// Initial value, "NAME=VALUE" (repeatable)
    #[arg(long, allow_hyphen_values = true)]
    pub set: Vec<String>,

    /// Bounds, "NAME=MIN:MAX" with either side optional (repeatable)
    #[arg(long, allow_hyphen_values = true)]
    pub bounds: Vec<String>,

    /// Fix a parameter at its initial value (repeatable)
    #[arg(long)]
    pub fix: Vec<String>,

    /// Link a parameter to an expression, "NAME=EXPR" (repeatable)
    #[arg(long)]
    pub link: Vec<String>,

    /// Remove a parameter's link so it varies on its own (repeatable)
    #[arg(long)]
    pub unlink: Vec<String>,

    /// Minimization method
    #[arg(short, long, value_enum, default_value = "lm")]
    pub method: MethodArg,

    /// Fit window "lo:hi" (defaults to the whole reduced table)
    #[arg(short, long)]
    pub window: Option<String>,

    /// Residual weighting
    #[arg(long, value_enum, default_value = "none")]
    pub weights: WeightArg,

    /// Points in the local RMS window
    #[arg(long, default_value_t = 11)]
    pub rms_points: usize,

    /// Polynomial degree of the local RMS fit
    #[arg(long, default_value_t = 2)]
    pub rms_degree: usize,

    /// Iteration budget
    #[arg(long, default_value_t = 2000)]
    pub max_iter: usize,

    /// Compute F-test confidence intervals for the free parameters
    #[arg(long)]
    pub ci: bool,

    /// Sigma levels for --ci, comma separated
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    pub ci_sigmas: Vec<f64>,

    /// Write data, fit, residuals and components as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the parameter table as CSV
    #[arg(long)]
    pub params_csv: Option<PathBuf>,

    /// Render the fit figure (PNG or SVG by extension)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1200)]
    pub plot_width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 900)]
    pub plot_height: u32,
}
