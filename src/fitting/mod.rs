//! # 峰拟合模块
//!
//! 复合峰模型与非线性最小二乘拟合。
//!
//! ## 子模块
//! - `expr`: 参数链接表达式
//! - `params`: 参数与边界变换
//! - `special`: erf 与 Faddeeva 函数
//! - `shapes`: 峰形函数表
//! - `model`: 复合模型与模型描述
//! - `optimizer`: LM 与 Nelder-Mead
//! - `engine`: 拟合引擎与误差估计
//! - `lcf`: 参考谱线性组合拟合
//! - `confidence`: F 检验置信区间
//! - `result`: 拟合结果
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `commands/` 使用
//! - 使用 `models/spectrum.rs`, `reduction/noise.rs`

pub mod confidence;
pub mod engine;
pub mod expr;
pub mod lcf;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod result;
pub mod shapes;
pub mod special;

pub use engine::{fit, FitEngine, FitMethod, FitOptions, Weighting};
pub use confidence::{confidence_intervals, ConfidenceInterval, ConfidenceLevel};
pub use expr::Expr;
pub use lcf::{linear_combination, LcfOptions, LcfReference, LcfResult};
pub use model::{ModelSpec, ParamOverride, PeakComponent, PeakModel};
pub use optimizer::{FitObserver, SilentObserver};
pub use params::Parameter;
pub use result::{FitResult, FitStatistics, ParameterEstimate};
pub use shapes::{ShapeKind, StepForm};
