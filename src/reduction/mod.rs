//! # 数据约化模块
//!
//! 把（标定后的）谱表变成可拟合的约化谱表。
//!
//! ## 子模块
//! - `background`: 常数 / 线性 / Shirley / ALS / Chebyshev / 锚点样条背景
//! - `normalize`: 窗口归一化
//! - `edge_jump`: 前后沿拟合与边沿跳变归一化
//! - `deglitch`: 去毛刺
//! - `noise`: 局部 RMS 噪声
//! - `polyfit`: 最小二乘多项式与 Chebyshev 级数
//! - `reducer`: 按顺序组合上述步骤
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `fitting/engine.rs`, `commands/` 使用
//! - 使用 `models/spectrum.rs`

pub mod background;
pub mod deglitch;
pub mod edge_jump;
pub mod noise;
pub mod normalize;
pub mod polyfit;
pub mod reducer;

pub use background::{BackgroundModel, BackgroundSpec, ConstantLevel};
pub use deglitch::{DeglitchSpec, GlitchFill};
pub use edge_jump::{edge_jump, normalize_edge_jump, EdgeJump, EdgeJumpSpec, EdgeLine};
pub use normalize::{NormalizationMode, NormalizationSpec};
pub use reducer::{reduce, Reducer, ReductionRecord, ReductionSpec};

/// 梯形积分（按 |dx| 计，与轴方向无关）
pub(crate) fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| (xw[1] - xw[0]).abs() * (yw[0] + yw[1]) / 2.0)
        .sum()
}
