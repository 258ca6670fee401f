//! # 结果导出模块
//!
//! ## 子模块
//! - `csv`: 谱表、拟合曲线、LCF 曲线、参数表和批量汇总
//! - `plot`: 拟合图（PNG / SVG）
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs` 使用
//! - 使用 `fitting/result.rs`, `fitting/lcf.rs`, `models/spectrum.rs`

pub mod csv;
pub mod plot;

pub use self::csv::{fit_to_csv, lcf_to_csv, parameters_to_csv, summary_to_csv, table_to_csv};
pub use self::plot::{plot_fit, ImageFormat};
