//! # 能量标定模块
//!
//! ## 子模块
//! - `edge`: 窗口内边沿（费米边 / 吸收边）检测
//! - `calibrator`: 偏移与缩放的解析和应用
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `config.rs`, `commands/` 使用
//! - 使用 `models/spectrum.rs`

pub mod calibrator;
pub mod edge;

pub use calibrator::{shift, AppliedCalibration, CalibrationSpec, Calibrator, Reference};
pub use edge::{detect_edge, EdgeDirection};
