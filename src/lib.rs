//! # Thorondor - XAS/XPS 谱数据约化与峰拟合
//!
//! 把一次采集从原始谱表变成标定、约化后的数据集，并对其做多组分非线性最小二乘拟合。
//!
//! ## 流水线
//! ```text
//! raw table ─▶ calibration ─▶ shifted table ─▶ reduction ─▶ reduced table
//!                                                              │
//!                                   PeakModel + FitEngine ◀────┘
//!                                              │
//!                                          FitResult ─▶ Dataset
//! ```
//!
//! ## 依赖关系
//! ```text
//! lib.rs
//!   ├── models/       (谱表、数据集、元数据)
//!   ├── calibration/  (能量标定)
//!   ├── reduction/    (背景、归一化、去毛刺)
//!   ├── fitting/      (峰模型与拟合引擎)
//!   ├── parsers/      (文本谱数据读取)
//!   ├── export/       (CSV 与图像导出)
//!   ├── batch/        (并行批处理)
//!   ├── config.rs     (流水线配置)
//!   ├── utils/        (终端输出与进度)
//!   └── error.rs      (错误处理)
//! ```

pub mod batch;
pub mod calibration;
pub mod config;
pub mod error;
pub mod export;
pub mod fitting;
pub mod models;
pub mod parsers;
pub mod reduction;
pub mod utils;

pub use error::{Result, ThorondorError};
pub use models::{Dataset, EnergyScale, SpectrumTable, Stage};
