//! # 数据模型模块
//!
//! 谱表、数据集与元数据。
//!
//! ## 依赖关系
//! - 被 `calibration/`, `reduction/`, `fitting/`, `parsers/`, `commands/` 使用
//! - 子模块: spectrum, metadata, dataset

pub mod dataset;
pub mod metadata;
pub mod spectrum;

pub use dataset::{Dataset, Stage};
pub use metadata::Metadata;
pub use spectrum::{EnergyScale, SpectrumTable};
