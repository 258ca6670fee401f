//! # 批量处理模块
//!
//! 对多个谱数据文件并行执行同一条流水线。
//!
//! 每个文件各自成为一个独立的数据集，数据集之间不共享可变状态，
//! 因此可以放心交给 rayon 线程池；单个文件失败只记入 `BatchResult::failures`。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;

pub use collector::FileCollector;
pub use runner::{BatchResult, BatchRunner, ProcessResult};
