//! # 统一错误处理模块
//!
//! 定义 Thorondor 的所有错误类型，使用 `thiserror` 派生。
//!
//! 数值引擎的错误（标定、归一化窗口、背景收敛、参数链接、模型、拟合发散）
//! 都是可由调用方恢复的局部错误，不应导致进程退出。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// Thorondor 统一错误类型
#[derive(Error, Debug)]
pub enum ThorondorError {
    // ─────────────────────────────────────────────────────────────
    // 数值引擎错误
    // ─────────────────────────────────────────────────────────────
    #[error("Calibration failed: {reason}")]
    CalibrationError { reason: String },

    #[error("Invalid range: {reason}")]
    RangeError { reason: String },

    #[error("Background did not converge after {iterations} iterations (last relative change {change:.3e})")]
    ConvergenceError { iterations: usize, change: f64 },

    #[error("Parameter links form a cycle: {}", cycle.join(" -> "))]
    LinkCycleError { cycle: Vec<String> },

    #[error("Invalid model: {0}")]
    InvalidModelError(String),

    #[error("Fit diverged: no convergence within {iterations} iterations (cost {cost:.6e})")]
    FitDivergedError { iterations: usize, cost: f64 },

    // ─────────────────────────────────────────────────────────────
    // 数据与流程错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid spectrum table: {0}")]
    InvalidTable(String),

    #[error("Cannot {operation}: dataset is in stage '{stage}'")]
    StageError { operation: String, stage: String },

    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format}: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid range format: {0}")]
    InvalidRange(String),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("Plot rendering failed: {0}")]
    PlotError(String),

    #[error("{0}")]
    Other(String),
}

impl ThorondorError {
    pub fn range(reason: impl Into<String>) -> Self {
        ThorondorError::RangeError {
            reason: reason.into(),
        }
    }

    pub fn calibration(reason: impl Into<String>) -> Self {
        ThorondorError::CalibrationError {
            reason: reason.into(),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ThorondorError>;
