//! # 解析器模块
//!
//! 把外部文本数据读成 `SpectrumTable`。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs` 使用
//! - 使用 `models/spectrum.rs`
//! - 子模块: spectrum

pub mod spectrum;

pub use spectrum::{parse_spectrum_content, parse_spectrum_file, ColumnRef, ReadOptions};

/// 支持读取的扩展名
pub const SPECTRUM_EXTENSIONS: [&str; 3] = ["txt", "dat", "csv"];

/// 是否为可读取的谱数据文件
pub fn is_spectrum_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPECTRUM_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
