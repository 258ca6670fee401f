//! # 输入参数（各子命令共用）
//!
//! 输入可以是文本谱数据，也可以是 `--save` 保存过的数据集 JSON。
//!
//! ## 依赖关系
//! - 被 `cli/` 各子命令以 `#[command(flatten)]` 使用
//! - 被 `commands/mod.rs` 解析

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use thorondor::parsers::{ColumnRef, ReadOptions};
use thorondor::{EnergyScale, Result, ThorondorError};

/// 能量轴约定
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum ScaleArg {
    /// Photon energy (XAS)
    #[default]
    Photon,
    /// Kinetic energy (raw XPS)
    Kinetic,
    /// Binding energy (XPS)
    Binding,
}

impl std::fmt::Display for ScaleArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleArg::Photon => write!(f, "photon"),
            ScaleArg::Kinetic => write!(f, "kinetic"),
            ScaleArg::Binding => write!(f, "binding"),
        }
    }
}

impl From<ScaleArg> for EnergyScale {
    fn from(arg: ScaleArg) -> Self {
        match arg {
            ScaleArg::Photon => EnergyScale::Photon,
            ScaleArg::Kinetic => EnergyScale::Kinetic,
            ScaleArg::Binding => EnergyScale::Binding,
        }
    }
}

/// 输入参数
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Input: spectrum file (.txt/.dat/.csv) or saved dataset (.json)
    pub input: PathBuf,

    /// Energy column (index from 0 or header name)
    #[arg(long, default_value = "0")]
    pub x_col: String,

    /// Intensity column (index or header name); defaults to column 1, or the scan mean when --scans is given
    #[arg(long)]
    pub y_col: Option<String>,

    /// Per-iteration scan columns, comma separated (e.g., "2,3,4")
    #[arg(long)]
    pub scans: Option<String>,

    /// Energy axis convention of the input
    #[arg(long, value_enum, default_value = "photon")]
    pub scale: ScaleArg,

    /// Save the resulting dataset as JSON
    #[arg(long)]
    pub save: Option<PathBuf>,
}

impl InputArgs {
    /// 转换为读取选项
    pub fn read_options(&self) -> Result<ReadOptions> {
        let iterations = match &self.scans {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<ColumnRef>())
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(ReadOptions {
            x: self.x_col.parse()?,
            y: self
                .y_col
                .as_deref()
                .map(|s| s.parse::<ColumnRef>())
                .transpose()?,
            iterations,
            scale: self.scale.into(),
        })
    }
}

/// 解析能量窗口 "lo:hi"
pub fn parse_window(text: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = text.split(':').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(ThorondorError::InvalidRange(format!(
            "{} (expected 'lo:hi', e.g. '280.5:292')",
            text
        )));
    }
    let lo: f64 = parts[0]
        .parse()
        .map_err(|_| ThorondorError::InvalidRange(text.to_string()))?;
    let hi: f64 = parts[1]
        .parse()
        .map_err(|_| ThorondorError::InvalidRange(text.to_string()))?;
    if !(lo < hi) {
        return Err(ThorondorError::InvalidRange(format!("{} (must be lo < hi)", text)));
    }
    Ok((lo, hi))
}

/// 解析可选窗口
pub fn parse_optional_window(text: Option<&str>) -> Result<Option<(f64, f64)>> {
    text.map(parse_window).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("280.5:292").unwrap(), (280.5, 292.0));
        assert_eq!(parse_window(" -2 : 3 ").unwrap(), (-2.0, 3.0));
        assert!(parse_window("292:280").is_err());
        assert!(parse_window("280-292").is_err());
        assert!(parse_window("a:b").is_err());
    }
}
