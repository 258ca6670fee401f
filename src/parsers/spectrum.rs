//! # 分隔文本谱数据解析器
//!
//! 读取 `.txt` / `.dat` / `.csv` 谱数据：
//!
//! ```text
//! # 以 # 开头的行是注释
//! energy, intensity, scan1, scan2     <- 可选表头
//! 530.0,  1.20,      1.18,  1.22
//! 530.1,  1.25,      1.27,  1.23
//! ```
//!
//! 分隔符可以是逗号、分号、制表符或空白。列可以按序号（从 0 开始）
//! 或表头名称选择；给出扫描列而不给强度列时，强度取各扫描的平均。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs` 使用
//! - 使用 `models/spectrum.rs`

use crate::error::{Result, ThorondorError};
use crate::models::spectrum::{EnergyScale, SpectrumTable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 列引用：序号或表头名称
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl FromStr for ColumnRef {
    type Err = ThorondorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ThorondorError::InvalidArgument("empty column name".to_string()));
        }
        Ok(match s.parse::<usize>() {
            Ok(i) => ColumnRef::Index(i),
            Err(_) => ColumnRef::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "{}", i),
            ColumnRef::Name(n) => write!(f, "{}", n),
        }
    }
}

/// 读取选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub x: ColumnRef,
    /// 强度列；None 且没有扫描列时使用第 1 列
    pub y: Option<ColumnRef>,
    /// 逐次扫描列
    pub iterations: Vec<ColumnRef>,
    pub scale: EnergyScale,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            x: ColumnRef::Index(0),
            y: None,
            iterations: Vec::new(),
            scale: EnergyScale::Photon,
        }
    }
}

/// 解析谱数据文件
pub fn parse_spectrum_file(path: &Path, options: &ReadOptions) -> Result<SpectrumTable> {
    if !path.exists() {
        return Err(ThorondorError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| ThorondorError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_spectrum_content(&content, options, &path.display().to_string())
}

/// 从字符串内容解析
pub fn parse_spectrum_content(
    content: &str,
    options: &ReadOptions,
    source: &str,
) -> Result<SpectrumTable> {
    let fail = |reason: String| ThorondorError::ParseError {
        format: "spectrum".to_string(),
        path: source.to_string(),
        reason,
    };
    let splitter = Regex::new(r"[,;\t ]+").map_err(|e| fail(e.to_string()))?;

    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = splitter.split(line).filter(|f| !f.is_empty()).collect();
        let parsed: std::result::Result<Vec<f64>, _> =
            fields.iter().map(|f| f.parse::<f64>()).collect();

        match parsed {
            Ok(values) => rows.push(values),
            // 第一条非注释行可以是表头
            Err(_) if rows.is_empty() && header.is_none() => {
                header = Some(fields.iter().map(|f| f.to_string()).collect());
            }
            Err(e) => {
                return Err(fail(format!("line {}: {}", lineno + 1, e)));
            }
        }
    }

    if rows.is_empty() {
        return Err(fail("no numeric rows".to_string()));
    }

    let resolve = |col: &ColumnRef| -> Result<usize> {
        match col {
            ColumnRef::Index(i) => Ok(*i),
            ColumnRef::Name(name) => header
                .as_ref()
                .and_then(|h| h.iter().position(|c| c.eq_ignore_ascii_case(name)))
                .ok_or_else(|| fail(format!("column '{}' not found in header", name))),
        }
    };
    let column = |idx: usize| -> Result<Vec<f64>> {
        rows.iter()
            .enumerate()
            .map(|(r, row)| {
                row.get(idx).copied().ok_or_else(|| {
                    fail(format!("row {} has no column {}", r + 1, idx))
                })
            })
            .collect()
    };

    let x = column(resolve(&options.x)?)?;
    let scans: Vec<Vec<f64>> = options
        .iterations
        .iter()
        .map(|c| resolve(c).and_then(|i| column(i)))
        .collect::<Result<_>>()?;

    let table = match (&options.y, scans.is_empty()) {
        (None, false) => SpectrumTable::from_iterations(x, scans, options.scale),
        (y, _) => {
            let y_col = match y {
                Some(c) => resolve(c)?,
                None => 1,
            };
            let table = SpectrumTable::new(x, column(y_col)?, options.scale);
            if scans.is_empty() {
                table
            } else {
                table.and_then(|t| t.with_iterations(scans))
            }
        }
    };
    table.map_err(|e| fail(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# beamline export\n\
                          energy, mu, scan1, scan2\n\
                          530.0, 1.0, 0.9, 1.1\n\
                          530.1, 2.0, 1.8, 2.2\n\
                          530.2, 3.0, 3.2, 2.8\n";

    #[test]
    fn test_default_columns() {
        let table = parse_spectrum_content(SAMPLE, &ReadOptions::default(), "test").unwrap();
        assert_eq!(table.x(), &[530.0, 530.1, 530.2]);
        assert_eq!(table.y(), &[1.0, 2.0, 3.0]);
        assert!(table.iterations().is_none());
    }

    #[test]
    fn test_columns_by_name_and_iterations() {
        let options = ReadOptions {
            x: "energy".parse().unwrap(),
            y: None,
            iterations: vec!["scan1".parse().unwrap(), ColumnRef::Index(3)],
            scale: EnergyScale::Photon,
        };
        let table = parse_spectrum_content(SAMPLE, &options, "test").unwrap();
        assert!((table.y()[0] - 1.0).abs() < 1e-12);
        assert!((table.y()[2] - 3.0).abs() < 1e-12);
        assert_eq!(table.iterations().unwrap().len(), 2);
    }

    #[test]
    fn test_whitespace_delimited_without_header() {
        let content = "10.0\t5\n 10.5   6\n11.0 7\n";
        let table = parse_spectrum_content(content, &ReadOptions::default(), "test").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.y()[2], 7.0);
    }

    #[test]
    fn test_errors() {
        let options = ReadOptions {
            y: Some("missing".parse().unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            parse_spectrum_content(SAMPLE, &options, "test"),
            Err(ThorondorError::ParseError { .. })
        ));
        assert!(parse_spectrum_content("# only comments\n", &ReadOptions::default(), "t").is_err());
        assert!(parse_spectrum_content("1 2\n1 3\n", &ReadOptions::default(), "t").is_err());
        assert!(parse_spectrum_content("1 2\nx y\n", &ReadOptions::default(), "t").is_err());
    }
}
