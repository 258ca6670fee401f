//! # 去毛刺
//!
//! 用两侧邻近点拟合的多项式替换一段下标区间 `[start, end)` 内的强度。
//!
//! ## 依赖关系
//! - 被 `reduction/reducer.rs` 使用
//! - 使用 `reduction/polyfit.rs`

use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use crate::reduction::polyfit::Polynomial;
use serde::{Deserialize, Serialize};

/// 替换用的多项式阶数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlitchFill {
    #[default]
    Linear,
    Quadratic,
    Cubic,
}

impl GlitchFill {
    pub fn degree(self) -> usize {
        match self {
            GlitchFill::Linear => 1,
            GlitchFill::Quadratic => 2,
            GlitchFill::Cubic => 3,
        }
    }
}

/// 一处毛刺
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeglitchSpec {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub fill: GlitchFill,
    /// 每侧参与拟合的邻近点数
    #[serde(default = "default_extra_points")]
    pub extra_points: usize,
}

fn default_extra_points() -> usize {
    5
}

impl DeglitchSpec {
    pub fn new(start: usize, end: usize) -> Self {
        DeglitchSpec {
            start,
            end,
            fill: GlitchFill::default(),
            extra_points: default_extra_points(),
        }
    }
}

/// 去毛刺，返回新表
pub fn deglitch(table: &SpectrumTable, spec: &DeglitchSpec) -> Result<SpectrumTable> {
    let n = table.len();
    let DeglitchSpec {
        start,
        end,
        fill,
        extra_points,
    } = *spec;

    if start >= end || end > n {
        return Err(ThorondorError::range(format!(
            "glitch range [{}, {}) is not inside a table of {} points",
            start, end, n
        )));
    }
    if start < extra_points || end + extra_points > n {
        return Err(ThorondorError::range(format!(
            "glitch range [{}, {}) needs {} neighbours on each side",
            start, end, extra_points
        )));
    }

    let neighbours: Vec<usize> = (start - extra_points..start)
        .chain(end..end + extra_points)
        .collect();
    let nx: Vec<f64> = neighbours.iter().map(|&i| table.x()[i]).collect();
    let ny: Vec<f64> = neighbours.iter().map(|&i| table.y()[i]).collect();
    let poly = Polynomial::fit(&nx, &ny, fill.degree())?;

    let mut y = table.y().to_vec();
    for i in start..end {
        y[i] = poly.eval(table.x()[i]);
    }
    table.with_y(y)
}
