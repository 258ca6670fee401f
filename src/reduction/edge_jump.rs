//! # 边沿跳变归一化
//!
//! 在吸收边两侧各拟合一条曲线（多项式或 Victoreen a·x⁻³ + b·x⁻⁴），
//! 扣除前沿线后除以 E0 处两线之差：
//!
//! ```text
//! μ_norm(x) = (μ(x) − pre(x)) / |post(E0) − pre(E0)|
//! ```
//!
//! E0 未给出时在前沿窗口上端与后沿窗口下端之间检测上升边。
//!
//! ## 依赖关系
//! - 被 `reduction/reducer.rs` 使用
//! - 使用 `reduction/polyfit.rs`, `calibration/edge.rs`, `models/spectrum.rs`

use crate::calibration::{detect_edge, EdgeDirection};
use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use crate::reduction::polyfit::{solve_least_squares, Polynomial};
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 检测 E0 时的平滑点数
const E0_SMOOTHING: usize = 3;
/// 跳变相对于最大强度低于此值视为没有吸收边
const JUMP_TOLERANCE: f64 = 1e-9;

/// 边沿两侧的拟合曲线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLine {
    Polynomial { degree: usize },
    Victoreen,
}

impl Default for EdgeLine {
    fn default() -> Self {
        EdgeLine::Polynomial { degree: 1 }
    }
}

impl fmt::Display for EdgeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLine::Polynomial { degree } => write!(f, "polynomial (degree {})", degree),
            EdgeLine::Victoreen => write!(f, "Victoreen"),
        }
    }
}

/// 边沿跳变设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeJumpSpec {
    /// 吸收边位置；None 时自动检测
    #[serde(default)]
    pub e0: Option<f64>,
    pub pre_edge: (f64, f64),
    pub post_edge: (f64, f64),
    #[serde(default)]
    pub pre_line: EdgeLine,
    #[serde(default)]
    pub post_line: EdgeLine,
}

impl EdgeJumpSpec {
    /// 两侧都用直线
    pub fn linear(pre_edge: (f64, f64), post_edge: (f64, f64)) -> Self {
        EdgeJumpSpec {
            e0: None,
            pre_edge,
            post_edge,
            pre_line: EdgeLine::default(),
            post_line: EdgeLine::default(),
        }
    }
}

/// 边沿跳变结果，曲线与表的 x 对齐
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeJump {
    pub e0: f64,
    pub jump: f64,
    pub pre_edge: Vec<f64>,
    pub post_edge: Vec<f64>,
}

/// 计算前后沿曲线、E0 与跳变高度
pub fn edge_jump(table: &SpectrumTable, spec: &EdgeJumpSpec) -> Result<EdgeJump> {
    let pre = fit_line(table, spec.pre_edge, spec.pre_line, "pre-edge")?;
    let post = fit_line(table, spec.post_edge, spec.post_line, "post-edge")?;

    let e0 = match spec.e0 {
        Some(e0) => e0,
        None => {
            let window = (spec.pre_edge.1, spec.post_edge.0);
            if !(window.0 < window.1) {
                return Err(ThorondorError::range(format!(
                    "cannot locate E0: pre-edge window ends at {} but post-edge window starts at {}",
                    window.0, window.1
                )));
            }
            detect_edge(table, window, EdgeDirection::Rising, E0_SMOOTHING)?
        }
    };

    let jump = (post.eval(e0) - pre.eval(e0)).abs();
    let level = table.y().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !(jump.is_finite() && jump > JUMP_TOLERANCE * level) {
        return Err(ThorondorError::range(format!(
            "edge jump at E0 = {} is {}, cannot normalize",
            e0, jump
        )));
    }
    debug!("Edge jump {:.6e} at E0 = {:.4}", jump, e0);

    Ok(EdgeJump {
        e0,
        jump,
        pre_edge: table.x().iter().map(|&x| pre.eval(x)).collect(),
        post_edge: table.x().iter().map(|&x| post.eval(x)).collect(),
    })
}

/// 扣除前沿线并除以跳变高度
pub fn normalize_edge_jump(
    table: &SpectrumTable,
    spec: &EdgeJumpSpec,
) -> Result<(SpectrumTable, EdgeJump)> {
    let jump = edge_jump(table, spec)?;
    let y = table
        .y()
        .iter()
        .zip(&jump.pre_edge)
        .map(|(y, p)| (y - p) / jump.jump)
        .collect();
    Ok((table.with_y(y)?, jump))
}

// ─────────────────────────────────────────────────────────────
// 两侧曲线
// ─────────────────────────────────────────────────────────────

enum Line {
    Polynomial(Polynomial),
    /// a·t⁻³ + b·t⁻⁴，t = x / x_ref
    Victoreen { x_ref: f64, a: f64, b: f64 },
}

impl Line {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Line::Polynomial(p) => p.eval(x),
            Line::Victoreen { x_ref, a, b } => {
                let t = x / x_ref;
                a * t.powi(-3) + b * t.powi(-4)
            }
        }
    }
}

fn fit_line(table: &SpectrumTable, window: (f64, f64), kind: EdgeLine, label: &str) -> Result<Line> {
    let (lo, hi) = window;
    if !(lo < hi) {
        return Err(ThorondorError::range(format!(
            "{} window [{}, {}] needs lo < hi",
            label, lo, hi
        )));
    }
    let idx = table.indices_within(lo, hi);
    let xs: Vec<f64> = idx.iter().map(|&i| table.x()[i]).collect();
    let ys: Vec<f64> = idx.iter().map(|&i| table.y()[i]).collect();

    match kind {
        EdgeLine::Polynomial { degree } => Polynomial::fit(&xs, &ys, degree)
            .map(Line::Polynomial)
            .map_err(|e| match e {
                ThorondorError::RangeError { reason } => {
                    ThorondorError::range(format!("{} window [{}, {}]: {}", label, lo, hi, reason))
                }
                other => other,
            }),
        EdgeLine::Victoreen => {
            if xs.len() < 2 {
                return Err(ThorondorError::range(format!(
                    "{} window [{}, {}] contains {} sample(s), a Victoreen line needs 2",
                    label,
                    lo,
                    hi,
                    xs.len()
                )));
            }
            if xs.iter().any(|&x| x <= 0.0) {
                return Err(ThorondorError::range(format!(
                    "a Victoreen line needs positive energies in the {} window",
                    label
                )));
            }
            let x_ref = xs.iter().sum::<f64>() / xs.len() as f64;
            let a = DMatrix::from_fn(xs.len(), 2, |i, j| (xs[i] / x_ref).powi(-3 - j as i32));
            let c = solve_least_squares(a, DVector::from_column_slice(&ys))?;
            Ok(Line::Victoreen {
                x_ref,
                a: c[0],
                b: c[1],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;

    /// 斜线背景上的 arctan 吸收边，跳变高度 4
    fn k_edge() -> SpectrumTable {
        let x: Vec<f64> = (0..301).map(|i| 7080.0 + i as f64 * 0.25).collect();
        let y = x
            .iter()
            .map(|&e| {
                0.5 + 0.002 * (e - 7080.0)
                    + 4.0 * (0.5 + (std::f64::consts::FRAC_1_PI) * ((e - 7112.0) / 0.3).atan())
            })
            .collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    #[test]
    fn test_linear_edge_jump() {
        let table = k_edge();
        let spec = EdgeJumpSpec {
            e0: Some(7112.0),
            ..EdgeJumpSpec::linear((7080.0, 7100.0), (7130.0, 7155.0))
        };
        let (normalized, jump) = normalize_edge_jump(&table, &spec).unwrap();
        assert!((jump.jump - 4.0).abs() < 0.1);
        // 前沿区归零，后沿区接近 1
        assert!(normalized.y()[10].abs() < 1e-3);
        assert!((normalized.y()[280] - 1.0).abs() < 0.02);
        assert_eq!(normalized.x(), table.x());
    }

    #[test]
    fn test_detects_e0_between_windows() {
        let spec = EdgeJumpSpec::linear((7080.0, 7100.0), (7130.0, 7155.0));
        let jump = edge_jump(&k_edge(), &spec).unwrap();
        assert!((jump.e0 - 7112.0).abs() < 0.5);

        let overlapping = EdgeJumpSpec::linear((7080.0, 7120.0), (7110.0, 7155.0));
        assert!(matches!(
            edge_jump(&k_edge(), &overlapping),
            Err(ThorondorError::RangeError { .. })
        ));
    }

    #[test]
    fn test_victoreen_follows_power_law() {
        let x: Vec<f64> = (0..200).map(|i| 900.0 + i as f64).collect();
        let law = |e: f64| 2.0e9 * e.powi(-3) + 5.0e11 * e.powi(-4);
        let y = x
            .iter()
            .map(|&e| if e < 1000.0 { law(e) } else { 1.5 * law(e) })
            .collect();
        let table = SpectrumTable::new(x, y, EnergyScale::Photon).unwrap();
        let spec = EdgeJumpSpec {
            e0: Some(1000.0),
            pre_edge: (900.0, 990.0),
            post_edge: (1010.0, 1099.0),
            pre_line: EdgeLine::Victoreen,
            post_line: EdgeLine::Victoreen,
        };
        let jump = edge_jump(&table, &spec).unwrap();
        assert!((jump.pre_edge[50] - law(950.0)).abs() < 1e-9 * law(950.0).max(1.0));
        assert!((jump.jump - 0.5 * law(1000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_flat_edge_cannot_normalize() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let table = SpectrumTable::new(x, vec![1.0; 50], EnergyScale::Photon).unwrap();
        let spec = EdgeJumpSpec {
            e0: Some(25.0),
            ..EdgeJumpSpec::linear((0.0, 10.0), (40.0, 49.0))
        };
        assert!(matches!(
            edge_jump(&table, &spec),
            Err(ThorondorError::RangeError { .. })
        ));

        let empty = EdgeJumpSpec {
            e0: Some(25.0),
            ..EdgeJumpSpec::linear((60.0, 70.0), (40.0, 49.0))
        };
        assert!(edge_jump(&table, &empty).is_err());
    }
}
