//! # 边沿检测
//!
//! 在窗口内对信号做滑动平均，取导数的极值点（下降沿取最小值，上升沿取最大值），
//! 再用三点抛物线插值细化到亚采样精度。
//!
//! 极值落在窗口边界上说明边沿不在窗口内，返回 `CalibrationError`。
//!
//! ## 依赖关系
//! - 被 `calibration/calibrator.rs` 使用
//! - 使用 `models/spectrum.rs`

use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use serde::{Deserialize, Serialize};

/// 边沿方向（按能量递增方向看）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// 强度随能量下降，例如动能轴上的费米边
    Falling,
    /// 强度随能量上升，例如吸收边 E0
    Rising,
}

/// 窗口内至少需要的样本数
const MIN_EDGE_SAMPLES: usize = 5;

/// 在窗口 [lo, hi] 内定位边沿位置
pub fn detect_edge(
    table: &SpectrumTable,
    window: (f64, f64),
    direction: EdgeDirection,
    smoothing: usize,
) -> Result<f64> {
    let (lo, hi) = window;
    if !(lo < hi) {
        return Err(ThorondorError::calibration(format!(
            "edge window [{}, {}] is empty",
            lo, hi
        )));
    }

    let mut idx = table.indices_within(lo, hi);
    if idx.len() < MIN_EDGE_SAMPLES {
        return Err(ThorondorError::calibration(format!(
            "edge window [{}, {}] contains {} samples, at least {} are required",
            lo,
            hi,
            idx.len(),
            MIN_EDGE_SAMPLES
        )));
    }
    if !table.is_increasing() {
        idx.reverse();
    }
    let xs: Vec<f64> = idx.iter().map(|&i| table.x()[i]).collect();
    let ys = moving_average(
        &idx.iter().map(|&i| table.y()[i]).collect::<Vec<_>>(),
        smoothing,
    );

    let m = xs.len();
    let deriv: Vec<f64> = (1..m - 1)
        .map(|k| (ys[k + 1] - ys[k - 1]) / (xs[k + 1] - xs[k - 1]))
        .collect();

    let signed = |d: f64| match direction {
        EdgeDirection::Rising => d,
        EdgeDirection::Falling => -d,
    };
    let (best, &best_d) = deriv
        .iter()
        .enumerate()
        .max_by(|a, b| signed(*a.1).total_cmp(&signed(*b.1)))
        .ok_or_else(|| ThorondorError::calibration("edge window is too small"))?;

    if !(signed(best_d) > 0.0) {
        return Err(ThorondorError::calibration(format!(
            "no {:?} edge in window [{}, {}]",
            direction, lo, hi
        )));
    }
    if best == 0 || best == deriv.len() - 1 {
        return Err(ThorondorError::calibration(format!(
            "steepest point lies on the boundary of window [{}, {}]; edge not in range",
            lo, hi
        )));
    }

    // deriv[k] 对应 xs[k + 1]
    let (xa, xb, xc) = (xs[best], xs[best + 1], xs[best + 2]);
    let (da, db, dc) = (deriv[best - 1], deriv[best], deriv[best + 1]);
    Ok(parabolic_vertex((xa, da), (xb, db), (xc, dc)))
}

/// 三点抛物线顶点；退化时返回中间点
fn parabolic_vertex(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let (xa, ya) = a;
    let (xb, yb) = b;
    let (xc, yc) = c;
    let num = (xb - xa).powi(2) * (yb - yc) - (xb - xc).powi(2) * (yb - ya);
    let den = (xb - xa) * (yb - yc) - (xb - xc) * (yb - ya);
    if den == 0.0 || !den.is_finite() {
        return xb;
    }
    (xb - 0.5 * num / den).clamp(xa.min(xc), xa.max(xc))
}

/// 居中滑动平均，边缘处窗口收缩
fn moving_average(y: &[f64], width: usize) -> Vec<f64> {
    if width <= 1 {
        return y.to_vec();
    }
    let half = width / 2;
    (0..y.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(y.len());
            y[start..end].iter().sum::<f64>() / (end - start) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;

    pub(crate) fn fermi_table(edge: f64) -> SpectrumTable {
        let x: Vec<f64> = (0..161).map(|i| 82.0 + i as f64 * 0.025).collect();
        let y = x
            .iter()
            .map(|&e| 100.0 / (1.0 + ((e - edge) / 0.1).exp()) + 5.0)
            .collect();
        SpectrumTable::new(x, y, EnergyScale::Kinetic).unwrap()
    }

    #[test]
    fn test_detects_fermi_edge() {
        let table = fermi_table(84.31);
        let found = detect_edge(&table, (83.0, 85.5), EdgeDirection::Falling, 3).unwrap();
        assert!((found - 84.31).abs() < 0.01, "found {}", found);
    }

    #[test]
    fn test_detects_on_decreasing_axis() {
        let table = fermi_table(84.31);
        let reversed = SpectrumTable::new(
            table.x().iter().rev().cloned().collect(),
            table.y().iter().rev().cloned().collect(),
            EnergyScale::Kinetic,
        )
        .unwrap();
        let a = detect_edge(&table, (83.0, 85.5), EdgeDirection::Falling, 3).unwrap();
        let b = detect_edge(&reversed, (83.0, 85.5), EdgeDirection::Falling, 3).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_edge_outside_window_fails() {
        let table = fermi_table(84.31);
        // 窗口完全在边沿之下：导数极值落在边界
        let err = detect_edge(&table, (82.0, 83.5), EdgeDirection::Falling, 3);
        assert!(matches!(err, Err(ThorondorError::CalibrationError { .. })));
        // 方向错误
        let err = detect_edge(&table, (83.0, 85.5), EdgeDirection::Rising, 3);
        assert!(err.is_err());
    }

    #[test]
    fn test_moving_average_edges() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 3), vec![1.5, 2.0, 3.0, 3.5]);
        assert_eq!(moving_average(&[1.0, 5.0], 1), vec![1.0, 5.0]);
    }
}
