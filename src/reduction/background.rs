//! # 背景扣除
//!
//! 在选定窗口内计算背景曲线，窗口外用边缘值延拓（线性背景直接外推）。
//!
//! | 模型 | 说明 |
//! |------|------|
//! | Constant | 窗口最小值或两侧边缘均值 |
//! | Linear | 窗口两端点之间的直线 |
//! | Shirley | 迭代自洽积分背景 |
//! | Als | 非对称最小二乘基线（Eilers） |
//! | Chebyshev | 加权 Chebyshev 级数，权重 \|y\|^(−power) 压低峰区 |
//! | Anchors | 过锚点处数据的单调三次 Hermite 样条（Fritsch–Carlson） |
//!
//! ## 依赖关系
//! - 被 `reduction/reducer.rs` 使用
//! - 使用 `models/spectrum.rs`, `reduction/polyfit.rs`

use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use crate::reduction::polyfit::ChebyshevSeries;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 常数背景的取值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConstantLevel {
    #[default]
    Minimum,
    Edges,
}

/// 背景模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundModel {
    Constant { level: ConstantLevel },
    Linear,
    Shirley { tolerance: f64, max_iterations: usize },
    Als { lambda: f64, p: f64, iterations: usize },
    Chebyshev { degree: usize, power: f64 },
    /// 锚点能量；在最近的样本处取数据值
    Anchors { energies: Vec<f64> },
}

impl BackgroundModel {
    /// 默认参数的 Shirley 背景
    pub fn shirley() -> Self {
        BackgroundModel::Shirley {
            tolerance: 1.0e-6,
            max_iterations: 100,
        }
    }

    /// 默认参数的 ALS 基线
    pub fn als() -> Self {
        BackgroundModel::Als {
            lambda: 1.0e5,
            p: 0.01,
            iterations: 10,
        }
    }
}

impl fmt::Display for BackgroundModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundModel::Constant { level } => write!(f, "constant ({:?})", level),
            BackgroundModel::Linear => write!(f, "linear"),
            BackgroundModel::Shirley { .. } => write!(f, "Shirley"),
            BackgroundModel::Als { .. } => write!(f, "asymmetric least squares"),
            BackgroundModel::Chebyshev { degree, power } => {
                write!(f, "Chebyshev (degree {}, weight |y|^-{})", degree, power)
            }
            BackgroundModel::Anchors { energies } => {
                write!(f, "monotone spline through {} anchors", energies.len())
            }
        }
    }
}

/// 背景设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSpec {
    pub model: BackgroundModel,
    /// 计算窗口 [lo, hi]；None 表示整张表
    #[serde(default)]
    pub window: Option<(f64, f64)>,
    /// 估计边缘强度时每侧平均的点数
    #[serde(default = "default_edge_points")]
    pub edge_points: usize,
}

fn default_edge_points() -> usize {
    1
}

impl BackgroundSpec {
    pub fn new(model: BackgroundModel) -> Self {
        BackgroundSpec {
            model,
            window: None,
            edge_points: default_edge_points(),
        }
    }

    pub fn with_window(mut self, lo: f64, hi: f64) -> Self {
        self.window = Some((lo, hi));
        self
    }
}

/// 在整张表上计算背景曲线（与 x 对齐）
pub fn compute_background(table: &SpectrumTable, spec: &BackgroundSpec) -> Result<Vec<f64>> {
    let (first, last) = window_span(table, spec.window)?;
    let xs = &table.x()[first..=last];
    let ys = &table.y()[first..=last];
    let m = xs.len();

    let k = spec.edge_points.clamp(1, m);
    let i_left = ys[..k].iter().sum::<f64>() / k as f64;
    let i_right = ys[m - k..].iter().sum::<f64>() / k as f64;

    let inside = match &spec.model {
        BackgroundModel::Constant { level } => {
            let c = match *level {
                ConstantLevel::Minimum => ys.iter().cloned().fold(f64::INFINITY, f64::min),
                ConstantLevel::Edges => (i_left + i_right) / 2.0,
            };
            return Ok(vec![c; table.len()]);
        }
        BackgroundModel::Linear => {
            let slope = (i_right - i_left) / (xs[m - 1] - xs[0]);
            return Ok(table
                .x()
                .iter()
                .map(|&x| i_left + slope * (x - xs[0]))
                .collect());
        }
        BackgroundModel::Shirley {
            tolerance,
            max_iterations,
        } => shirley(xs, ys, i_left, i_right, *tolerance, *max_iterations)?,
        BackgroundModel::Als {
            lambda,
            p,
            iterations,
        } => als(ys, *lambda, *p, *iterations)?,
        BackgroundModel::Chebyshev { degree, power } => chebyshev(xs, ys, *degree, *power)?,
        BackgroundModel::Anchors { energies } => anchors(xs, ys, energies)?,
    };

    // 窗口外用边缘值延拓
    let mut background = Vec::with_capacity(table.len());
    background.extend(std::iter::repeat(inside[0]).take(first));
    background.extend_from_slice(&inside);
    background.extend(std::iter::repeat(inside[m - 1]).take(table.len() - last - 1));
    Ok(background)
}

/// 窗口对应的首末下标（含）
fn window_span(table: &SpectrumTable, window: Option<(f64, f64)>) -> Result<(usize, usize)> {
    let (first, last) = match window {
        None => (0, table.len() - 1),
        Some((lo, hi)) => {
            if !(lo < hi) {
                return Err(ThorondorError::range(format!(
                    "background window [{}, {}] is empty",
                    lo, hi
                )));
            }
            let idx = table.indices_within(lo, hi);
            match (idx.first(), idx.last()) {
                (Some(&a), Some(&b)) => (a, b),
                _ => {
                    return Err(ThorondorError::range(format!(
                        "background window [{}, {}] contains no samples",
                        lo, hi
                    )))
                }
            }
        }
    };
    if last - first + 1 < 2 {
        return Err(ThorondorError::range(
            "background window must contain at least 2 samples",
        ));
    }
    Ok((first, last))
}

// ─────────────────────────────────────────────────────────────
// Shirley
// ─────────────────────────────────────────────────────────────

/// Shirley 背景：B(x) = I_left + (I_right − I_left)·C(x)/T
///
/// C(x) 为从窗口左端到 x 的 (y − B) 累积积分，T 为全窗口积分。
/// 该式与轴方向无关：反转样本顺序后得到同一条曲线。
fn shirley(
    xs: &[f64],
    ys: &[f64],
    i_left: f64,
    i_right: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<Vec<f64>> {
    let m = xs.len();
    let mut background = vec![i_left.min(i_right); m];
    let mut change = f64::INFINITY;

    for iteration in 1..=max_iterations {
        let mut cumulative = vec![0.0; m];
        let mut magnitude = 0.0;
        for k in 1..m {
            let dx = (xs[k] - xs[k - 1]).abs();
            let (a, b) = (ys[k - 1] - background[k - 1], ys[k] - background[k]);
            cumulative[k] = cumulative[k - 1] + dx * (a + b) / 2.0;
            magnitude += dx * (a.abs() + b.abs()) / 2.0;
        }
        let total = cumulative[m - 1];
        if total.abs() <= f64::EPSILON * magnitude || total == 0.0 {
            return Err(ThorondorError::range(
                "no signal above the Shirley background in the selected window",
            ));
        }

        let next: Vec<f64> = cumulative
            .iter()
            .map(|c| i_left + (i_right - i_left) * c / total)
            .collect();
        let scale = next.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let diff = next
            .iter()
            .zip(&background)
            .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()));
        change = if scale > 0.0 { diff / scale } else { diff };
        background = next;

        debug!("Shirley iteration {}: relative change {:.3e}", iteration, change);
        if change < tolerance {
            return Ok(background);
        }
    }

    Err(ThorondorError::ConvergenceError {
        iterations: max_iterations,
        change,
    })
}

// ─────────────────────────────────────────────────────────────
// ALS
// ─────────────────────────────────────────────────────────────

/// 非对称最小二乘基线
///
/// 求解 (W + λ·DᵀD) z = W y，D 为二阶差分；高于基线的点权重 p，其余 1 − p。
fn als(ys: &[f64], lambda: f64, p: f64, iterations: usize) -> Result<Vec<f64>> {
    let m = ys.len();
    if m < 3 {
        return Err(ThorondorError::range(
            "asymmetric least squares needs at least 3 samples",
        ));
    }
    if !(p > 0.0 && p < 1.0) || !(lambda > 0.0) {
        return Err(ThorondorError::InvalidArgument(format!(
            "ALS needs lambda > 0 and 0 < p < 1 (got lambda {}, p {})",
            lambda, p
        )));
    }

    // DᵀD 的三条对角带
    let mut d0 = vec![0.0; m];
    let mut d1 = vec![0.0; m];
    let mut d2 = vec![0.0; m];
    let coeffs = [1.0, -2.0, 1.0];
    for k in 0..m - 2 {
        for a in 0..3 {
            for b in a..3 {
                let v = coeffs[a] * coeffs[b];
                match b - a {
                    0 => d0[k + a] += v,
                    1 => d1[k + a] += v,
                    _ => d2[k + a] += v,
                }
            }
        }
    }

    let mut weights = vec![1.0; m];
    let mut z = ys.to_vec();
    for _ in 0..iterations.max(1) {
        let a0: Vec<f64> = (0..m).map(|i| weights[i] + lambda * d0[i]).collect();
        let a1: Vec<f64> = d1.iter().map(|v| lambda * v).collect();
        let a2: Vec<f64> = d2.iter().map(|v| lambda * v).collect();
        let rhs: Vec<f64> = (0..m).map(|i| weights[i] * ys[i]).collect();
        z = solve_pentadiagonal(&a0, &a1, &a2, &rhs)?;
        for i in 0..m {
            weights[i] = if ys[i] > z[i] { p } else { 1.0 - p };
        }
    }
    Ok(z)
}

/// 对称正定五对角方程组的带状 Cholesky 求解
///
/// a0 为主对角，a1[i] = A[i][i+1]，a2[i] = A[i][i+2]。
fn solve_pentadiagonal(a0: &[f64], a1: &[f64], a2: &[f64], b: &[f64]) -> Result<Vec<f64>> {
    let m = a0.len();
    let mut l0 = vec![0.0; m];
    let mut l1 = vec![0.0; m];
    let mut l2 = vec![0.0; m];

    for i in 0..m {
        if i >= 2 {
            l2[i] = a2[i - 2] / l0[i - 2];
        }
        if i >= 1 {
            let carry = if i >= 2 { l2[i] * l1[i - 1] } else { 0.0 };
            l1[i] = (a1[i - 1] - carry) / l0[i - 1];
        }
        let d = a0[i] - l1[i] * l1[i] - l2[i] * l2[i];
        if !(d > 0.0) {
            return Err(ThorondorError::Other(
                "baseline system is not positive definite".to_string(),
            ));
        }
        l0[i] = d.sqrt();
    }

    let mut u = vec![0.0; m];
    for i in 0..m {
        let mut s = b[i];
        if i >= 1 {
            s -= l1[i] * u[i - 1];
        }
        if i >= 2 {
            s -= l2[i] * u[i - 2];
        }
        u[i] = s / l0[i];
    }

    let mut z = vec![0.0; m];
    for i in (0..m).rev() {
        let mut s = u[i];
        if i + 1 < m {
            s -= l1[i + 1] * z[i + 1];
        }
        if i + 2 < m {
            s -= l2[i + 2] * z[i + 2];
        }
        z[i] = s / l0[i];
    }
    Ok(z)
}

// ─────────────────────────────────────────────────────────────
// Chebyshev
// ─────────────────────────────────────────────────────────────

/// 权重 |y|^(−power)：强度高的峰区对基线影响小
fn chebyshev(xs: &[f64], ys: &[f64], degree: usize, power: f64) -> Result<Vec<f64>> {
    if !(power.is_finite() && power >= 0.0) {
        return Err(ThorondorError::InvalidArgument(format!(
            "Chebyshev weight power must be finite and >= 0, got {}",
            power
        )));
    }
    if power > 0.0 && ys.iter().any(|&y| y == 0.0) {
        return Err(ThorondorError::InvalidArgument(
            "Chebyshev weights |y|^-power are undefined where the intensity is zero".to_string(),
        ));
    }
    let w: Vec<f64> = ys.iter().map(|y| y.abs().powf(-power)).collect();
    let series = ChebyshevSeries::fit_weighted(xs, ys, &w, degree)?;
    Ok(xs.iter().map(|&x| series.eval(x)).collect())
}

// ─────────────────────────────────────────────────────────────
// 锚点样条
// ─────────────────────────────────────────────────────────────

/// 过锚点的单调三次样条，锚点范围外取端点值
fn anchors(xs: &[f64], ys: &[f64], energies: &[f64]) -> Result<Vec<f64>> {
    let (lo, hi) = xs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &x| (a.min(x), b.max(x)));

    let mut picked: Vec<usize> = Vec::with_capacity(energies.len());
    for &e in energies {
        if !(e >= lo && e <= hi) {
            return Err(ThorondorError::range(format!(
                "background anchor {} is outside the window [{}, {}]",
                e, lo, hi
            )));
        }
        let nearest = (0..xs.len())
            .min_by(|&a, &b| (xs[a] - e).abs().total_cmp(&(xs[b] - e).abs()))
            .unwrap_or(0);
        picked.push(nearest);
    }
    picked.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));
    picked.dedup();
    if picked.len() < 2 {
        return Err(ThorondorError::range(
            "an anchor background needs at least 2 distinct anchors",
        ));
    }

    let knots: Vec<(f64, f64)> = picked.iter().map(|&i| (xs[i], ys[i])).collect();
    let slopes = monotone_slopes(&knots);
    Ok(xs.iter().map(|&x| hermite(&knots, &slopes, x)).collect())
}

/// Fritsch–Carlson 切线
fn monotone_slopes(knots: &[(f64, f64)]) -> Vec<f64> {
    let n = knots.len();
    let secant: Vec<f64> = knots
        .windows(2)
        .map(|w| (w[1].1 - w[0].1) / (w[1].0 - w[0].0))
        .collect();

    let mut m = vec![0.0; n];
    m[0] = secant[0];
    m[n - 1] = secant[n - 2];
    for k in 1..n - 1 {
        if secant[k - 1] * secant[k] > 0.0 {
            m[k] = (secant[k - 1] + secant[k]) / 2.0;
        }
    }

    for k in 0..n - 1 {
        if secant[k] == 0.0 {
            m[k] = 0.0;
            m[k + 1] = 0.0;
            continue;
        }
        let alpha = m[k] / secant[k];
        let beta = m[k + 1] / secant[k];
        let r = alpha * alpha + beta * beta;
        if r > 9.0 {
            let tau = 3.0 / r.sqrt();
            m[k] = tau * alpha * secant[k];
            m[k + 1] = tau * beta * secant[k];
        }
    }
    m
}

fn hermite(knots: &[(f64, f64)], slopes: &[f64], x: f64) -> f64 {
    let n = knots.len();
    if x <= knots[0].0 {
        return knots[0].1;
    }
    if x >= knots[n - 1].0 {
        return knots[n - 1].1;
    }
    let k = knots.partition_point(|&(kx, _)| kx <= x).saturating_sub(1).min(n - 2);
    let ((x0, y0), (x1, y1)) = (knots[k], knots[k + 1]);
    let h = x1 - x0;
    let t = (x - x0) / h;
    let (t2, t3) = (t * t, t * t * t);
    (2.0 * t3 - 3.0 * t2 + 1.0) * y0
        + (t3 - 2.0 * t2 + t) * h * slopes[k]
        + (-2.0 * t3 + 3.0 * t2) * y1
        + (t3 - t2) * h * slopes[k + 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;

    /// 台阶背景上的高斯峰（结合能递增排列）
    fn xps_like() -> SpectrumTable {
        let x: Vec<f64> = (0..201).map(|i| 280.0 + i as f64 * 0.05).collect();
        let y = x
            .iter()
            .map(|&e| {
                let peak = 50.0 * (-(e - 285.0).powi(2) / 0.5).exp();
                let step = 10.0 + 5.0 / (1.0 + (-(e - 285.0) / 0.4).exp());
                peak + step
            })
            .collect();
        SpectrumTable::new(x, y, EnergyScale::Binding).unwrap()
    }

    #[test]
    fn test_constant_and_linear() {
        let table = SpectrumTable::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![3.0, 1.0, 2.0, 5.0],
            EnergyScale::Photon,
        )
        .unwrap();
        let min = compute_background(
            &table,
            &BackgroundSpec::new(BackgroundModel::Constant {
                level: ConstantLevel::Minimum,
            }),
        )
        .unwrap();
        assert_eq!(min, vec![1.0; 4]);

        let edges = compute_background(
            &table,
            &BackgroundSpec::new(BackgroundModel::Constant {
                level: ConstantLevel::Edges,
            }),
        )
        .unwrap();
        assert_eq!(edges, vec![4.0; 4]);

        let line = compute_background(&table, &BackgroundSpec::new(BackgroundModel::Linear))
            .unwrap();
        for (bg, x) in line.iter().zip(table.x()) {
            assert!((bg - (3.0 + 2.0 / 3.0 * (x - 1.0))).abs() < 1e-12);
        }
    }

    #[test]
    fn test_shirley_matches_edges_and_rises_across_peak() {
        let table = xps_like();
        let bg = compute_background(&table, &BackgroundSpec::new(BackgroundModel::shirley()))
            .unwrap();
        let n = bg.len();
        assert!((bg[0] - table.y()[0]).abs() < 1e-9);
        assert!((bg[n - 1] - table.y()[n - 1]).abs() < 1e-9);
        assert!(bg[n / 4] < bg[3 * n / 4]);
        assert!(bg.iter().all(|v| (9.9..=15.1).contains(v)));
    }

    #[test]
    fn test_shirley_is_direction_independent() {
        let table = xps_like();
        let reversed = SpectrumTable::new(
            table.x().iter().rev().cloned().collect(),
            table.y().iter().rev().cloned().collect(),
            EnergyScale::Binding,
        )
        .unwrap();
        let spec = BackgroundSpec::new(BackgroundModel::shirley());
        let a = compute_background(&table, &spec).unwrap();
        let mut b = compute_background(&reversed, &spec).unwrap();
        b.reverse();
        for (u, v) in a.iter().zip(&b) {
            assert!((u - v).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shirley_iteration_cap() {
        let spec = BackgroundSpec::new(BackgroundModel::Shirley {
            tolerance: 1e-6,
            max_iterations: 1,
        });
        assert!(matches!(
            compute_background(&xps_like(), &spec),
            Err(ThorondorError::ConvergenceError { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_window_extension() {
        let table = xps_like();
        let spec = BackgroundSpec::new(BackgroundModel::shirley()).with_window(283.0, 287.0);
        let bg = compute_background(&table, &spec).unwrap();
        let idx = table.indices_within(283.0, 287.0);
        let (first, last) = (idx[0], idx[idx.len() - 1]);
        assert!(bg[..first].iter().all(|v| *v == bg[first]));
        assert!(bg[last..].iter().all(|v| *v == bg[last]));

        let bad = BackgroundSpec::new(BackgroundModel::Linear).with_window(290.0, 300.0);
        assert!(compute_background(&table, &bad).is_err());
    }

    #[test]
    fn test_als_follows_baseline_under_peak() {
        let x: Vec<f64> = (0..300).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| 2.0 + 0.01 * v + 20.0 * (-(v - 150.0).powi(2) / 50.0).exp())
            .collect();
        let table = SpectrumTable::new(x.clone(), y, EnergyScale::Photon).unwrap();
        let bg = compute_background(&table, &BackgroundSpec::new(BackgroundModel::als())).unwrap();
        // 峰顶处基线应远低于峰值
        assert!(bg[150] < 6.0);
        assert!((bg[20] - 2.2).abs() < 0.5);
    }

    #[test]
    fn test_chebyshev_background_under_peak() {
        let x: Vec<f64> = (0..300).map(|i| 700.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| 5.0 + 0.1 * (v - 700.0) + 10.0 * (-(v - 715.0).powi(2) / 0.5).exp())
            .collect();
        let table = SpectrumTable::new(x, y, EnergyScale::Photon).unwrap();
        let flat = compute_background(
            &table,
            &BackgroundSpec::new(BackgroundModel::Chebyshev {
                degree: 1,
                power: 0.0,
            }),
        )
        .unwrap();
        let weighted = compute_background(
            &table,
            &BackgroundSpec::new(BackgroundModel::Chebyshev {
                degree: 1,
                power: 4.0,
            }),
        )
        .unwrap();
        // 压低峰区权重后基线更接近真实直线
        let truth = 5.0 + 0.1 * 15.0;
        assert!((weighted[150] - truth).abs() < (flat[150] - truth).abs());
        assert!((weighted[10] - 5.1).abs() < 0.2);
    }

    #[test]
    fn test_chebyshev_rejects_zero_intensity() {
        let table = SpectrumTable::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![1.0, 0.0, 2.0, 1.0],
            EnergyScale::Photon,
        )
        .unwrap();
        let spec = BackgroundSpec::new(BackgroundModel::Chebyshev {
            degree: 1,
            power: 1.0,
        });
        assert!(matches!(
            compute_background(&table, &spec),
            Err(ThorondorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_anchor_spline_passes_through_anchors() {
        let table = xps_like();
        let spec = BackgroundSpec::new(BackgroundModel::Anchors {
            energies: vec![289.0, 281.0, 283.0, 288.0],
        });
        let bg = compute_background(&table, &spec).unwrap();
        for e in [281.0, 283.0, 288.0, 289.0] {
            let i = table.indices_within(e - 0.01, e + 0.01)[0];
            assert!((bg[i] - table.y()[i]).abs() < 1e-12);
        }
        // 锚点外取端点值
        assert_eq!(bg[0], bg[20]);
        assert_eq!(bg[bg.len() - 1], bg[180]);
        // 锚点值单调时样条不过冲
        for w in bg[20..=180].windows(2) {
            assert!(w[1] >= w[0] - 1e-12);
        }

        let single = BackgroundSpec::new(BackgroundModel::Anchors {
            energies: vec![283.0, 283.01],
        });
        assert!(compute_background(&table, &single).is_err());
        let outside = BackgroundSpec::new(BackgroundModel::Anchors {
            energies: vec![283.0, 300.0],
        });
        assert!(compute_background(&table, &outside).is_err());
    }

    #[test]
    fn test_pentadiagonal_solver() {
        // A = I + DᵀD（m = 5）乘以已知解再求回
        let a0 = [2.0, 6.0, 7.0, 6.0, 2.0];
        let a1 = [-2.0, -4.0, -4.0, -2.0, 0.0];
        let a2 = [1.0, 1.0, 1.0, 0.0, 0.0];
        let z = [1.0, -1.0, 2.0, 0.5, 3.0];
        let mut b = [0.0; 5];
        for i in 0..5 {
            b[i] += a0[i] * z[i];
            if i + 1 < 5 {
                b[i] += a1[i] * z[i + 1];
                b[i + 1] += a1[i] * z[i];
            }
            if i + 2 < 5 {
                b[i] += a2[i] * z[i + 2];
                b[i + 2] += a2[i] * z[i];
            }
        }
        let solved = solve_pentadiagonal(&a0, &a1, &a2, &b).unwrap();
        for (s, t) in solved.iter().zip(z) {
            assert!((s - t).abs() < 1e-10);
        }
    }
}
