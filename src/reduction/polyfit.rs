//! # 最小二乘多项式
//!
//! x 先平移缩放到 [-1, 1] 再构造设计矩阵，用 SVD 求解，避免高能量值
//! （几百 eV）带来的病态。
//!
//! - `Polynomial`: 幂基，无权重
//! - `ChebyshevSeries`: 第一类 Chebyshev 基，逐点权重（乘在残差上）
//!
//! ## 依赖关系
//! - 被 `reduction/deglitch.rs`, `reduction/noise.rs`, `reduction/background.rs`,
//!   `reduction/edge_jump.rs` 使用
//! - 使用 `nalgebra`

use crate::error::{Result, ThorondorError};
use nalgebra::{DMatrix, DVector};

/// 拟合得到的多项式
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    center: f64,
    scale: f64,
    /// 关于 t = (x − center)/scale 的系数，低次在前
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn fit(x: &[f64], y: &[f64], degree: usize) -> Result<Self> {
        let n = x.len();
        if n != y.len() {
            return Err(ThorondorError::InvalidArgument(format!(
                "polynomial fit got {} x values and {} y values",
                n,
                y.len()
            )));
        }
        if n <= degree {
            return Err(ThorondorError::range(format!(
                "a degree {} polynomial needs at least {} points, got {}",
                degree,
                degree + 1,
                n
            )));
        }

        let center = x.iter().sum::<f64>() / n as f64;
        let spread = x.iter().fold(0.0_f64, |acc, v| acc.max((v - center).abs()));
        let scale = if spread > 0.0 { spread } else { 1.0 };

        let a = DMatrix::from_fn(n, degree + 1, |i, j| ((x[i] - center) / scale).powi(j as i32));
        let coeffs = solve_least_squares(a, DVector::from_column_slice(y))?;

        Ok(Polynomial {
            center,
            scale,
            coeffs,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }
}

/// 用 SVD 求解超定方程组 A·c ≈ b
pub(crate) fn solve_least_squares(a: DMatrix<f64>, b: DVector<f64>) -> Result<Vec<f64>> {
    a.svd(true, true)
        .solve(&b, 1.0e-12)
        .map(|c| c.iter().cloned().collect())
        .map_err(|e| ThorondorError::Other(format!("least-squares solve failed: {}", e)))
}

// ─────────────────────────────────────────────────────────────
// Chebyshev
// ─────────────────────────────────────────────────────────────

/// 拟合得到的 Chebyshev 级数，定义域 [lo, hi] 映射到 [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevSeries {
    lo: f64,
    hi: f64,
    coeffs: Vec<f64>,
}

impl ChebyshevSeries {
    /// 加权拟合：最小化 Σ (wᵢ·(yᵢ − p(xᵢ)))²
    pub fn fit_weighted(x: &[f64], y: &[f64], w: &[f64], degree: usize) -> Result<Self> {
        let n = x.len();
        if n != y.len() || n != w.len() {
            return Err(ThorondorError::InvalidArgument(format!(
                "Chebyshev fit got {} x values, {} y values and {} weights",
                n,
                y.len(),
                w.len()
            )));
        }
        if n <= degree {
            return Err(ThorondorError::range(format!(
                "a degree {} Chebyshev series needs at least {} points, got {}",
                degree,
                degree + 1,
                n
            )));
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ThorondorError::InvalidArgument(
                "Chebyshev weights must be finite and non-negative".to_string(),
            ));
        }

        let lo = x.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut series = ChebyshevSeries {
            lo,
            hi,
            coeffs: vec![0.0; degree + 1],
        };

        let mut a = DMatrix::zeros(n, degree + 1);
        for i in 0..n {
            let t = series.basis(x[i]);
            for j in 0..=degree {
                a[(i, j)] = w[i] * t[j];
            }
        }
        let b = DVector::from_iterator(n, y.iter().zip(w).map(|(yi, wi)| yi * wi));
        series.coeffs = solve_least_squares(a, b)?;
        Ok(series)
    }

    fn reduced(&self, x: f64) -> f64 {
        if self.hi > self.lo {
            (2.0 * x - (self.lo + self.hi)) / (self.hi - self.lo)
        } else {
            0.0
        }
    }

    /// T_0..T_degree 在 x 处的值（三项递推）
    fn basis(&self, x: f64) -> Vec<f64> {
        let t = self.reduced(x);
        let mut out = Vec::with_capacity(self.coeffs.len());
        for k in 0..self.coeffs.len() {
            let v = match k {
                0 => 1.0,
                1 => t,
                _ => 2.0 * t * out[k - 1] - out[k - 2],
            };
            out.push(v);
        }
        out
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.basis(x)
            .iter()
            .zip(&self.coeffs)
            .map(|(t, c)| t * c)
            .sum()
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_cubic_at_high_energy() {
        let x: Vec<f64> = (0..30).map(|i| 700.0 + i as f64 * 0.5).collect();
        let f = |v: f64| 2.0 - 0.5 * (v - 705.0) + 0.01 * (v - 705.0).powi(3);
        let y: Vec<f64> = x.iter().map(|&v| f(v)).collect();
        let p = Polynomial::fit(&x, &y, 3).unwrap();
        assert_eq!(p.degree(), 3);
        for v in [700.0, 703.3, 714.5] {
            assert!((p.eval(v) - f(v)).abs() < 1e-8);
        }
    }

    #[test]
    fn test_chebyshev_reproduces_quadratic() {
        let x: Vec<f64> = (0..40).map(|i| 520.0 + i as f64 * 0.5).collect();
        let f = |v: f64| 3.0 + 0.2 * (v - 525.0) - 0.01 * (v - 525.0).powi(2);
        let y: Vec<f64> = x.iter().map(|&v| f(v)).collect();
        let w: Vec<f64> = y.iter().map(|v| 1.0 / v.abs()).collect();
        let series = ChebyshevSeries::fit_weighted(&x, &y, &w, 2).unwrap();
        assert_eq!(series.degree(), 2);
        for v in [520.0, 531.7, 539.5] {
            assert!((series.eval(v) - f(v)).abs() < 1e-8);
        }
    }

    #[test]
    fn test_chebyshev_weights_pull_the_fit() {
        // 两组数据各占一半，权重把常数拉向权重大的一侧
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 5 { 1.0 } else { 3.0 }).collect();
        let even = ChebyshevSeries::fit_weighted(&x, &y, &[1.0; 10], 0).unwrap();
        assert!((even.eval(4.0) - 2.0).abs() < 1e-12);

        let w: Vec<f64> = (0..10).map(|i| if i < 5 { 3.0 } else { 1.0 }).collect();
        let tilted = ChebyshevSeries::fit_weighted(&x, &y, &w, 0).unwrap();
        assert!((tilted.eval(4.0) - 1.2).abs() < 1e-12);

        assert!(ChebyshevSeries::fit_weighted(&x, &y, &[f64::NAN; 10], 0).is_err());
    }

    #[test]
    fn test_needs_enough_points() {
        assert!(Polynomial::fit(&[1.0, 2.0], &[1.0, 2.0], 2).is_err());
        assert!(Polynomial::fit(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 2).is_ok());
    }
}
