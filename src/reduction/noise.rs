//! # 噪声估计
//!
//! 以每个点为中心取 `points` 个样本做局部多项式拟合，RMS 偏差作为该点噪声。
//! 用于拟合时的 RMS 权重。
//!
//! ## 依赖关系
//! - 被 `fitting/engine.rs` 使用
//! - 使用 `reduction/polyfit.rs`

use crate::error::{Result, ThorondorError};
use crate::reduction::polyfit::Polynomial;

/// 每个点的局部 RMS 偏差
pub fn local_rms(x: &[f64], y: &[f64], points: usize, degree: usize) -> Result<Vec<f64>> {
    let n = x.len();
    if points < degree + 2 {
        return Err(ThorondorError::range(format!(
            "noise window of {} points is too small for a degree {} polynomial",
            points, degree
        )));
    }
    if points > n {
        return Err(ThorondorError::range(format!(
            "noise window of {} points exceeds the {} available samples",
            points, n
        )));
    }

    let half = points / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - points);
            let range = start..start + points;
            let poly = Polynomial::fit(&x[range.clone()], &y[range.clone()], degree)?;
            let ss: f64 = range.map(|k| (y[k] - poly.eval(x[k])).powi(2)).sum();
            Ok((ss / points as f64).sqrt())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_tracks_noise_level() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        // 交替 ±0.5 的"噪声"叠加在直线上
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 0.3 * v + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let rms = local_rms(&x, &y, 10, 1).unwrap();
        assert_eq!(rms.len(), 100);
        for r in rms {
            assert!((r - 0.5).abs() < 0.05, "rms {}", r);
        }
    }

    #[test]
    fn test_window_validation() {
        let x = [1.0, 2.0, 3.0];
        assert!(local_rms(&x, &x, 2, 1).is_err());
        assert!(local_rms(&x, &x, 5, 1).is_err());
    }
}
