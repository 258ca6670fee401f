//! # 归一化
//!
//! 用窗口 [x_lo, x_hi] 内的统计量除整条谱：
//! - `Mean`: 窗口平均值（归一化后窗口均值为 1）
//! - `Maximum`: 窗口最大值
//! - `Area`: 窗口内梯形积分
//!
//! ## 依赖关系
//! - 被 `reduction/reducer.rs` 使用
//! - 使用 `models/spectrum.rs`

use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use crate::reduction::trapezoid;
use serde::{Deserialize, Serialize};

/// 归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    #[default]
    Mean,
    Maximum,
    Area,
}

/// 归一化设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSpec {
    #[serde(default)]
    pub mode: NormalizationMode,
    pub window: (f64, f64),
}

impl NormalizationSpec {
    pub fn mean(lo: f64, hi: f64) -> Self {
        NormalizationSpec {
            mode: NormalizationMode::Mean,
            window: (lo, hi),
        }
    }
}

/// 计算归一化因子
///
/// 窗口为空、超出表的 x 范围、样本少于 2 个、或因子为零/非有限时返回 `RangeError`。
pub fn normalization_factor(table: &SpectrumTable, spec: &NormalizationSpec) -> Result<f64> {
    let (lo, hi) = spec.window;
    if !(lo < hi) {
        return Err(ThorondorError::range(format!(
            "normalization window [{}, {}] needs x_lo < x_hi",
            lo, hi
        )));
    }
    let (min, max) = table.x_range();
    if lo < min || hi > max {
        return Err(ThorondorError::range(format!(
            "normalization window [{}, {}] is outside the table range [{}, {}]",
            lo, hi, min, max
        )));
    }

    let idx = table.indices_within(lo, hi);
    if idx.len() < 2 {
        return Err(ThorondorError::range(format!(
            "normalization window [{}, {}] contains {} sample(s), at least 2 are required",
            lo,
            hi,
            idx.len()
        )));
    }

    let ys: Vec<f64> = idx.iter().map(|&i| table.y()[i]).collect();
    let factor = match spec.mode {
        NormalizationMode::Mean => ys.iter().sum::<f64>() / ys.len() as f64,
        NormalizationMode::Maximum => ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        NormalizationMode::Area => {
            let xs: Vec<f64> = idx.iter().map(|&i| table.x()[i]).collect();
            trapezoid(&xs, &ys)
        }
    };

    if factor == 0.0 || !factor.is_finite() {
        return Err(ThorondorError::range(format!(
            "normalization factor over [{}, {}] is {}",
            lo, hi, factor
        )));
    }
    Ok(factor)
}

/// 归一化，返回新表与所用因子
pub fn normalize(table: &SpectrumTable, spec: &NormalizationSpec) -> Result<(SpectrumTable, f64)> {
    let factor = normalization_factor(table, spec)?;
    let y = table.y().iter().map(|v| v / factor).collect();
    Ok((table.with_y(y)?, factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;

    fn table() -> SpectrumTable {
        let x: Vec<f64> = (0..50).map(|i| 700.0 + i as f64 * 0.5).collect();
        let y = x.iter().map(|v| 3.0 + (v - 700.0).sin()).collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    #[test]
    fn test_mean_over_window_becomes_one() {
        let t = table();
        for (lo, hi) in [(700.0, 724.5), (705.2, 710.0), (710.0, 711.0)] {
            let (out, _) = normalize(&t, &NormalizationSpec::mean(lo, hi)).unwrap();
            let idx = out.indices_within(lo, hi);
            let mean = idx.iter().map(|&i| out.y()[i]).sum::<f64>() / idx.len() as f64;
            assert!((mean - 1.0).abs() < 1e-12, "[{}, {}]", lo, hi);
        }
    }

    #[test]
    fn test_single_sample_window_is_range_error() {
        let err = normalize(&table(), &NormalizationSpec::mean(710.1, 710.6));
        assert!(matches!(err, Err(ThorondorError::RangeError { .. })));
    }

    #[test]
    fn test_invalid_windows() {
        let t = table();
        for (lo, hi) in [(712.0, 711.0), (711.0, 711.0), (690.0, 710.0), (710.0, 730.0)] {
            assert!(
                normalize(&t, &NormalizationSpec::mean(lo, hi)).is_err(),
                "[{}, {}]",
                lo,
                hi
            );
        }
    }

    #[test]
    fn test_maximum_and_area_modes() {
        let t = SpectrumTable::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![1.0, 4.0, 2.0, 2.0],
            EnergyScale::Photon,
        )
        .unwrap();
        let spec = NormalizationSpec {
            mode: NormalizationMode::Maximum,
            window: (0.0, 3.0),
        };
        assert_eq!(normalization_factor(&t, &spec).unwrap(), 4.0);

        let spec = NormalizationSpec {
            mode: NormalizationMode::Area,
            window: (0.0, 2.0),
        };
        assert_eq!(normalization_factor(&t, &spec).unwrap(), 2.5 + 3.0);
    }

    #[test]
    fn test_zero_factor_is_rejected() {
        let t = SpectrumTable::new(vec![0.0, 1.0, 2.0], vec![1.0, -1.0, 1.0], EnergyScale::Photon)
            .unwrap();
        assert!(normalize(&t, &NormalizationSpec::mean(0.0, 1.0)).is_err());
    }
}
