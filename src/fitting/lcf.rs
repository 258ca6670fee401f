//! # 线性组合拟合（LCF）
//!
//! 用若干参考谱的非负线性组合描述约化谱：
//!
//! ```text
//! fit(x) = Σ wⱼ · sⱼ · rⱼ(x + δⱼ)
//! ```
//!
//! δⱼ 与 sⱼ 是每条参考谱的能量平移和强度缩放，rⱼ 线性插值到数据网格上。
//! 默认约束 Σ wⱼ = 1：前 N − 1 个权重在 [0, 1] 内自由，最后一个取 1 − Σ；
//! 关闭约束后所有权重只要求非负。
//!
//! R 因子按百分比给出：100·Σ(y − fit)² / Σy²。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `commands/lcf.rs` 使用
//! - 使用 `fitting/optimizer.rs`, `fitting/params.rs`, `models/spectrum.rs`

use crate::error::{Result, ThorondorError};
use crate::fitting::optimizer::{levenberg_marquardt, Settings, SilentObserver};
use crate::fitting::params::Bounds;
use crate::models::spectrum::SpectrumTable;
use log::{debug, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// 参考谱
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LcfReference {
    pub name: String,
    pub table: SpectrumTable,
    /// 能量平移，加到参考谱的 x 上
    #[serde(default)]
    pub shift: f64,
    /// 强度缩放
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl LcfReference {
    pub fn new(name: impl Into<String>, table: SpectrumTable) -> Self {
        LcfReference {
            name: name.into(),
            table,
            shift: 0.0,
            scale: default_scale(),
        }
    }

    /// 在 x 处线性插值；超出覆盖范围返回 None
    fn sample(&self, x: &[f64]) -> Option<Vec<f64>> {
        let mut points: Vec<(f64, f64)> = self
            .table
            .x()
            .iter()
            .zip(self.table.y())
            .map(|(&rx, &ry)| (rx + self.shift, ry * self.scale))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (lo, hi) = (points[0].0, points[points.len() - 1].0);

        x.iter()
            .map(|&v| {
                if v < lo || v > hi {
                    return None;
                }
                let k = points.partition_point(|p| p.0 <= v).clamp(1, points.len() - 1);
                let ((x0, y0), (x1, y1)) = (points[k - 1], points[k]);
                Some(if x1 > x0 {
                    y0 + (y1 - y0) * (v - x0) / (x1 - x0)
                } else {
                    y0
                })
            })
            .collect()
    }
}

/// LCF 选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcfOptions {
    /// 拟合窗口 [lo, hi]；None 表示整张表
    pub window: Option<(f64, f64)>,
    /// 权重和约束为 1
    pub sum_to_one: bool,
    pub max_iterations: usize,
}

impl Default for LcfOptions {
    fn default() -> Self {
        LcfOptions {
            window: None,
            sum_to_one: true,
            max_iterations: 2000,
        }
    }
}

/// LCF 结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LcfResult {
    pub names: Vec<String>,
    pub weights: Vec<f64>,
    /// 权重的标准误差；有权重贴边或设计矩阵奇异时为 None
    pub stderr: Vec<Option<f64>>,
    pub x: Vec<f64>,
    pub data: Vec<f64>,
    pub fit: Vec<f64>,
    /// 每条参考谱的加权贡献 wⱼ·rⱼ
    pub components: Vec<Vec<f64>>,
    pub r_factor: Option<f64>,
    pub chi_square: f64,
    pub sum_to_one: bool,
    pub iterations: usize,
}

impl LcfResult {
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.weights[i])
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// 对谱表做线性组合拟合
pub fn linear_combination(
    table: &SpectrumTable,
    references: &[LcfReference],
    options: &LcfOptions,
) -> Result<LcfResult> {
    let n_refs = references.len();
    if n_refs < 2 {
        return Err(ThorondorError::InvalidArgument(format!(
            "linear combination fitting needs at least 2 references, got {}",
            n_refs
        )));
    }

    let idx = match options.window {
        None => (0..table.len()).collect::<Vec<_>>(),
        Some((lo, hi)) => {
            if !(lo < hi) {
                return Err(ThorondorError::range(format!(
                    "LCF window [{}, {}] needs lo < hi",
                    lo, hi
                )));
            }
            table.indices_within(lo, hi)
        }
    };
    let x: Vec<f64> = idx.iter().map(|&i| table.x()[i]).collect();
    let y: Vec<f64> = idx.iter().map(|&i| table.y()[i]).collect();
    if x.len() <= n_refs {
        return Err(ThorondorError::range(format!(
            "{} data points cannot determine {} reference weights",
            x.len(),
            n_refs
        )));
    }

    let columns = references
        .iter()
        .map(|r| {
            r.sample(&x).ok_or_else(|| {
                let (lo, hi) = r.table.x_range();
                ThorondorError::range(format!(
                    "reference '{}' covers [{}, {}] (shift {}) but the data span [{}, {}]",
                    r.name,
                    lo,
                    hi,
                    r.shift,
                    x.iter().cloned().fold(f64::INFINITY, f64::min),
                    x.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // 自由权重个数与边界
    let n_free = if options.sum_to_one { n_refs - 1 } else { n_refs };
    let bounds = if options.sum_to_one {
        Bounds::Both(0.0, 1.0)
    } else {
        Bounds::Lower(0.0)
    };
    let expand = |free: &[f64]| -> Vec<f64> {
        let mut w: Vec<f64> = free.iter().map(|&u| bounds.to_external(u)).collect();
        if options.sum_to_one {
            w.push(1.0 - w.iter().sum::<f64>());
        }
        w
    };
    let combine = |w: &[f64]| -> Vec<f64> {
        (0..x.len())
            .map(|i| columns.iter().zip(w).map(|(c, wj)| wj * c[i]).sum())
            .collect()
    };
    let residuals = |free: &[f64]| -> Vec<f64> {
        let fit = combine(&expand(free));
        y.iter().zip(&fit).map(|(a, b)| a - b).collect()
    };

    let start = vec![bounds.to_internal(1.0 / n_refs as f64); n_free];
    let settings = Settings {
        max_iterations: options.max_iterations,
        ftol: 1.0e-12,
        xtol: 1.0e-12,
    };
    debug!("LCF with {} references over {} points", n_refs, x.len());
    let outcome = levenberg_marquardt(&residuals, &start, &settings, &SilentObserver)?;

    let weights = expand(&outcome.params);
    let fit = combine(&weights);
    let chi_square: f64 = y.iter().zip(&fit).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|v| v * v).sum();
    let r_factor = (ss_tot > 0.0).then(|| 100.0 * chi_square / ss_tot);

    let stderr = weight_errors(&columns, &weights, chi_square, x.len(), options.sum_to_one);
    if stderr.iter().all(Option::is_none) {
        warn!("LCF weight uncertainties could not be estimated");
    }

    let components = columns
        .iter()
        .zip(&weights)
        .map(|(c, w)| c.iter().map(|v| v * w).collect())
        .collect();

    Ok(LcfResult {
        names: references.iter().map(|r| r.name.clone()).collect(),
        weights,
        stderr,
        x,
        data: y,
        fit,
        components,
        r_factor,
        chi_square,
        sum_to_one: options.sum_to_one,
        iterations: outcome.iterations,
    })
}

/// 由线性设计矩阵估计权重误差
///
/// 和为 1 时设计矩阵的列为 rⱼ − r_N，最后一个权重的方差为协方差矩阵元素之和。
fn weight_errors(
    columns: &[Vec<f64>],
    weights: &[f64],
    chi_square: f64,
    ndata: usize,
    sum_to_one: bool,
) -> Vec<Option<f64>> {
    let n_refs = columns.len();
    let n_free = if sum_to_one { n_refs - 1 } else { n_refs };
    let none = vec![None; n_refs];

    let at_bound = |w: f64| w.abs() <= 1e-10 || (sum_to_one && (w - 1.0).abs() <= 1e-10);
    if weights[..n_free].iter().any(|&w| at_bound(w)) {
        debug!("An LCF weight sits at a bound");
        return none;
    }
    if ndata <= n_free {
        return none;
    }

    let last = &columns[n_refs - 1];
    let design = DMatrix::from_fn(ndata, n_free, |i, j| {
        if sum_to_one {
            columns[j][i] - last[i]
        } else {
            columns[j][i]
        }
    });
    let dtd = design.transpose() * &design;
    let singular = dtd.clone().svd(false, false).singular_values;
    let (smax, smin) = (singular.max(), singular.min());
    if !(smax > 0.0) || !smax.is_finite() || smin / smax < 1.0e-12 {
        return none;
    }
    let Some(inv) = dtd.try_inverse() else {
        return none;
    };
    let cov = inv * (chi_square / (ndata - n_free) as f64);

    let sd = |v: f64| (v.is_finite() && v >= 0.0).then(|| v.sqrt());
    let mut out: Vec<Option<f64>> = (0..n_free).map(|j| sd(cov[(j, j)])).collect();
    if sum_to_one {
        out.push(sd(cov.iter().sum()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;

    fn peak(x: &[f64], center: f64) -> Vec<f64> {
        x.iter()
            .map(|&v| 0.2 + (-(v - center).powi(2) / 2.0).exp())
            .collect()
    }

    fn reference(name: &str, center: f64, step: f64) -> LcfReference {
        let x: Vec<f64> = (0..)
            .map(|i| 520.0 + i as f64 * step)
            .take_while(|&v| v <= 550.0)
            .collect();
        let y = peak(&x, center);
        LcfReference::new(name, SpectrumTable::new(x, y, EnergyScale::Photon).unwrap())
    }

    fn mixture(weights: &[(f64, f64)], noise: f64) -> SpectrumTable {
        let x: Vec<f64> = (0..200).map(|i| 522.0 + i as f64 * 0.13).collect();
        let y = x
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let clean: f64 = weights
                    .iter()
                    .map(|&(w, c)| w * (0.2 + (-(v - c).powi(2) / 2.0).exp()))
                    .sum();
                clean + noise * if i % 2 == 0 { 1.0 } else { -1.0 }
            })
            .collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    #[test]
    fn test_recovers_mixture_on_different_grids() {
        let refs = [reference("Fe2O3", 530.0, 0.01), reference("Fe", 535.0, 0.01)];
        let table = mixture(&[(0.3, 530.0), (0.7, 535.0)], 0.0);
        let result = linear_combination(&table, &refs, &LcfOptions::default()).unwrap();
        assert!((result.weight("Fe2O3").unwrap() - 0.3).abs() < 1e-4);
        assert!((result.weight("Fe").unwrap() - 0.7).abs() < 1e-4);
        assert!((result.total_weight() - 1.0).abs() < 1e-12);
        assert!(result.r_factor.unwrap() < 1e-6);
        assert_eq!(result.components.len(), 2);
    }

    #[test]
    fn test_free_sum_and_uncertainties() {
        let refs = [reference("a", 530.0, 0.05), reference("b", 535.0, 0.05)];
        let table = mixture(&[(0.5, 530.0), (0.2, 535.0)], 0.01);
        let options = LcfOptions {
            sum_to_one: false,
            ..Default::default()
        };
        let result = linear_combination(&table, &refs, &options).unwrap();
        assert!((result.weights[0] - 0.5).abs() < 0.01);
        assert!((result.weights[1] - 0.2).abs() < 0.01);
        assert!(result.stderr.iter().all(|s| s.map_or(false, |v| v > 0.0 && v < 0.01)));
        assert!(!result.sum_to_one);
    }

    #[test]
    fn test_shift_aligns_reference() {
        let mut shifted = reference("a", 528.0, 0.05);
        shifted.shift = 2.0;
        let refs = [shifted, reference("b", 535.0, 0.05)];
        let table = mixture(&[(0.6, 530.0), (0.4, 535.0)], 0.0);
        let result = linear_combination(&table, &refs, &LcfOptions::default()).unwrap();
        assert!((result.weights[0] - 0.6).abs() < 1e-3);
    }

    #[test]
    fn test_needs_references_covering_the_data() {
        let table = mixture(&[(1.0, 530.0)], 0.0);
        let one = [reference("a", 530.0, 0.05)];
        assert!(matches!(
            linear_combination(&table, &one, &LcfOptions::default()),
            Err(ThorondorError::InvalidArgument(_))
        ));

        let mut narrow = reference("b", 535.0, 0.05);
        narrow.shift = 5.0;
        let refs = [reference("a", 530.0, 0.05), narrow];
        assert!(matches!(
            linear_combination(&table, &refs, &LcfOptions::default()),
            Err(ThorondorError::RangeError { .. })
        ));

        let windowed = LcfOptions {
            window: Some((530.0, 545.0)),
            ..Default::default()
        };
        assert!(linear_combination(&table, &refs, &windowed).is_ok());
    }
}
