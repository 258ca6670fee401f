//! # 拟合引擎
//!
//! 在谱表上对 `PeakModel` 做非线性最小二乘拟合：
//! 1. 选取拟合窗口与权重
//! 2. 自由参数经边界变换映射到内部坐标，固定参数与链接参数不进入自由向量
//! 3. 调用优化器（LM 或 Nelder-Mead）
//! 4. 在最优点用中心差分 Jacobian 估计协方差、标准误差与相关系数
//! 5. 计算 chi²、约化 chi²、AIC/BIC、R 因子
//!
//! 协方差不可估计（奇异、参数贴边界、自由度为零）时误差记为不可用，
//! 拟合本身仍然成功。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `commands/fit.rs` 使用
//! - 使用 `fitting/model.rs`, `fitting/optimizer.rs`, `fitting/result.rs`,
//!   `reduction/noise.rs`

use crate::error::{Result, ThorondorError};
use crate::fitting::model::PeakModel;
use crate::fitting::optimizer::{
    levenberg_marquardt, nelder_mead, FitObserver, Settings, SilentObserver,
};
use crate::fitting::params::Bounds;
use crate::fitting::result::{FitResult, FitStatistics, ParameterEstimate};
use crate::models::spectrum::SpectrumTable;
use crate::reduction::noise::local_rms;
use log::{debug, info, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 最小化方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitMethod {
    #[default]
    LevenbergMarquardt,
    NelderMead,
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMethod::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
            FitMethod::NelderMead => write!(f, "Nelder-Mead"),
        }
    }
}

/// 残差权重
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    None,
    /// w = 1/|y|
    InverseIntensity,
    /// w = 1/局部 RMS 偏差
    Rms { points: usize, degree: usize },
}

/// 拟合选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub method: FitMethod,
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    /// 拟合窗口 [lo, hi]；None 表示整张表
    pub window: Option<(f64, f64)>,
    pub weighting: Weighting,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            method: FitMethod::LevenbergMarquardt,
            max_iterations: 2000,
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            window: None,
            weighting: Weighting::None,
        }
    }
}

/// 以默认选项和指定方法拟合
pub fn fit(table: &SpectrumTable, model: &PeakModel, method: FitMethod) -> Result<FitResult> {
    FitEngine::new(FitOptions {
        method,
        ..Default::default()
    })
    .fit(table, model)
}

/// 拟合引擎
#[derive(Debug, Clone, Default)]
pub struct FitEngine {
    options: FitOptions,
}

impl FitEngine {
    pub fn new(options: FitOptions) -> Self {
        FitEngine { options }
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn fit(&self, table: &SpectrumTable, model: &PeakModel) -> Result<FitResult> {
        self.fit_observed(table, model, &SilentObserver)
    }

    /// 拟合并把每次迭代报告给观察者
    pub fn fit_observed(
        &self,
        table: &SpectrumTable,
        model: &PeakModel,
        observer: &dyn FitObserver,
    ) -> Result<FitResult> {
        let opts = &self.options;
        let (x, y) = self.select(table)?;

        let free = model.free_indices().to_vec();
        if free.is_empty() {
            return Err(ThorondorError::InvalidModelError(
                "model has no free parameters".to_string(),
            ));
        }
        if x.len() < free.len() {
            return Err(ThorondorError::InvalidModelError(format!(
                "{} data points cannot determine {} free parameters",
                x.len(),
                free.len()
            )));
        }

        let weights = self.weights(&x, &y)?;
        let base = model.values();
        let bounds: Vec<Bounds> = free.iter().map(|&i| model.param_at(i).bounds()).collect();
        let start: Vec<f64> = free
            .iter()
            .zip(&bounds)
            .map(|(&i, b)| b.to_internal(model.param_at(i).clamp(base[i])))
            .collect();

        let external = |internal: &[f64]| -> Vec<f64> {
            let mut values = base.clone();
            for ((&i, b), &u) in free.iter().zip(&bounds).zip(internal) {
                values[i] = b.to_external(u);
            }
            model.resolve(&mut values);
            values
        };
        let residuals = |internal: &[f64]| -> Vec<f64> {
            let values = external(internal);
            let fit = model.evaluate_resolved(&x, &values);
            y.iter()
                .zip(&fit)
                .zip(&weights)
                .map(|((yi, fi), wi)| (yi - fi) * wi)
                .collect()
        };

        let settings = Settings {
            max_iterations: opts.max_iterations,
            ftol: opts.ftol,
            xtol: opts.xtol,
        };
        debug!(
            "Fitting {} free parameters to {} points with {}",
            free.len(),
            x.len(),
            opts.method
        );
        let outcome = match opts.method {
            FitMethod::LevenbergMarquardt => {
                levenberg_marquardt(&residuals, &start, &settings, observer)?
            }
            FitMethod::NelderMead => nelder_mead(&residuals, &start, &settings, observer)?,
        };

        let values = external(&outcome.params);
        let best_fit = model.evaluate_resolved(&x, &values);

        // ── 统计量 ──
        let ndata = x.len();
        let nvarys = free.len();
        let nfree = ndata - nvarys;
        let chi_square: f64 = y
            .iter()
            .zip(&best_fit)
            .zip(&weights)
            .map(|((yi, fi), wi)| ((yi - fi) * wi).powi(2))
            .sum();
        let reduced_chi_square = (nfree > 0).then(|| chi_square / nfree as f64);

        let n = ndata as f64;
        let neg2_log_likelihood = n * (chi_square.max(1.0e-250 * n) / n).ln();
        let aic = neg2_log_likelihood + 2.0 * nvarys as f64;
        let bic = neg2_log_likelihood + n.ln() * nvarys as f64;

        let ss_res: f64 = y.iter().zip(&best_fit).map(|(a, b)| (a - b).powi(2)).sum();
        let ss_tot: f64 = y.iter().map(|v| v * v).sum();
        let r_factor = (ss_tot > 0.0).then(|| 100.0 * ss_res / ss_tot);
        let pearson_chi_square = best_fit.iter().all(|f| *f > 0.0).then(|| {
            y.iter()
                .zip(&best_fit)
                .map(|(a, f)| (a - f).powi(2) / f)
                .sum::<f64>()
        });

        // ── 误差 ──
        let covariance = reduced_chi_square
            .and_then(|redchi| covariance(model, &x, &weights, &values, &free, redchi));
        if covariance.is_none() {
            warn!("Standard errors could not be estimated for this fit");
        }

        let parameters = (0..model.len())
            .map(|i| {
                let p = model.param_at(i);
                let stderr = covariance.as_ref().and_then(|cov| {
                    let variance = if let Some(pos) = free.iter().position(|&f| f == i) {
                        Some(cov[(pos, pos)])
                    } else if p.expr.is_some() {
                        Some(linked_variance(model, &values, &free, i, cov))
                    } else {
                        None
                    };
                    variance
                        .filter(|v| v.is_finite() && *v >= 0.0)
                        .map(f64::sqrt)
                });
                ParameterEstimate {
                    name: p.name.clone(),
                    value: values[i],
                    stderr,
                    init_value: base[i],
                    min: p.min,
                    max: p.max,
                    vary: p.vary,
                    expr: p.expr.clone(),
                }
            })
            .collect();

        let mut correlations: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        if let Some(cov) = &covariance {
            for (a, &ia) in free.iter().enumerate() {
                for (b, &ib) in free.iter().enumerate() {
                    if a == b {
                        continue;
                    }
                    let denom = (cov[(a, a)] * cov[(b, b)]).sqrt();
                    if denom > 0.0 && denom.is_finite() {
                        correlations
                            .entry(model.names()[ia].clone())
                            .or_default()
                            .insert(model.names()[ib].clone(), cov[(a, b)] / denom);
                    }
                }
            }
        }

        let statistics = FitStatistics {
            ndata,
            nvarys,
            nfree,
            chi_square,
            reduced_chi_square,
            aic,
            bic,
            r_factor,
            pearson_chi_square,
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
        };
        info!(
            "Fit converged after {} iterations: chi2 = {:.6e}, R-factor = {}",
            outcome.iterations,
            chi_square,
            r_factor.map_or("n/a".to_string(), |r| format!("{:.4e} %", r))
        );

        let components = model.evaluate_components(&x, &values);
        Ok(FitResult::new(
            opts.method,
            parameters,
            correlations,
            x,
            y,
            best_fit,
            weights,
            components,
            model.with_values(&values),
            statistics,
        ))
    }

    /// 模型在当前参数值下的加权残差平方和（不拟合）
    pub(crate) fn chi_square(&self, table: &SpectrumTable, model: &PeakModel) -> Result<f64> {
        let (x, y) = self.select(table)?;
        let weights = self.weights(&x, &y)?;
        let mut values = model.values();
        model.resolve(&mut values);
        let fit = model.evaluate_resolved(&x, &values);
        Ok(y.iter()
            .zip(&fit)
            .zip(&weights)
            .map(|((yi, fi), wi)| ((yi - fi) * wi).powi(2))
            .sum())
    }

    /// 按窗口截取数据
    fn select(&self, table: &SpectrumTable) -> Result<(Vec<f64>, Vec<f64>)> {
        match self.options.window {
            None => Ok((table.x().to_vec(), table.y().to_vec())),
            Some((lo, hi)) => {
                if !(lo < hi) {
                    return Err(ThorondorError::range(format!(
                        "fit window [{}, {}] is empty",
                        lo, hi
                    )));
                }
                let idx = table.indices_within(lo, hi);
                if idx.is_empty() {
                    return Err(ThorondorError::range(format!(
                        "fit window [{}, {}] contains no samples",
                        lo, hi
                    )));
                }
                Ok((
                    idx.iter().map(|&i| table.x()[i]).collect(),
                    idx.iter().map(|&i| table.y()[i]).collect(),
                ))
            }
        }
    }

    fn weights(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        let invert = |values: &[f64], what: &str| -> Result<Vec<f64>> {
            values
                .iter()
                .map(|v| {
                    if *v != 0.0 && v.is_finite() {
                        Ok(1.0 / v.abs())
                    } else {
                        Err(ThorondorError::InvalidArgument(format!(
                            "{} weights need non-zero values at every point",
                            what
                        )))
                    }
                })
                .collect()
        };
        match self.options.weighting {
            Weighting::None => Ok(vec![1.0; y.len()]),
            Weighting::InverseIntensity => invert(y, "inverse-intensity"),
            Weighting::Rms { points, degree } => invert(&local_rms(x, y, points, degree)?, "RMS"),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 协方差
// ─────────────────────────────────────────────────────────────

/// 扰动一个参数并重新解析链接
fn perturbed(model: &PeakModel, values: &[f64], i: usize, delta: f64) -> Vec<f64> {
    let mut v = values.to_vec();
    v[i] += delta;
    model.resolve(&mut v);
    v
}

fn step_for(value: f64) -> f64 {
    f64::EPSILON.cbrt() * value.abs().max(1.0e-3)
}

/// 以外部参数为自变量的加权 Jacobian（中心差分）
fn external_jacobian(
    model: &PeakModel,
    x: &[f64],
    weights: &[f64],
    values: &[f64],
    free: &[usize],
) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(x.len(), free.len());
    for (col, &i) in free.iter().enumerate() {
        let h = step_for(values[i]);
        let plus = model.evaluate_resolved(x, &perturbed(model, values, i, h));
        let minus = model.evaluate_resolved(x, &perturbed(model, values, i, -h));
        for row in 0..x.len() {
            jac[(row, col)] = weights[row] * (plus[row] - minus[row]) / (2.0 * h);
        }
    }
    jac
}

/// cov = (JᵀJ)⁻¹ · redchi；奇异或有参数贴边界时返回 None
fn covariance(
    model: &PeakModel,
    x: &[f64],
    weights: &[f64],
    values: &[f64],
    free: &[usize],
    redchi: f64,
) -> Option<DMatrix<f64>> {
    if let Some(&i) = free
        .iter()
        .find(|&&i| model.param_at(i).at_bound(values[i]))
    {
        debug!("Parameter {} sits at a bound", model.names()[i]);
        return None;
    }

    let jac = external_jacobian(model, x, weights, values, free);
    let jtj = jac.transpose() * &jac;
    let singular = jtj.clone().svd(false, false).singular_values;
    let (smax, smin) = (singular.max(), singular.min());
    if !(smax > 0.0) || !smax.is_finite() || smin / smax < 1.0e-12 {
        debug!("JᵀJ is singular (condition ratio {:.3e})", smin / smax);
        return None;
    }
    jtj.try_inverse().map(|inv| inv * redchi)
}

/// 链接参数的方差：沿表达式梯度传播
fn linked_variance(
    model: &PeakModel,
    values: &[f64],
    free: &[usize],
    linked: usize,
    cov: &DMatrix<f64>,
) -> f64 {
    let grad: Vec<f64> = free
        .iter()
        .map(|&i| {
            let h = step_for(values[i]);
            let plus = perturbed(model, values, i, h)[linked];
            let minus = perturbed(model, values, i, -h)[linked];
            (plus - minus) / (2.0 * h)
        })
        .collect();
    let mut var = 0.0;
    for a in 0..free.len() {
        for b in 0..free.len() {
            var += grad[a] * cov[(a, b)] * grad[b];
        }
    }
    var
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::model::PeakComponent;
    use crate::fitting::shapes::ShapeKind;
    use crate::models::spectrum::EnergyScale;

    fn axis() -> Vec<f64> {
        (0..=200).map(|i| 400.0 + i as f64 * 0.1).collect()
    }

    fn gaussian_table() -> SpectrumTable {
        let x = axis();
        let f = ShapeKind::Gaussian.evaluator();
        let y = x.iter().map(|&xi| f(xi, &[100.0, 409.9, 1.0])).collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    fn one_gaussian() -> PeakModel {
        PeakModel::new(vec![PeakComponent::new("P0_", ShapeKind::Gaussian)
            .with_value("amplitude", 90.0)
            .with_value("center", 409.7)
            .with_value("sigma", 1.2)])
        .unwrap()
    }

    #[test]
    fn test_single_gaussian_scenario() {
        let result = fit(&gaussian_table(), &one_gaussian(), FitMethod::LevenbergMarquardt).unwrap();

        assert!((result.value("P0_center").unwrap() - 409.9).abs() < 1e-6);
        assert!((result.value("P0_amplitude").unwrap() - 100.0).abs() < 1e-5);
        assert!((result.value("P0_sigma").unwrap() - 1.0).abs() < 1e-6);

        let stats = result.statistics();
        assert_eq!(stats.ndata, 201);
        assert_eq!(stats.nvarys, 3);
        assert_eq!(stats.nfree, 198);
        assert!(stats.r_factor.unwrap() < 1e-8);
        assert!(stats.chi_square < 1e-8);
        assert!(stats.aic.is_finite() && stats.bic.is_finite());

        for name in ["P0_amplitude", "P0_center", "P0_sigma"] {
            let err = result.stderr(name).unwrap();
            assert!(err.is_finite() && err < 1e-3, "{} stderr {}", name, err);
        }
        assert!(result.correlation("P0_amplitude", "P0_sigma").is_some());
        assert_eq!(result.residuals().len(), 201);
    }

    #[test]
    fn test_refit_is_deterministic() {
        let table = gaussian_table();
        let model = one_gaussian();
        let a = fit(&table, &model, FitMethod::LevenbergMarquardt).unwrap();
        let b = fit(&table, &model, FitMethod::LevenbergMarquardt).unwrap();
        for (pa, pb) in a.parameters().iter().zip(b.parameters()) {
            assert_eq!(pa.value, pb.value);
        }
    }

    #[test]
    fn test_expression_link_holds_after_fit() {
        let x = axis();
        let f = ShapeKind::Gaussian.evaluator();
        let y = x
            .iter()
            .map(|&xi| f(xi, &[50.0, 405.0, 0.8]) + f(xi, &[30.0, 407.0, 0.8]))
            .collect();
        let table = SpectrumTable::new(x, y, EnergyScale::Photon).unwrap();

        let mut model = PeakModel::new(vec![
            PeakComponent::new("P0_", ShapeKind::Gaussian)
                .with_value("amplitude", 45.0)
                .with_value("center", 405.2)
                .with_value("sigma", 0.9),
            PeakComponent::new("P1_", ShapeKind::Gaussian)
                .with_value("amplitude", 35.0)
                .with_value("center", 406.9)
                .with_value("sigma", 0.9),
        ])
        .unwrap();
        model.set_expr("P1_sigma", Some("P0_sigma".parse().unwrap())).unwrap();
        model.set_expr("P1_center", Some("P0_center + 2".parse().unwrap())).unwrap();

        let result = fit(&table, &model, FitMethod::LevenbergMarquardt).unwrap();
        let p0_sigma = result.value("P0_sigma").unwrap();
        let p0_center = result.value("P0_center").unwrap();
        assert_eq!(result.value("P1_sigma").unwrap(), p0_sigma);
        assert_eq!(result.value("P1_center").unwrap(), p0_center + 2.0);
        assert!((p0_sigma - 0.8).abs() < 1e-6);
        assert_eq!(result.statistics().nvarys, 4);
        assert!(result.stderr("P1_sigma").is_some());
    }

    #[test]
    fn test_zero_free_parameters_is_invalid() {
        let mut model = one_gaussian();
        for name in ["P0_amplitude", "P0_center", "P0_sigma"] {
            model.set_vary(name, false).unwrap();
        }
        let err = fit(&gaussian_table(), &model, FitMethod::LevenbergMarquardt);
        assert!(matches!(err, Err(ThorondorError::InvalidModelError(_))));
    }

    #[test]
    fn test_inestimable_errors_are_partial_success() {
        let x = axis();
        let y = vec![5.0; x.len()];
        let table = SpectrumTable::new(x, y, EnergyScale::Photon).unwrap();
        let mut model = PeakModel::new(vec![
            PeakComponent::new("Bcgd_", ShapeKind::Constant).with_value("c", 4.0),
            PeakComponent::new("P0_", ShapeKind::Gaussian)
                .with_value("amplitude", 0.0)
                .with_value("center", 410.0),
        ])
        .unwrap();
        model.set_vary("P0_amplitude", false).unwrap();

        let result = fit(&table, &model, FitMethod::LevenbergMarquardt).unwrap();
        assert!((result.value("Bcgd_c").unwrap() - 5.0).abs() < 1e-8);
        assert!(!result.has_uncertainties());
        assert!(result.stderr("P0_center").is_none());
        assert!(result.correlations().is_empty());
    }

    #[test]
    fn test_nelder_mead_converges() {
        let result = fit(&gaussian_table(), &one_gaussian(), FitMethod::NelderMead).unwrap();
        assert_eq!(result.method(), FitMethod::NelderMead);
        assert!((result.value("P0_center").unwrap() - 409.9).abs() < 1e-3);
        assert!((result.value("P0_amplitude").unwrap() - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_window_validation() {
        let table = gaussian_table();
        for window in [(500.0, 510.0), (410.0, 400.0)] {
            let engine = FitEngine::new(FitOptions {
                window: Some(window),
                ..Default::default()
            });
            assert!(matches!(
                engine.fit(&table, &one_gaussian()),
                Err(ThorondorError::RangeError { .. })
            ));
        }

        let engine = FitEngine::new(FitOptions {
            window: Some((404.95, 415.05)),
            ..Default::default()
        });
        let result = engine.fit(&table, &one_gaussian()).unwrap();
        assert_eq!(result.x().len(), 101);
    }

    #[test]
    fn test_inverse_intensity_needs_non_zero_data() {
        let x = axis();
        let mut y = vec![1.0; x.len()];
        y[10] = 0.0;
        let table = SpectrumTable::new(x, y, EnergyScale::Photon).unwrap();
        let engine = FitEngine::new(FitOptions {
            weighting: Weighting::InverseIntensity,
            ..Default::default()
        });
        assert!(matches!(
            engine.fit(&table, &one_gaussian()),
            Err(ThorondorError::InvalidArgument(_))
        ));
    }
}
