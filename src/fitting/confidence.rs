//! # F 检验置信区间
//!
//! 对每个自由参数，把它固定在试探值上重新拟合其余参数，用 F 检验比较
//! 新的 χ² 与最优 χ²：
//!
//! ```text
//! F = (χ²/χ²_best − 1) · (N − P)
//! p = F_cdf(F; 1, N − P)
//! ```
//!
//! p 达到 erf(nσ/√2) 的位置就是 nσ 区间的端点。先以标准误差（没有时取 |值| 的 10%）
//! 为步长向两侧外推找到包围区间，再二分求端点。碰到参数边界或外推步数用尽时，
//! 该侧端点为 None。
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs` 使用
//! - 使用 `fitting/engine.rs`, `fitting/special.rs`

use crate::error::{Result, ThorondorError};
use crate::fitting::engine::{FitEngine, FitOptions};
use crate::fitting::model::PeakModel;
use crate::fitting::result::FitResult;
use crate::fitting::special::{erf, f_cdf};
use crate::models::spectrum::SpectrumTable;
use log::debug;
use serde::{Deserialize, Serialize};

const MAX_STEPS: usize = 50;
const BISECTIONS: usize = 40;

/// 某一置信水平下的区间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceLevel {
    pub sigma: f64,
    /// 对应的双侧概率 erf(σ/√2)
    pub probability: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// 一个参数的置信区间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub name: String,
    pub best: f64,
    pub levels: Vec<ConfidenceLevel>,
}

/// 计算拟合结果中每个自由参数的置信区间
///
/// `options` 应与产生 `result` 的拟合一致，否则 χ² 不可比。
pub fn confidence_intervals(
    table: &SpectrumTable,
    result: &FitResult,
    options: &FitOptions,
    sigmas: &[f64],
) -> Result<Vec<ConfidenceInterval>> {
    if sigmas.is_empty() || sigmas.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(ThorondorError::InvalidArgument(format!(
            "confidence levels must be positive sigma values, got {:?}",
            sigmas
        )));
    }
    let stats = result.statistics();
    if stats.nfree == 0 {
        return Err(ThorondorError::InvalidModelError(
            "confidence intervals need more data points than free parameters".to_string(),
        ));
    }
    if !(stats.chi_square > 0.0) {
        return Err(ThorondorError::InvalidModelError(
            "the fit has zero residuals, confidence intervals are undefined".to_string(),
        ));
    }

    let engine = FitEngine::new(options.clone());
    let best_model = result.model();
    let nfree = stats.nfree as f64;
    let best_chi = stats.chi_square;

    let probability = |name: &str, value: f64| -> Result<f64> {
        let mut trial = best_model.clone();
        trial.set_value(name, value)?;
        trial.set_vary(name, false)?;
        let chi = refit_chi_square(&engine, table, &trial)?;
        let f = (chi / best_chi - 1.0).max(0.0) * nfree;
        Ok(f_cdf(f, 1.0, nfree))
    };

    let names: Vec<String> = best_model.free_names().iter().map(|s| s.to_string()).collect();
    let mut out = Vec::with_capacity(names.len());
    for name in &names {
        let (best, min, max) = match best_model.parameter(name) {
            Some(p) => (p.value, p.min, p.max),
            None => continue,
        };
        let step = result
            .stderr(name)
            .filter(|s| *s > 0.0 && s.is_finite())
            .unwrap_or(if best != 0.0 { 0.1 * best.abs() } else { 0.1 });

        let at = |v: f64| probability(name, v);
        let mut levels = Vec::with_capacity(sigmas.len());
        for &sigma in sigmas {
            let target = erf(sigma / std::f64::consts::SQRT_2);
            let lower = search(&at, best, -step, min, target)?;
            let upper = search(&at, best, step, max, target)?;
            debug!("{} {}σ interval: {:?} .. {:?}", name, sigma, lower, upper);
            levels.push(ConfidenceLevel {
                sigma,
                probability: target,
                lower,
                upper,
            });
        }
        out.push(ConfidenceInterval {
            name: name.clone(),
            best,
            levels,
        });
    }
    Ok(out)
}

/// 其余参数重新拟合后的 χ²；没有自由参数时直接求值
fn refit_chi_square(engine: &FitEngine, table: &SpectrumTable, model: &PeakModel) -> Result<f64> {
    if model.n_free() == 0 {
        engine.chi_square(table, model)
    } else {
        Ok(engine.fit(table, model)?.statistics().chi_square)
    }
}

/// 从 best 沿 step 方向外推，找到 p 越过 target 的位置
fn search(
    probability: &dyn Fn(f64) -> Result<f64>,
    best: f64,
    step: f64,
    bound: Option<f64>,
    target: f64,
) -> Result<Option<f64>> {
    let beyond = |v: f64, b: f64| if step > 0.0 { v >= b } else { v <= b };

    let mut inner = best;
    let mut outer = None;
    for k in 1..=MAX_STEPS {
        let mut v = best + step * k as f64;
        let clipped = match bound {
            Some(b) if beyond(v, b) => {
                v = b;
                true
            }
            _ => false,
        };
        if probability(v)? >= target {
            outer = Some(v);
            break;
        }
        if clipped {
            return Ok(None);
        }
        inner = v;
    }
    let Some(mut outer) = outer else {
        return Ok(None);
    };

    for _ in 0..BISECTIONS {
        let mid = 0.5 * (inner + outer);
        if probability(mid)? < target {
            inner = mid;
        } else {
            outer = mid;
        }
    }
    Ok(Some(0.5 * (inner + outer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::model::PeakComponent;
    use crate::fitting::shapes::ShapeKind;
    use crate::models::spectrum::EnergyScale;

    fn noisy_gaussian() -> SpectrumTable {
        let f = ShapeKind::Gaussian.evaluator();
        let x: Vec<f64> = (0..101).map(|i| i as f64 * 0.1).collect();
        let y = x
            .iter()
            .enumerate()
            .map(|(i, &v)| f(v, &[10.0, 5.0, 1.0]) + 0.05 * (37.0 * i as f64).sin())
            .collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    fn model() -> PeakModel {
        PeakModel::new(vec![PeakComponent::new("P0_", ShapeKind::Gaussian)
            .with_value("amplitude", 9.0)
            .with_value("center", 5.2)
            .with_value("sigma", 1.2)])
        .unwrap()
    }

    #[test]
    fn test_one_sigma_matches_standard_error() {
        let table = noisy_gaussian();
        let options = FitOptions::default();
        let result = FitEngine::new(options.clone()).fit(&table, &model()).unwrap();
        let intervals = confidence_intervals(&table, &result, &options, &[1.0, 2.0]).unwrap();
        assert_eq!(intervals.len(), 3);

        for ci in &intervals {
            let stderr = result.stderr(&ci.name).unwrap();
            let one = &ci.levels[0];
            let two = &ci.levels[1];
            let (lo, hi) = (one.lower.unwrap(), one.upper.unwrap());
            assert!(lo < ci.best && ci.best < hi);
            assert!(((hi - ci.best) / stderr - 1.0).abs() < 0.1, "{}", ci.name);
            assert!(((ci.best - lo) / stderr - 1.0).abs() < 0.1, "{}", ci.name);
            assert!(two.lower.unwrap() < lo && two.upper.unwrap() > hi);
            assert!((one.probability - 0.682_689).abs() < 1e-5);
        }
    }

    #[test]
    fn test_single_free_parameter_and_bounds() {
        let table = noisy_gaussian();
        let options = FitOptions::default();
        let mut m = model().with_values(&[9.0, 5.0, 1.0]);
        m.set_vary("P0_center", false).unwrap();
        m.set_vary("P0_sigma", false).unwrap();
        let free = FitEngine::new(options.clone()).fit(&table, &m).unwrap();
        let best = free.value("P0_amplitude").unwrap();
        let stderr = free.stderr("P0_amplitude").unwrap();

        // 下边界在最优值下方半个标准误差处，不影响最优值
        m.set_bounds("P0_amplitude", Some(best - 0.5 * stderr), None)
            .unwrap();
        let result = FitEngine::new(options.clone()).fit(&table, &m).unwrap();
        assert!((result.value("P0_amplitude").unwrap() - best).abs() < 1e-2 * stderr);

        let intervals = confidence_intervals(&table, &result, &options, &[1.0]).unwrap();
        assert_eq!(intervals.len(), 1);
        let level = &intervals[0].levels[0];
        assert!(level.lower.is_none());
        // 振幅是线性参数，1σ 端点与标准误差一致
        let upper = level.upper.unwrap();
        assert!(((upper - best) / stderr - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_rejects_bad_levels() {
        let table = noisy_gaussian();
        let options = FitOptions::default();
        let result = FitEngine::new(options.clone()).fit(&table, &model()).unwrap();
        assert!(confidence_intervals(&table, &result, &options, &[]).is_err());
        assert!(confidence_intervals(&table, &result, &options, &[-1.0]).is_err());
    }
}
