//! # 最小化算法
//!
//! 在无约束的内部坐标上最小化加权残差平方和：
//! - Levenberg-Marquardt：前向差分 Jacobian，阻尼正规方程用 Cholesky 求解
//! - Nelder-Mead：无导数单纯形
//!
//! 两者都有硬性的迭代上限，超出时返回 `FitDivergedError`。
//!
//! ## 依赖关系
//! - 被 `fitting/engine.rs` 使用
//! - 使用 `nalgebra` 做线性代数

use crate::error::{Result, ThorondorError};
use log::debug;
use nalgebra::{DMatrix, DVector};

/// 拟合进度观察者
///
/// 每次迭代开始时以迭代序号（从 1 起）和当前代价调用。
pub trait FitObserver {
    fn on_iteration(&self, _iteration: usize, _cost: f64) {}
}

/// 不做任何事的观察者
pub struct SilentObserver;

impl FitObserver for SilentObserver {}

/// 残差函数：内部坐标 → 加权残差
pub(crate) type Residuals<'a> = dyn Fn(&[f64]) -> Vec<f64> + 'a;

/// 收敛设置
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

/// 最小化结果
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub params: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
}

const MIN_LAMBDA: f64 = 1.0e-12;
const MAX_LAMBDA: f64 = 1.0e16;

/// 计数的残差函数调用
struct Counted<'a, 'b> {
    f: &'a Residuals<'b>,
    calls: usize,
}

impl<'a, 'b> Counted<'a, 'b> {
    fn call(&mut self, p: &[f64]) -> Vec<f64> {
        self.calls += 1;
        (self.f)(p)
    }

    fn cost(&mut self, p: &[f64]) -> f64 {
        cost_of(&self.call(p))
    }
}

/// 残差平方和；非有限值视为无穷大
fn cost_of(r: &[f64]) -> f64 {
    let c: f64 = r.iter().map(|v| v * v).sum();
    if c.is_finite() {
        c
    } else {
        f64::INFINITY
    }
}

fn not_finite_at_start() -> ThorondorError {
    ThorondorError::InvalidModelError(
        "model produces non-finite values at the initial parameters".to_string(),
    )
}

// ─────────────────────────────────────────────────────────────
// Levenberg-Marquardt
// ─────────────────────────────────────────────────────────────

pub(crate) fn levenberg_marquardt(
    f: &Residuals,
    p0: &[f64],
    settings: &Settings,
    observer: &dyn FitObserver,
) -> Result<Outcome> {
    let mut fun = Counted { f, calls: 0 };
    let n = p0.len();
    let mut p = p0.to_vec();
    let mut r = fun.call(&p);
    let mut cost = cost_of(&r);
    if !cost.is_finite() {
        return Err(not_finite_at_start());
    }

    let mut lambda = 1.0e-3;
    for iteration in 1..=settings.max_iterations {
        observer.on_iteration(iteration, cost);
        debug!(
            "LM iteration {}: cost {:.6e}, lambda {:.1e}",
            iteration, cost, lambda
        );

        let done = |p: Vec<f64>, cost: f64, calls: usize| Outcome {
            params: p,
            cost,
            iterations: iteration,
            evaluations: calls,
        };

        if cost == 0.0 {
            return Ok(done(p, cost, fun.calls));
        }

        let jac = jacobian(&mut fun, &p, &r);
        let rv = DVector::from_column_slice(&r);
        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * &rv;
        let neg_g = -&g;

        loop {
            let mut a = jtj.clone();
            for k in 0..n {
                a[(k, k)] += lambda * jtj[(k, k)].max(1.0e-12);
            }

            let Some(step) = a.cholesky().map(|c| c.solve(&neg_g)) else {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    return Ok(done(p, cost, fun.calls));
                }
                continue;
            };

            let trial: Vec<f64> = p.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
            let r_new = fun.call(&trial);
            let cost_new = cost_of(&r_new);

            if cost_new < cost {
                let actual = (cost - cost_new) / cost;
                let quad = (step.transpose() * &jtj * &step)[(0, 0)];
                let predicted = (-2.0 * step.dot(&g) - quad) / cost;
                let p_norm = p.iter().map(|v| v * v).sum::<f64>().sqrt();
                let s_norm = step.norm();

                p = trial;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(MIN_LAMBDA);

                let f_converged = actual <= settings.ftol && predicted.abs() <= settings.ftol;
                let x_converged = s_norm <= settings.xtol * (p_norm + settings.xtol);
                if f_converged || x_converged || cost == 0.0 {
                    return Ok(done(p, cost, fun.calls));
                }
                break;
            }

            // 找不到下降方向：已在极小点
            lambda *= 10.0;
            if lambda > MAX_LAMBDA {
                return Ok(done(p, cost, fun.calls));
            }
        }
    }

    Err(ThorondorError::FitDivergedError {
        iterations: settings.max_iterations,
        cost,
    })
}

/// 前向差分 Jacobian（m × n）
fn jacobian(fun: &mut Counted, p: &[f64], r: &[f64]) -> DMatrix<f64> {
    let m = r.len();
    let n = p.len();
    let mut jac = DMatrix::zeros(m, n);
    let eps = f64::EPSILON.sqrt();
    let mut shifted = p.to_vec();
    for j in 0..n {
        let h = eps * p[j].abs().max(1.0);
        shifted[j] = p[j] + h;
        let r_h = fun.call(&shifted);
        shifted[j] = p[j];
        for i in 0..m {
            let d = (r_h[i] - r[i]) / h;
            jac[(i, j)] = if d.is_finite() { d } else { 0.0 };
        }
    }
    jac
}

// ─────────────────────────────────────────────────────────────
// Nelder-Mead
// ─────────────────────────────────────────────────────────────

pub(crate) fn nelder_mead(
    f: &Residuals,
    p0: &[f64],
    settings: &Settings,
    observer: &dyn FitObserver,
) -> Result<Outcome> {
    let mut fun = Counted { f, calls: 0 };
    let n = p0.len();

    let mut simplex: Vec<Vec<f64>> = vec![p0.to_vec()];
    for j in 0..n {
        let mut v = p0.to_vec();
        v[j] = if v[j] != 0.0 { v[j] * 1.05 } else { 2.5e-4 };
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| fun.cost(v)).collect();
    if !values[0].is_finite() {
        return Err(not_finite_at_start());
    }

    let lerp = |a: &[f64], b: &[f64], t: f64| -> Vec<f64> {
        a.iter().zip(b).map(|(ai, bi)| ai + t * (bi - ai)).collect()
    };

    for iteration in 1..=settings.max_iterations {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        observer.on_iteration(iteration, values[0]);

        // 单纯形塌缩到 xtol 以内，或各顶点代价完全重合
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let x_scale = simplex[0].iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let x_converged = x_spread <= settings.xtol * (1.0 + x_scale);
        let f_converged = values[n] - values[0] <= settings.ftol * settings.ftol * values[0].abs();
        if x_converged || f_converged {
            debug!("Nelder-Mead converged after {} iterations", iteration);
            return Ok(Outcome {
                params: simplex.swap_remove(0),
                cost: values[0],
                iterations: iteration,
                evaluations: fun.calls,
            });
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();

        // 反射
        let xr = lerp(&centroid, &worst, -1.0);
        let fr = fun.cost(&xr);

        if fr < values[0] {
            // 扩张
            let xe = lerp(&centroid, &worst, -2.0);
            let fe = fun.cost(&xe);
            if fe < fr {
                simplex[n] = xe;
                values[n] = fe;
            } else {
                simplex[n] = xr;
                values[n] = fr;
            }
            continue;
        }
        if fr < values[n - 1] {
            simplex[n] = xr;
            values[n] = fr;
            continue;
        }

        // 收缩
        let (xc, fc, accept) = if fr < values[n] {
            let xc = lerp(&centroid, &xr, 0.5);
            let fc = fun.cost(&xc);
            (xc, fc, fc <= fr)
        } else {
            let xc = lerp(&centroid, &worst, 0.5);
            let fc = fun.cost(&xc);
            (xc, fc, fc < values[n])
        };
        if accept {
            simplex[n] = xc;
            values[n] = fc;
            continue;
        }

        // 整体向最优点收缩
        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = lerp(&best, &simplex[i], 0.5);
            values[i] = fun.cost(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .map(|i| values[i])
        .unwrap_or(f64::INFINITY);
    Err(ThorondorError::FitDivergedError {
        iterations: settings.max_iterations,
        cost: best,
    })
}
