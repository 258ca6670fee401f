//! # 峰形函数表
//!
//! 从形状标签到纯函数 `fn(x, params) -> y` 的静态映射，编译期固定。
//! 参数顺序即 `ShapeKind::param_names()` 的顺序。
//!
//! 峰形采用面积归一约定：`amplitude` 是峰面积而不是峰高。
//!
//! ## 依赖关系
//! - 被 `fitting/model.rs` 使用
//! - 使用 `fitting/special.rs`

use crate::error::{Result, ThorondorError};
use crate::fitting::special::{erf, faddeeva};
use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_2, PI};
use std::fmt;

/// 形状函数：样本点 x 与按 `param_names()` 排列的参数值
pub type ShapeFn = fn(f64, &[f64]) -> f64;

/// 宽度参数的下限，避免除零
const TINY: f64 = 1.0e-15;

/// 多项式背景的最高阶数
pub const MAX_POLYNOMIAL_DEGREE: usize = 7;

const POLY_NAMES: [&str; MAX_POLYNOMIAL_DEGREE + 1] =
    ["c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7"];

/// 台阶函数形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepForm {
    Linear,
    Arctan,
    Erf,
    Logistic,
}

impl fmt::Display for StepForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepForm::Linear => write!(f, "linear"),
            StepForm::Arctan => write!(f, "arctan"),
            StepForm::Erf => write!(f, "erf"),
            StepForm::Logistic => write!(f, "logistic"),
        }
    }
}

/// 形状种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    // 峰
    Gaussian,
    Lorentzian,
    Voigt,
    PseudoVoigt,
    SplitLorentzian,
    DoniachSunjic,
    // 背景
    Constant,
    Linear,
    Quadratic,
    Polynomial { degree: usize },
    Victoreen,
    // 台阶
    Step(StepForm),
}

impl ShapeKind {
    /// 参数名（不含组分前缀）
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ShapeKind::Gaussian | ShapeKind::Lorentzian => &["amplitude", "center", "sigma"],
            ShapeKind::Voigt => &["amplitude", "center", "sigma", "gamma"],
            ShapeKind::PseudoVoigt => &["amplitude", "center", "sigma", "fraction"],
            ShapeKind::SplitLorentzian => &["amplitude", "center", "sigma", "sigma_r"],
            ShapeKind::DoniachSunjic => &["amplitude", "center", "sigma", "asymmetry"],
            ShapeKind::Constant => &["c"],
            ShapeKind::Linear => &["slope", "intercept"],
            ShapeKind::Quadratic => &["a", "b", "c"],
            ShapeKind::Polynomial { degree } => {
                &POLY_NAMES[..(*degree).min(MAX_POLYNOMIAL_DEGREE) + 1]
            }
            ShapeKind::Victoreen => &["a", "b"],
            ShapeKind::Step(_) => &["amplitude", "center", "sigma"],
        }
    }

    /// 查表得到求值函数
    pub fn evaluator(&self) -> ShapeFn {
        match self {
            ShapeKind::Gaussian => gaussian,
            ShapeKind::Lorentzian => lorentzian,
            ShapeKind::Voigt => voigt,
            ShapeKind::PseudoVoigt => pseudo_voigt,
            ShapeKind::SplitLorentzian => split_lorentzian,
            ShapeKind::DoniachSunjic => doniach_sunjic,
            ShapeKind::Constant => constant,
            ShapeKind::Linear => linear,
            ShapeKind::Quadratic => quadratic,
            ShapeKind::Polynomial { .. } => polynomial,
            ShapeKind::Victoreen => victoreen,
            ShapeKind::Step(StepForm::Linear) => step_linear,
            ShapeKind::Step(StepForm::Arctan) => step_arctan,
            ShapeKind::Step(StepForm::Erf) => step_erf,
            ShapeKind::Step(StepForm::Logistic) => step_logistic,
        }
    }

    pub fn is_peak(&self) -> bool {
        matches!(
            self,
            ShapeKind::Gaussian
                | ShapeKind::Lorentzian
                | ShapeKind::Voigt
                | ShapeKind::PseudoVoigt
                | ShapeKind::SplitLorentzian
                | ShapeKind::DoniachSunjic
        )
    }

    pub fn is_background(&self) -> bool {
        matches!(
            self,
            ShapeKind::Constant
                | ShapeKind::Linear
                | ShapeKind::Quadratic
                | ShapeKind::Polynomial { .. }
                | ShapeKind::Victoreen
        )
    }

    pub fn is_step(&self) -> bool {
        matches!(self, ShapeKind::Step(_))
    }

    /// 检查种类本身的合法性
    pub fn validate(&self) -> Result<()> {
        match self {
            ShapeKind::Polynomial { degree } if *degree > MAX_POLYNOMIAL_DEGREE => {
                Err(ThorondorError::InvalidModelError(format!(
                    "polynomial degree {} exceeds the maximum of {}",
                    degree, MAX_POLYNOMIAL_DEGREE
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeKind::Gaussian => write!(f, "Gaussian"),
            ShapeKind::Lorentzian => write!(f, "Lorentzian"),
            ShapeKind::Voigt => write!(f, "Voigt"),
            ShapeKind::PseudoVoigt => write!(f, "PseudoVoigt"),
            ShapeKind::SplitLorentzian => write!(f, "SplitLorentzian"),
            ShapeKind::DoniachSunjic => write!(f, "Doniach-Sunjic"),
            ShapeKind::Constant => write!(f, "Constant"),
            ShapeKind::Linear => write!(f, "Linear"),
            ShapeKind::Quadratic => write!(f, "Quadratic"),
            ShapeKind::Polynomial { degree } => write!(f, "Polynomial({})", degree),
            ShapeKind::Victoreen => write!(f, "Victoreen"),
            ShapeKind::Step(form) => write!(f, "Step({})", form),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 峰
// ─────────────────────────────────────────────────────────────

fn gaussian(x: f64, p: &[f64]) -> f64 {
    let (amplitude, center, sigma) = (p[0], p[1], p[2].max(TINY));
    let d = x - center;
    amplitude / (sigma * (2.0 * PI).sqrt()) * (-d * d / (2.0 * sigma * sigma)).exp()
}

fn lorentzian(x: f64, p: &[f64]) -> f64 {
    let (amplitude, center, sigma) = (p[0], p[1], p[2].max(TINY));
    let d = x - center;
    amplitude / PI * sigma / (d * d + sigma * sigma)
}

fn voigt(x: f64, p: &[f64]) -> f64 {
    let (amplitude, center, sigma, gamma) = (p[0], p[1], p[2].max(TINY), p[3].max(0.0));
    let norm = sigma * 2.0_f64.sqrt();
    let w = faddeeva((x - center) / norm, gamma / norm);
    amplitude * w.re / (sigma * (2.0 * PI).sqrt())
}

fn pseudo_voigt(x: f64, p: &[f64]) -> f64 {
    let (amplitude, center, sigma, fraction) = (p[0], p[1], p[2], p[3]);
    // 高斯分量与洛伦兹分量取相同的半高宽
    let sigma_g = sigma / (2.0 * LN_2).sqrt();
    (1.0 - fraction) * gaussian(x, &[amplitude, center, sigma_g])
        + fraction * lorentzian(x, &[amplitude, center, sigma])
}

fn split_lorentzian(x: f64, p: &[f64]) -> f64 {
    let (amplitude, center) = (p[0], p[1]);
    let (sigma, sigma_r) = (p[2].max(TINY), p[3].max(TINY));
    let d = x - center;
    let s = if x < center { sigma } else { sigma_r };
    2.0 * amplitude / (PI * (sigma + sigma_r)) * s * s / (d * d + s * s)
}

fn doniach_sunjic(x: f64, p: &[f64]) -> f64 {
    let (amplitude, center, sigma, asymmetry) = (p[0], p[1], p[2].max(TINY), p[3]);
    let arg = (x - center) / sigma;
    let gm1 = 1.0 - asymmetry;
    let scale = amplitude / sigma.powf(gm1);
    scale * (PI * asymmetry / 2.0 + gm1 * arg.atan()).cos() / (1.0 + arg * arg).powf(gm1 / 2.0)
}

// ─────────────────────────────────────────────────────────────
// 背景
// ─────────────────────────────────────────────────────────────

fn constant(_x: f64, p: &[f64]) -> f64 {
    p[0]
}

fn linear(x: f64, p: &[f64]) -> f64 {
    p[0] * x + p[1]
}

fn quadratic(x: f64, p: &[f64]) -> f64 {
    p[0] * x * x + p[1] * x + p[2]
}

fn polynomial(x: f64, p: &[f64]) -> f64 {
    p.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn victoreen(x: f64, p: &[f64]) -> f64 {
    let x3 = x * x * x;
    p[0] / x3 + p[1] / (x3 * x)
}

// ─────────────────────────────────────────────────────────────
// 台阶
// ─────────────────────────────────────────────────────────────

fn step_arg(x: f64, p: &[f64]) -> f64 {
    (x - p[1]) / p[2].max(TINY)
}

fn step_linear(x: f64, p: &[f64]) -> f64 {
    p[0] * step_arg(x, p).clamp(0.0, 1.0)
}

fn step_arctan(x: f64, p: &[f64]) -> f64 {
    p[0] * (0.5 + step_arg(x, p).atan() / PI)
}

fn step_erf(x: f64, p: &[f64]) -> f64 {
    p[0] * 0.5 * (1.0 + erf(step_arg(x, p)))
}

fn step_logistic(x: f64, p: &[f64]) -> f64 {
    p[0] * (1.0 - 1.0 / (1.0 + step_arg(x, p).exp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(kind: ShapeKind, params: &[f64], lo: f64, hi: f64) -> f64 {
        let f = kind.evaluator();
        let n = 200_000;
        let h = (hi - lo) / n as f64;
        (0..n)
            .map(|i| f(lo + (i as f64 + 0.5) * h, params) * h)
            .sum()
    }

    #[test]
    fn test_gaussian_area_and_height() {
        let f = ShapeKind::Gaussian.evaluator();
        let peak = f(5.0, &[10.0, 5.0, 2.0]);
        assert!((peak - 10.0 / (2.0 * (2.0 * PI).sqrt())).abs() < 1e-12);
        assert!((area(ShapeKind::Gaussian, &[10.0, 5.0, 2.0], -40.0, 50.0) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_lorentzian_half_width() {
        let f = ShapeKind::Lorentzian.evaluator();
        let top = f(0.0, &[1.0, 0.0, 0.5]);
        assert!((f(0.5, &[1.0, 0.0, 0.5]) - top / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_voigt_limits() {
        // gamma = 0 时退化为高斯
        let v = ShapeKind::Voigt.evaluator();
        let g = ShapeKind::Gaussian.evaluator();
        for x in [-1.0, 0.0, 0.7, 2.0] {
            let a = v(x, &[1.0, 0.0, 1.0, 0.0]);
            let b = g(x, &[1.0, 0.0, 1.0]);
            assert!((a - b).abs() < 1e-4, "x = {}", x);
        }
        let total = area(ShapeKind::Voigt, &[3.0, 0.0, 0.4, 0.4], -400.0, 400.0);
        assert!((total - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_doniach_sunjic_reduces_to_lorentzian() {
        let ds = ShapeKind::DoniachSunjic.evaluator();
        let lz = ShapeKind::Lorentzian.evaluator();
        for x in [-2.0, -0.3, 0.0, 1.5] {
            // 无不对称时 DS = amplitude/sigma / (1 + arg²) = π·Lorentzian
            let a = ds(x, &[1.0, 0.0, 0.8, 0.0]);
            let b = lz(x, &[1.0, 0.0, 0.8]) * PI;
            assert!((a - b).abs() < 1e-12);
        }
        // 正的不对称参数把强度拖向低 x 侧
        let left = ds(-1.0, &[1.0, 0.0, 0.5, 0.2]);
        let right = ds(1.0, &[1.0, 0.0, 0.5, 0.2]);
        assert!(left > right);
    }

    #[test]
    fn test_polynomial_names_and_values() {
        let kind = ShapeKind::Polynomial { degree: 2 };
        assert_eq!(kind.param_names(), &["c0", "c1", "c2"]);
        assert_eq!(kind.evaluator()(2.0, &[1.0, 2.0, 3.0]), 1.0 + 4.0 + 12.0);
        assert!(ShapeKind::Polynomial { degree: 8 }.validate().is_err());
    }

    #[test]
    fn test_steps_reach_amplitude() {
        for form in [StepForm::Linear, StepForm::Arctan, StepForm::Erf, StepForm::Logistic] {
            let f = ShapeKind::Step(form).evaluator();
            let p = [2.0, 10.0, 0.5];
            assert!(f(-1.0e4, &p).abs() < 1e-3, "{}", form);
            assert!((f(1.0e4, &p) - 2.0).abs() < 1e-3, "{}", form);
        }
    }

    #[test]
    fn test_kind_categories() {
        assert!(ShapeKind::Voigt.is_peak());
        assert!(ShapeKind::Victoreen.is_background());
        assert!(ShapeKind::Step(StepForm::Erf).is_step());
        assert!(!ShapeKind::Linear.is_peak());
    }
}
