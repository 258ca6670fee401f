//! # 特殊函数
//!
//! 峰形函数需要的误差函数与 Faddeeva 函数 w(z) = exp(−z²)·erfc(−iz)，
//! 以及置信区间用到的 F 分布累积函数。
//!
//! ## 参考
//! - erfc: Chebyshev 拟合（Numerical Recipes, 相对误差 < 1.2e-7）
//! - w(z): J. Humlíček, JQSRT 27 (1982) 437, W4 算法（相对误差 ~1e-4）
//! - ln Γ: Lanczos 近似（g = 7, 9 项）
//! - I_x(a, b): Lentz 连分式
//!
//! ## 依赖关系
//! - 被 `fitting/shapes.rs`, `fitting/confidence.rs` 使用
//! - 使用 `nalgebra` 导出的 `Complex`

use nalgebra::Complex;

/// 互补误差函数
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// 误差函数
pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// Faddeeva 函数 w(x + iy)，要求 y ≥ 0
pub fn faddeeva(x: f64, y: f64) -> Complex<f64> {
    let t = Complex::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        // 区域 I
        t * 0.5641896 / (t * t + 0.5)
    } else if s >= 5.5 {
        // 区域 II
        let u = t * t;
        t * (u * 0.5641896 + 1.410474) / (u * (u + 3.0) + 0.75)
    } else if y >= 0.195 * x.abs() - 0.176 {
        // 区域 III
        let num = t * (t * (t * (t * 0.5642236 + 3.778987) + 11.96482) + 20.20933) + 16.4955;
        let den = t * (t * (t * (t * (t + 6.699398) + 21.69274) + 39.27121) + 38.82363) + 16.4955;
        num / den
    } else {
        // 区域 IV
        let u = t * t;
        let num = t
            * (-(u
                * (-(u
                    * (-(u * (-(u * (-(u * (-(u * 0.56419) + 1.320522)) + 35.76683)) + 219.0313))
                        + 1540.787))
                    + 3321.9905))
                + 36183.31);
        let den = -(u
            * (-(u
                * (-(u
                    * (-(u * (-(u * (-(u * (-u + 1.841439)) + 61.57037)) + 364.2191))
                        + 2186.181))
                    + 9022.228))
                + 24322.84))
            + 32066.6;
        u.exp() - num / den
    }
}

// ─────────────────────────────────────────────────────────────
// Γ、不完全 β 与 F 分布
// ─────────────────────────────────────────────────────────────

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x)，x > 0
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // 反射公式
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let sum = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// 正则化不完全 β 函数 I_x(a, b)
pub fn regularized_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_fraction(a: f64, b: f64, x: f64) -> f64 {
    const TINY: f64 = 1.0e-300;
    const EPS: f64 = 1.0e-14;
    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=300 {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// F(d1, d2) 分布的累积函数
pub fn f_cdf(f: f64, d1: f64, d2: f64) -> f64 {
    if !(f > 0.0) {
        return 0.0;
    }
    regularized_beta(d1 / 2.0, d2 / 2.0, d1 * f / (d1 * f + d2))
}
