//! # 拟合参数
//!
//! 单个参数的初值、边界、是否自由、可选的链接表达式，以及优化器用来施加
//! 边界的内部坐标变换（MINUIT 风格，与 lmfit 相同）。
//!
//! ## 依赖关系
//! - 被 `fitting/model.rs`, `fitting/engine.rs` 使用
//! - 使用 `fitting/expr.rs`

use crate::fitting::expr::Expr;
use serde::{Deserialize, Serialize};

/// 拟合参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// 带组分前缀的全名，例如 `P0_sigma`
    pub name: String,
    /// 当前值（拟合前为初值）
    pub value: f64,
    /// 下界
    #[serde(default)]
    pub min: Option<f64>,
    /// 上界
    #[serde(default)]
    pub max: Option<f64>,
    /// 是否参与拟合
    #[serde(default = "default_vary")]
    pub vary: bool,
    /// 链接表达式；存在时参数值由表达式决定，不参与拟合
    #[serde(default)]
    pub expr: Option<Expr>,
}

fn default_vary() -> bool {
    true
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Parameter {
            name: name.into(),
            value,
            min: None,
            max: None,
            vary: true,
            expr: None,
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.vary = false;
        self
    }

    pub fn linked(mut self, expr: Expr) -> Self {
        self.expr = Some(expr);
        self
    }

    /// 是否为自由参数（参与拟合且没有链接表达式）
    pub fn is_free(&self) -> bool {
        self.vary && self.expr.is_none()
    }

    pub(crate) fn bounds(&self) -> Bounds {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => Bounds::Both(lo, hi),
            (Some(lo), None) => Bounds::Lower(lo),
            (None, Some(hi)) => Bounds::Upper(hi),
            (None, None) => Bounds::Unbounded,
        }
    }

    /// 把值夹到边界内
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.min {
            v = v.max(lo);
        }
        if let Some(hi) = self.max {
            v = v.min(hi);
        }
        v
    }

    /// 值是否落在（或数值上贴着）边界上
    pub fn at_bound(&self, value: f64) -> bool {
        let near = |b: f64| (value - b).abs() <= 1e-10 * (1.0 + b.abs());
        self.min.map_or(false, near) || self.max.map_or(false, near)
    }
}

/// 边界形式与内部坐标变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Bounds {
    Unbounded,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bounds {
    /// 外部值 → 内部无约束坐标
    pub(crate) fn to_internal(self, value: f64) -> f64 {
        match self {
            Bounds::Unbounded => value,
            Bounds::Lower(lo) => ((value - lo + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Bounds::Upper(hi) => ((hi - value + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Bounds::Both(lo, hi) => {
                let t = (2.0 * (value - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0);
                t.asin()
            }
        }
    }

    /// 内部坐标 → 外部值（总在边界内）
    pub(crate) fn to_external(self, internal: f64) -> f64 {
        match self {
            Bounds::Unbounded => internal,
            Bounds::Lower(lo) => lo - 1.0 + (internal * internal + 1.0).sqrt(),
            Bounds::Upper(hi) => hi + 1.0 - (internal * internal + 1.0).sqrt(),
            Bounds::Both(lo, hi) => lo + (internal.sin() + 1.0) * (hi - lo) / 2.0,
        }
    }
}
