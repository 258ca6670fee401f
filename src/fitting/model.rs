//! # 复合峰模型
//!
//! 有序的峰形组分集合，参数名带组分前缀（`Bcgd_c`, `Step_center`, `P0_sigma`）。
//! 建模时把链接表达式绑定到参数下标并按拓扑序排列，链接图中的环在这里被拒绝。
//!
//! ## 依赖关系
//! - 被 `fitting/engine.rs`, `fitting/result.rs`, `models/dataset.rs`, `config.rs` 使用
//! - 使用 `fitting/shapes.rs`, `fitting/params.rs`, `fitting/expr.rs`

use crate::error::{Result, ThorondorError};
use crate::fitting::expr::{BoundExpr, Expr};
use crate::fitting::params::Parameter;
use crate::fitting::shapes::{ShapeFn, ShapeKind, StepForm};
use crate::reduction::trapezoid;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// 背景组分前缀
pub const BACKGROUND_PREFIX: &str = "Bcgd_";
/// 台阶组分前缀
pub const STEP_PREFIX: &str = "Step_";

/// 第 i 个峰的前缀
pub fn peak_prefix(index: usize) -> String {
    format!("P{}_", index)
}

// ─────────────────────────────────────────────────────────────
// 组分
// ─────────────────────────────────────────────────────────────

/// 单个峰形组分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakComponent {
    pub prefix: String,
    pub kind: ShapeKind,
    /// 参数，顺序与 `kind.param_names()` 一致
    pub params: Vec<Parameter>,
}

impl PeakComponent {
    /// 用默认初值与默认约束创建组分
    pub fn new(prefix: impl Into<String>, kind: ShapeKind) -> Self {
        let prefix = prefix.into();
        let params = kind
            .param_names()
            .iter()
            .map(|short| default_parameter(&prefix, kind, short))
            .collect();
        PeakComponent {
            prefix,
            kind,
            params,
        }
    }

    pub fn param(&self, short: &str) -> Option<&Parameter> {
        let full = format!("{}{}", self.prefix, short);
        self.params.iter().find(|p| p.name == full)
    }

    pub fn param_mut(&mut self, short: &str) -> Option<&mut Parameter> {
        let full = format!("{}{}", self.prefix, short);
        self.params.iter_mut().find(|p| p.name == full)
    }

    /// 设置初值（未知参数名忽略）
    pub fn with_value(mut self, short: &str, value: f64) -> Self {
        if let Some(p) = self.param_mut(short) {
            p.value = value;
        }
        self
    }
}

fn default_parameter(prefix: &str, kind: ShapeKind, short: &str) -> Parameter {
    let name = format!("{}{}", prefix, short);
    let width_like = kind.is_peak() || kind.is_step();
    match short {
        "sigma" | "sigma_r" if width_like => Parameter::new(name, 1.0).with_min(0.0),
        "amplitude" => Parameter::new(name, 1.0),
        // Voigt 默认 gamma = sigma
        "gamma" => Parameter::new(name, 1.0)
            .with_min(0.0)
            .linked(Expr::param(format!("{}sigma", prefix))),
        "fraction" => Parameter::new(name, 0.5).with_bounds(Some(0.0), Some(1.0)),
        "asymmetry" => Parameter::new(name, 0.1).with_bounds(Some(0.0), Some(1.0)),
        _ => Parameter::new(name, 0.0),
    }
}

// ─────────────────────────────────────────────────────────────
// 模型
// ─────────────────────────────────────────────────────────────

/// 建模时推导出的内部布局
#[derive(Debug, Clone)]
struct Layout {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// 扁平下标 → (组分序号, 组内序号)
    flat: Vec<(usize, usize)>,
    spans: Vec<Range<usize>>,
    shapes: Vec<ShapeFn>,
    /// 按依赖拓扑序排列的链接
    links: Vec<(usize, BoundExpr)>,
    free: Vec<usize>,
}

/// 复合峰模型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<PeakComponent>", into = "Vec<PeakComponent>")]
pub struct PeakModel {
    components: Vec<PeakComponent>,
    layout: Layout,
}

impl PartialEq for PeakModel {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl TryFrom<Vec<PeakComponent>> for PeakModel {
    type Error = ThorondorError;

    fn try_from(components: Vec<PeakComponent>) -> Result<Self> {
        PeakModel::new(components)
    }
}

impl From<PeakModel> for Vec<PeakComponent> {
    fn from(model: PeakModel) -> Self {
        model.components
    }
}

impl PeakModel {
    /// 校验组分并构建模型
    ///
    /// 参数名冲突、参数表与形状不符、边界非法、表达式引用未知参数时返回
    /// `InvalidModelError`；链接成环时返回 `LinkCycleError`。
    pub fn new(components: Vec<PeakComponent>) -> Result<Self> {
        if components.is_empty() {
            return Err(invalid("model has no components"));
        }

        let mut names = Vec::new();
        let mut index = HashMap::new();
        let mut flat = Vec::new();
        let mut spans = Vec::new();
        let mut shapes = Vec::new();
        let mut prefixes = HashSet::new();

        for (ci, comp) in components.iter().enumerate() {
            comp.kind.validate()?;
            if !prefixes.insert(comp.prefix.as_str()) {
                return Err(invalid(format!("duplicate component prefix '{}'", comp.prefix)));
            }

            let expected = comp.kind.param_names();
            let matches = comp.params.len() == expected.len()
                && comp
                    .params
                    .iter()
                    .zip(expected)
                    .all(|(p, short)| p.name == format!("{}{}", comp.prefix, short));
            if !matches {
                return Err(invalid(format!(
                    "component '{}' ({}) expects parameters [{}]",
                    comp.prefix,
                    comp.kind,
                    expected.join(", ")
                )));
            }

            let start = names.len();
            for (pi, p) in comp.params.iter().enumerate() {
                if !p.value.is_finite() {
                    return Err(invalid(format!("parameter '{}' is not finite", p.name)));
                }
                if let (Some(lo), Some(hi)) = (p.min, p.max) {
                    if !(lo < hi) {
                        return Err(invalid(format!(
                            "parameter '{}' has min {} not below max {}",
                            p.name, lo, hi
                        )));
                    }
                }
                if index.insert(p.name.clone(), names.len()).is_some() {
                    return Err(invalid(format!("duplicate parameter name '{}'", p.name)));
                }
                names.push(p.name.clone());
                flat.push((ci, pi));
            }
            spans.push(start..names.len());
            shapes.push(comp.kind.evaluator());
        }

        let params: Vec<&Parameter> = components.iter().flat_map(|c| c.params.iter()).collect();

        let lookup = |name: &str| index.get(name).copied();
        let mut bound = params
            .iter()
            .map(|p| p.expr.as_ref().map(|e| e.bind(&lookup)).transpose())
            .collect::<Result<Vec<Option<BoundExpr>>>>()?;

        let order = LinkWalker::new(&params, &index).order()?;
        let links = order
            .into_iter()
            .filter_map(|i| bound[i].take().map(|e| (i, e)))
            .collect();
        let free = (0..params.len()).filter(|&i| params[i].is_free()).collect();

        let layout = Layout {
            names,
            index,
            flat,
            spans,
            shapes,
            links,
            free,
        };
        Ok(PeakModel { components, layout })
    }

    pub fn components(&self) -> &[PeakComponent] {
        &self.components
    }

    pub fn names(&self) -> &[String] {
        &self.layout.names
    }

    pub fn len(&self) -> usize {
        self.layout.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.names.is_empty()
    }

    /// 按全名查找参数
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.index_of(name).map(|i| self.param_at(i))
    }

    /// 全部参数（扁平顺序）
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.components.iter().flat_map(|c| c.params.iter())
    }

    /// 自由参数个数
    pub fn n_free(&self) -> usize {
        self.layout.free.len()
    }

    /// 自由参数名
    pub fn free_names(&self) -> Vec<&str> {
        self.layout
            .free
            .iter()
            .map(|&i| self.layout.names[i].as_str())
            .collect()
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.layout.index.get(name).copied()
    }

    pub(crate) fn param_at(&self, i: usize) -> &Parameter {
        let (ci, pi) = self.layout.flat[i];
        &self.components[ci].params[pi]
    }

    pub(crate) fn free_indices(&self) -> &[usize] {
        &self.layout.free
    }

    /// 被链接（由表达式决定）的参数下标
    pub(crate) fn linked_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.layout.links.iter().map(|(i, _)| *i)
    }

    // ─────────────────────────────────────────────────────────────
    // 求值
    // ─────────────────────────────────────────────────────────────

    /// 当前参数值（链接已解析）
    pub fn values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.parameters().map(|p| p.value).collect();
        self.resolve(&mut values);
        values
    }

    /// 按拓扑序用表达式覆盖被链接参数的值
    pub fn resolve(&self, values: &mut [f64]) {
        for (i, expr) in &self.layout.links {
            values[*i] = expr.eval(values);
        }
    }

    /// 在 x 上求模型值（先解析链接）
    pub fn evaluate(&self, x: &[f64], values: &[f64]) -> Vec<f64> {
        let mut resolved = values.to_vec();
        self.resolve(&mut resolved);
        self.evaluate_resolved(x, &resolved)
    }

    /// 在 x 上求模型值（要求链接已解析）
    pub(crate) fn evaluate_resolved(&self, x: &[f64], values: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&xi| {
                self.layout
                    .spans
                    .iter()
                    .zip(&self.layout.shapes)
                    .map(|(span, f)| f(xi, &values[span.clone()]))
                    .sum()
            })
            .collect()
    }

    /// 各组分的贡献（前缀 → 曲线）
    pub fn evaluate_components(&self, x: &[f64], values: &[f64]) -> Vec<(String, Vec<f64>)> {
        let mut resolved = values.to_vec();
        self.resolve(&mut resolved);
        self.components
            .iter()
            .zip(self.layout.spans.iter().zip(&self.layout.shapes))
            .map(|(comp, (span, f))| {
                let p = &resolved[span.clone()];
                (comp.prefix.clone(), x.iter().map(|&xi| f(xi, p)).collect())
            })
            .collect()
    }

    /// 以给定（已解析的）值作为新初值的副本
    pub fn with_values(&self, values: &[f64]) -> PeakModel {
        let mut model = self.clone();
        for (i, &(ci, pi)) in self.layout.flat.iter().enumerate() {
            if let Some(&v) = values.get(i) {
                model.components[ci].params[pi].value = v;
            }
        }
        model
    }

    // ─────────────────────────────────────────────────────────────
    // 修改（每次修改后重新校验，失败时模型保持不变）
    // ─────────────────────────────────────────────────────────────

    pub fn set_value(&mut self, name: &str, value: f64) -> Result<()> {
        self.modify(name, |p| p.value = value)
    }

    pub fn set_bounds(&mut self, name: &str, min: Option<f64>, max: Option<f64>) -> Result<()> {
        self.modify(name, |p| {
            p.min = min;
            p.max = max;
        })
    }

    pub fn set_vary(&mut self, name: &str, vary: bool) -> Result<()> {
        self.modify(name, |p| p.vary = vary)
    }

    pub fn set_expr(&mut self, name: &str, expr: Option<Expr>) -> Result<()> {
        self.modify(name, |p| p.expr = expr)
    }

    /// 应用一个覆盖项
    pub fn apply_override(&mut self, o: &ParamOverride) -> Result<()> {
        self.modify(&o.name, |p| o.apply_to(p))
    }

    fn modify(&mut self, name: &str, f: impl FnOnce(&mut Parameter)) -> Result<()> {
        let mut components = self.components.clone();
        let param = components
            .iter_mut()
            .flat_map(|c| c.params.iter_mut())
            .find(|p| p.name == name)
            .ok_or_else(|| invalid(format!("unknown parameter '{}'", name)))?;
        f(param);
        *self = PeakModel::new(components)?;
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ThorondorError {
    ThorondorError::InvalidModelError(reason.into())
}

// ─────────────────────────────────────────────────────────────
// 链接图：深度优先遍历，后序即拓扑序，回边即环
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    New,
    Active,
    Done,
}

struct LinkWalker<'a> {
    params: &'a [&'a Parameter],
    index: &'a HashMap<String, usize>,
    marks: Vec<Mark>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl<'a> LinkWalker<'a> {
    fn new(params: &'a [&'a Parameter], index: &'a HashMap<String, usize>) -> Self {
        LinkWalker {
            params,
            index,
            marks: vec![Mark::New; params.len()],
            path: Vec::new(),
            order: Vec::new(),
        }
    }

    fn order(mut self) -> Result<Vec<usize>> {
        for i in 0..self.params.len() {
            if self.params[i].expr.is_some() {
                self.visit(i)?;
            }
        }
        Ok(self.order)
    }

    fn visit(&mut self, i: usize) -> Result<()> {
        match self.marks[i] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                let start = self.path.iter().position(|&j| j == i).unwrap_or(0);
                let mut cycle: Vec<String> = self.path[start..]
                    .iter()
                    .map(|&j| self.params[j].name.clone())
                    .collect();
                cycle.push(self.params[i].name.clone());
                return Err(ThorondorError::LinkCycleError { cycle });
            }
            Mark::New => {}
        }

        let Some(expr) = &self.params[i].expr else {
            self.marks[i] = Mark::Done;
            return Ok(());
        };

        self.marks[i] = Mark::Active;
        self.path.push(i);
        for name in expr.references() {
            if let Some(&j) = self.index.get(name) {
                if self.params[j].expr.is_some() {
                    self.visit(j)?;
                }
            }
        }
        self.path.pop();
        self.marks[i] = Mark::Done;
        self.order.push(i);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
// 模型描述：背景 + 可选台阶 + N 个同类峰 + 逐参数覆盖
// ─────────────────────────────────────────────────────────────

/// 单个参数的覆盖项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOverride {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub vary: Option<bool>,
    #[serde(default)]
    pub expr: Option<Expr>,
    /// 先解除已有链接（如 Voigt 默认的 gamma = sigma），再应用 `expr`
    #[serde(default)]
    pub unlink: bool,
}

impl ParamOverride {
    pub fn new(name: impl Into<String>) -> Self {
        ParamOverride {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 只覆盖给出的字段
    fn apply_to(&self, param: &mut Parameter) {
        if let Some(v) = self.value {
            param.value = v;
        }
        if self.min.is_some() {
            param.min = self.min;
        }
        if self.max.is_some() {
            param.max = self.max;
        }
        if let Some(vary) = self.vary {
            param.vary = vary;
        }
        if self.unlink {
            param.expr = None;
        }
        if let Some(expr) = &self.expr {
            param.expr = Some(expr.clone());
        }
    }
}

/// 模型描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    pub background: Option<ShapeKind>,
    pub step: Option<StepForm>,
    pub peak: ShapeKind,
    pub peaks: usize,
    pub overrides: Vec<ParamOverride>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec {
            background: Some(ShapeKind::Constant),
            step: None,
            peak: ShapeKind::Lorentzian,
            peaks: 1,
            overrides: Vec::new(),
        }
    }
}

impl ModelSpec {
    /// 根据数据猜测初值并构建模型，最后应用覆盖项
    pub fn build(&self, x: &[f64], y: &[f64]) -> Result<PeakModel> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ThorondorError::InvalidTable(
                "cannot guess a model from an empty or ragged table".to_string(),
            ));
        }
        if let Some(kind) = self.background {
            if !kind.is_background() {
                return Err(invalid(format!("{} is not a background shape", kind)));
            }
        }
        if !self.peak.is_peak() {
            return Err(invalid(format!("{} is not a peak shape", self.peak)));
        }

        let n = x.len();
        let (first, last) = if x[0] <= x[n - 1] { (0, n - 1) } else { (n - 1, 0) };
        let (lo, hi) = (x[first], x[last]);
        let span = if hi > lo { hi - lo } else { 1.0 };
        let y_min = y.iter().cloned().fold(f64::INFINITY, f64::min);

        let mut components = Vec::new();
        let mut baseline = vec![0.0; n];

        if let Some(kind) = self.background {
            let mut comp = PeakComponent::new(BACKGROUND_PREFIX, kind);
            match kind {
                ShapeKind::Linear if n > 1 && hi > lo => {
                    let slope = (y[last] - y[first]) / (hi - lo);
                    let intercept = y[first] - slope * lo;
                    comp = comp
                        .with_value("slope", slope)
                        .with_value("intercept", intercept);
                    baseline = x.iter().map(|&xi| slope * xi + intercept).collect();
                }
                ShapeKind::Victoreen if lo != 0.0 => {
                    let a = y[first] * lo.powi(3);
                    comp = comp.with_value("a", a);
                    baseline = x.iter().map(|&xi| a / xi.powi(3)).collect();
                }
                ShapeKind::Polynomial { .. } => {
                    comp = comp.with_value("c0", y_min);
                    baseline = vec![y_min; n];
                }
                _ => {
                    comp = comp.with_value("c", y_min);
                    baseline = vec![y_min; n];
                }
            }
            components.push(comp);
        }

        if let Some(form) = self.step {
            components.push(
                PeakComponent::new(STEP_PREFIX, ShapeKind::Step(form))
                    .with_value("amplitude", y[last] - y[first])
                    .with_value("center", lo + span / 2.0)
                    .with_value("sigma", span / 20.0),
            );
        }

        let signal: Vec<f64> = y.iter().zip(&baseline).map(|(a, b)| a - b).collect();
        let area = trapezoid(x, &signal).abs();
        let per_peak = if self.peaks > 0 { area / self.peaks as f64 } else { 0.0 };
        let min_width = span / (n.max(2) - 1) as f64;

        for i in 0..self.peaks {
            let (center, height) = if self.peaks == 1 {
                let (imax, &height) = signal
                    .iter()
                    .enumerate()
                    .fold((0, &f64::NEG_INFINITY), |acc, item| {
                        if item.1 > acc.1 {
                            item
                        } else {
                            acc
                        }
                    });
                (x[imax], height)
            } else {
                (lo + span * (i + 1) as f64 / (self.peaks + 1) as f64, 0.0)
            };
            let sigma = if height > 0.0 && per_peak > 0.0 {
                (per_peak / (height * self.peak_shape_factor())).clamp(min_width, span)
            } else {
                span / (4.0 * (self.peaks + 1) as f64)
            };
            let amplitude = if self.peak == ShapeKind::DoniachSunjic {
                per_peak / std::f64::consts::PI
            } else {
                per_peak
            };
            components.push(
                PeakComponent::new(peak_prefix(i), self.peak)
                    .with_value("amplitude", amplitude)
                    .with_value("center", center)
                    .with_value("sigma", sigma)
                    .with_value("sigma_r", sigma),
            );
        }

        for o in &self.overrides {
            let param = components
                .iter_mut()
                .flat_map(|c| c.params.iter_mut())
                .find(|p| p.name == o.name)
                .ok_or_else(|| invalid(format!("override for unknown parameter '{}'", o.name)))?;
            o.apply_to(param);
        }

        PeakModel::new(components)
    }

    /// 面积 / (峰高·宽度) 的形状因子
    fn peak_shape_factor(&self) -> f64 {
        match self.peak {
            ShapeKind::Gaussian | ShapeKind::Voigt | ShapeKind::PseudoVoigt => {
                (2.0 * std::f64::consts::PI).sqrt()
            }
            _ => std::f64::consts::PI,
        }
    }
}
