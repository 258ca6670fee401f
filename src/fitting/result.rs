//! # 拟合结果
//!
//! 一次拟合产生的不可变记录。重新拟合会产生新的 `FitResult`，从不原地修改。
//!
//! ## 依赖关系
//! - 由 `fitting/engine.rs` 创建
//! - 被 `models/dataset.rs`, `export/`, `commands/` 读取

use crate::fitting::engine::FitMethod;
use crate::fitting::expr::Expr;
use crate::fitting::model::PeakModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个参数的拟合值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    /// 标准误差；协方差不可估计时为 None
    pub stderr: Option<f64>,
    pub init_value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub vary: bool,
    pub expr: Option<Expr>,
}

/// 拟合优度统计量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    /// 数据点数
    pub ndata: usize,
    /// 自由参数个数
    pub nvarys: usize,
    /// 自由度 ndata − nvarys
    pub nfree: usize,
    /// 加权残差平方和
    pub chi_square: f64,
    /// chi_square / nfree；nfree = 0 时为 None
    pub reduced_chi_square: Option<f64>,
    pub aic: f64,
    pub bic: f64,
    /// 100·Σ(y−yfit)²/Σy²（百分比）；数据全为零时为 None
    pub r_factor: Option<f64>,
    /// Σ(y−yfit)²/yfit；仅当拟合曲线处处为正时计算
    pub pearson_chi_square: Option<f64>,
    pub iterations: usize,
    pub evaluations: usize,
}

/// 拟合结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    method: FitMethod,
    parameters: Vec<ParameterEstimate>,
    /// 自由参数两两相关系数；不可估计时为空
    correlations: BTreeMap<String, BTreeMap<String, f64>>,
    x: Vec<f64>,
    data: Vec<f64>,
    best_fit: Vec<f64>,
    residuals: Vec<f64>,
    weights: Vec<f64>,
    components: Vec<(String, Vec<f64>)>,
    model: PeakModel,
    statistics: FitStatistics,
}

impl FitResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: FitMethod,
        parameters: Vec<ParameterEstimate>,
        correlations: BTreeMap<String, BTreeMap<String, f64>>,
        x: Vec<f64>,
        data: Vec<f64>,
        best_fit: Vec<f64>,
        weights: Vec<f64>,
        components: Vec<(String, Vec<f64>)>,
        model: PeakModel,
        statistics: FitStatistics,
    ) -> Self {
        let residuals = data.iter().zip(&best_fit).map(|(y, f)| y - f).collect();
        FitResult {
            method,
            parameters,
            correlations,
            x,
            data,
            best_fit,
            residuals,
            weights,
            components,
            model,
            statistics,
        }
    }

    pub fn method(&self) -> FitMethod {
        self.method
    }

    pub fn parameters(&self) -> &[ParameterEstimate] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterEstimate> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// 参数的拟合值
    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.value)
    }

    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.parameter(name).and_then(|p| p.stderr)
    }

    /// 两个自由参数之间的相关系数
    pub fn correlation(&self, a: &str, b: &str) -> Option<f64> {
        self.correlations.get(a).and_then(|row| row.get(b)).copied()
    }

    pub fn correlations(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.correlations
    }

    /// 是否估计出了误差
    pub fn has_uncertainties(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| p.vary && p.expr.is_none() && p.stderr.is_some())
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn best_fit(&self) -> &[f64] {
        &self.best_fit
    }

    /// 残差 y − yfit（未加权）
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// 各组分在 x 上的曲线（前缀 → 值）
    pub fn components(&self) -> &[(String, Vec<f64>)] {
        &self.components
    }

    /// 以拟合值为初值的模型
    pub fn model(&self) -> &PeakModel {
        &self.model
    }

    pub fn statistics(&self) -> &FitStatistics {
        &self.statistics
    }
}
