//! # 数据集
//!
//! 持有一次采集从原始谱表到拟合结果的全部状态：
//!
//! ```text
//! Raw ──calibrate──▶ Shifted ──reduce──▶ Reduced ──fit──▶ Fitted
//!  └──────────────reduce──────────────────▲                 │
//!                                          └───fit (追加)───┘
//! ```
//!
//! - `calibrate()` 总是从原始谱表出发，并丢弃过期的约化谱表
//! - `reduce()` 优先使用标定后的谱表
//! - `fit()` 需要约化谱表，每次追加一个新的 `FitResult`
//! - `lcf()` 需要约化谱表，只保留最近一次线性组合拟合；
//!   重新标定或约化时清除
//! - 阶段显式记录，由每次转换设置；历史拟合在重新标定或约化后保留，
//!   但只有阶段为 Fitted 时最近一次拟合才对应当前约化谱表
//! - 原始谱表从不被修改
//!
//! 持久化为 JSON（`float_roundtrip`），浮点数精确往返。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs` 使用
//! - 使用 `calibration/`, `reduction/`, `fitting/`, `models/metadata.rs`

use crate::calibration::{AppliedCalibration, CalibrationSpec, Calibrator};
use crate::error::{Result, ThorondorError};
use crate::fitting::{
    linear_combination, FitEngine, FitObserver, FitOptions, FitResult, LcfOptions, LcfReference,
    LcfResult, PeakModel, SilentObserver,
};
use crate::models::metadata::Metadata;
use crate::models::spectrum::SpectrumTable;
use crate::reduction::{Reducer, ReductionRecord, ReductionSpec};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Raw,
    Shifted,
    Reduced,
    Fitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Raw => write!(f, "raw"),
            Stage::Shifted => write!(f, "shifted"),
            Stage::Reduced => write!(f, "reduced"),
            Stage::Fitted => write!(f, "fitted"),
        }
    }
}

/// 数据集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// 数据集名称（通常为文件名主干）
    pub name: String,

    /// 原始数据来源路径
    pub source: Option<String>,

    /// 元数据
    #[serde(default)]
    pub metadata: Metadata,

    raw: SpectrumTable,
    shifted: Option<SpectrumTable>,
    reduced: Option<SpectrumTable>,
    calibration: Option<(CalibrationSpec, AppliedCalibration)>,
    reduction: Option<(ReductionSpec, ReductionRecord)>,
    fits: Vec<FitResult>,
    #[serde(default)]
    lcf: Option<LcfResult>,
    comment: String,
    stage: Stage,
}

impl Dataset {
    pub fn new(name: impl Into<String>, raw: SpectrumTable) -> Self {
        Dataset {
            name: name.into(),
            source: None,
            metadata: Metadata::default(),
            raw,
            shifted: None,
            reduced: None,
            calibration: None,
            reduction: None,
            fits: Vec::new(),
            lcf: None,
            comment: String::new(),
            stage: Stage::Raw,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    // ─────────────────────────────────────────────────────────────
    // 状态查询
    // ─────────────────────────────────────────────────────────────

    /// 当前阶段
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn raw(&self) -> &SpectrumTable {
        &self.raw
    }

    pub fn shifted(&self) -> Option<&SpectrumTable> {
        self.shifted.as_ref()
    }

    pub fn reduced(&self) -> Option<&SpectrumTable> {
        self.reduced.as_ref()
    }

    /// 最近一次标定（设置与实际偏移）
    pub fn calibration(&self) -> Option<&(CalibrationSpec, AppliedCalibration)> {
        self.calibration.as_ref()
    }

    /// 最近一次约化（设置与中间量）
    pub fn reduction(&self) -> Option<&(ReductionSpec, ReductionRecord)> {
        self.reduction.as_ref()
    }

    /// 全部拟合结果（按时间顺序）
    pub fn fits(&self) -> &[FitResult] {
        &self.fits
    }

    /// 最近一次拟合（可能属于已被替换的约化谱表）
    pub fn latest_fit(&self) -> Option<&FitResult> {
        self.fits.last()
    }

    /// 针对当前约化谱表的拟合；约化谱表在拟合后被替换时为 None
    pub fn current_fit(&self) -> Option<&FitResult> {
        match self.stage {
            Stage::Fitted => self.fits.last(),
            _ => None,
        }
    }

    /// 最近一次线性组合拟合
    pub fn lcf_result(&self) -> Option<&LcfResult> {
        self.lcf.as_ref()
    }

    pub fn comment_text(&self) -> &str {
        &self.comment
    }

    // ─────────────────────────────────────────────────────────────
    // 流水线转换
    // ─────────────────────────────────────────────────────────────

    /// 标定原始谱表，替换已有的标定结果
    pub fn calibrate(&mut self, spec: &CalibrationSpec) -> Result<AppliedCalibration> {
        let (shifted, applied) = Calibrator::new(spec.clone()).calibrate(&self.raw)?;
        self.shifted = Some(shifted);
        self.calibration = Some((spec.clone(), applied));
        self.stage = Stage::Shifted;
        self.lcf = None;
        if self.reduced.take().is_some() {
            info!("{}: calibration changed, discarding the reduced table", self.name);
            self.reduction = None;
        }
        Ok(applied)
    }

    /// 约化标定后的谱表（没有则用原始谱表）
    pub fn reduce(&mut self, spec: &ReductionSpec) -> Result<&SpectrumTable> {
        let input = self.shifted.as_ref().unwrap_or(&self.raw);
        let (reduced, record) = Reducer::new(spec.clone()).reduce_detailed(input)?;
        self.reduction = Some((spec.clone(), record));
        self.stage = Stage::Reduced;
        self.lcf = None;
        Ok(self.reduced.insert(reduced))
    }

    pub fn fit(&mut self, model: &PeakModel, options: &FitOptions) -> Result<&FitResult> {
        self.fit_observed(model, options, &SilentObserver)
    }

    /// 拟合约化谱表并追加结果
    pub fn fit_observed(
        &mut self,
        model: &PeakModel,
        options: &FitOptions,
        observer: &dyn FitObserver,
    ) -> Result<&FitResult> {
        let reduced = self.reduced.as_ref().ok_or_else(|| ThorondorError::StageError {
            operation: "fit".to_string(),
            stage: self.stage().to_string(),
        })?;
        let result = FitEngine::new(options.clone()).fit_observed(reduced, model, observer)?;
        info!(
            "{}: fit #{} finished ({})",
            self.name,
            self.fits.len() + 1,
            result.method()
        );
        self.fits.push(result);
        self.stage = Stage::Fitted;
        Ok(&self.fits[self.fits.len() - 1])
    }

    /// 用参考谱对约化谱表做线性组合拟合，替换上一次结果
    ///
    /// 不改变阶段：LCF 与峰拟合是约化谱表上两种独立的分析。
    pub fn lcf(
        &mut self,
        references: &[LcfReference],
        options: &LcfOptions,
    ) -> Result<&LcfResult> {
        let reduced = self.reduced.as_ref().ok_or_else(|| ThorondorError::StageError {
            operation: "run a linear combination fit".to_string(),
            stage: self.stage().to_string(),
        })?;
        let result = linear_combination(reduced, references, options)?;
        info!(
            "{}: linear combination of {} references (R = {})",
            self.name,
            references.len(),
            result
                .r_factor
                .map_or_else(|| "n/a".to_string(), |r| format!("{:.4}%", r))
        );
        Ok(self.lcf.insert(result))
    }

    /// 最近一次拟合的模型，最优值作为新初值
    pub fn retrieve_parameters(&self) -> Option<PeakModel> {
        self.fits.last().map(|fit| fit.model().clone())
    }

    // ─────────────────────────────────────────────────────────────
    // 注释
    // ─────────────────────────────────────────────────────────────

    /// 追加一行注释；`erase_all` 时先清空已有注释
    pub fn comment(&mut self, text: &str, erase_all: bool) {
        if erase_all {
            self.comment.clear();
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.comment.is_empty() {
            self.comment.push('\n');
        }
        self.comment.push_str(text);
    }

    // ─────────────────────────────────────────────────────────────
    // 持久化
    // ─────────────────────────────────────────────────────────────

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ThorondorError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ThorondorError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ThorondorError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let parse_error = |reason: String| ThorondorError::ParseError {
            format: "dataset JSON".to_string(),
            path: path.display().to_string(),
            reason,
        };
        let ds: Dataset = serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
        ds.check_stage().map_err(parse_error)?;
        Ok(ds)
    }

    /// 记录的阶段必须有对应的谱表
    fn check_stage(&self) -> std::result::Result<(), String> {
        let tables = match self.stage {
            Stage::Raw => self.shifted.is_none() && self.reduced.is_none(),
            Stage::Shifted => self.shifted.is_some() && self.reduced.is_none(),
            Stage::Reduced => self.reduced.is_some(),
            Stage::Fitted => self.reduced.is_some() && !self.fits.is_empty(),
        };
        if tables && (self.lcf.is_none() || self.reduced.is_some()) {
            Ok(())
        } else {
            Err(format!("stage '{}' does not match the stored tables", self.stage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::{PeakComponent, ShapeKind};
    use crate::models::spectrum::EnergyScale;
    use crate::reduction::{NormalizationMode, NormalizationSpec};

    fn raw_table() -> SpectrumTable {
        let f = ShapeKind::Gaussian.evaluator();
        let x: Vec<f64> = (0..201).map(|i| 400.0 + i as f64 * 0.1).collect();
        let y = x.iter().map(|&e| f(e, &[100.0, 409.9, 1.0])).collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    fn max_normalization() -> ReductionSpec {
        ReductionSpec {
            normalization: Some(NormalizationSpec {
                mode: NormalizationMode::Maximum,
                window: (400.0, 419.0),
            }),
            ..Default::default()
        }
    }

    fn model() -> PeakModel {
        PeakModel::new(vec![PeakComponent::new("P0_", ShapeKind::Gaussian)
            .with_value("amplitude", 2.3)
            .with_value("center", 409.5)
            .with_value("sigma", 1.1)])
        .unwrap()
    }

    #[test]
    fn test_stage_transitions() {
        let mut ds = Dataset::new("gauss", raw_table());
        assert_eq!(ds.stage(), Stage::Raw);

        let err = ds.fit(&model(), &FitOptions::default());
        assert!(matches!(err, Err(ThorondorError::StageError { .. })));

        ds.calibrate(&CalibrationSpec::offset(0.5)).unwrap();
        assert_eq!(ds.stage(), Stage::Shifted);
        assert!((ds.shifted().unwrap().x()[0] - 399.5).abs() < 1e-12);

        ds.reduce(&max_normalization()).unwrap();
        assert_eq!(ds.stage(), Stage::Reduced);

        ds.fit(&model(), &FitOptions::default()).unwrap();
        ds.fit(&model(), &FitOptions::default()).unwrap();
        assert_eq!(ds.stage(), Stage::Fitted);
        assert_eq!(ds.fits().len(), 2);

        let fit = ds.latest_fit().unwrap();
        assert!((fit.value("P0_center").unwrap() - 409.4).abs() < 1e-6);

        // 重新标定：约化谱表过期，历史拟合保留
        ds.calibrate(&CalibrationSpec::offset(0.0)).unwrap();
        assert_eq!(ds.stage(), Stage::Shifted);
        assert!(ds.reduced().is_none());
        assert_eq!(ds.fits().len(), 2);
        assert_eq!(ds.raw(), &raw_table());
    }

    #[test]
    fn test_reduce_after_recalibration_is_not_fitted() {
        let mut ds = Dataset::new("gauss", raw_table());
        ds.reduce(&ReductionSpec::default()).unwrap();
        ds.fit(&model().with_values(&[90.0, 409.7, 1.2]), &FitOptions::default())
            .unwrap();
        assert_eq!(ds.stage(), Stage::Fitted);
        assert!(ds.current_fit().is_some());

        ds.calibrate(&CalibrationSpec::offset(2.0)).unwrap();
        ds.reduce(&ReductionSpec::default()).unwrap();
        assert_eq!(ds.stage(), Stage::Reduced);
        assert!((ds.reduced().unwrap().x()[0] - 398.0).abs() < 1e-12);
        assert!(ds.current_fit().is_none());
        assert_eq!(ds.fits().len(), 1);
        assert!(ds.latest_fit().is_some());

        ds.fit(&model().with_values(&[90.0, 407.7, 1.2]), &FitOptions::default())
            .unwrap();
        assert_eq!(ds.stage(), Stage::Fitted);
        let center = ds.current_fit().unwrap().value("P0_center").unwrap();
        assert!((center - 407.9).abs() < 1e-5);
    }

    #[test]
    fn test_reduce_without_calibration_uses_raw() {
        let mut ds = Dataset::new("gauss", raw_table());
        let reduced = ds.reduce(&max_normalization()).unwrap();
        assert_eq!(reduced.x(), raw_table().x());
        let (_, record) = ds.reduction().unwrap();
        assert!(record.normalization_factor.unwrap() > 0.0);
    }

    #[test]
    fn test_retrieve_parameters() {
        let mut ds = Dataset::new("gauss", raw_table());
        assert!(ds.retrieve_parameters().is_none());
        ds.reduce(&ReductionSpec::default()).unwrap();
        ds.fit(&model().with_values(&[90.0, 409.7, 1.2]), &FitOptions::default())
            .unwrap();
        let retrieved = ds.retrieve_parameters().unwrap();
        let amplitude = retrieved.parameter("P0_amplitude").unwrap().value;
        assert!((amplitude - 100.0).abs() < 1e-5);
    }

    #[test]
    fn test_lcf_needs_reduced_table_and_is_cleared() {
        let f = ShapeKind::Gaussian.evaluator();
        let reference = |name: &str, center: f64| {
            let x: Vec<f64> = (0..221).map(|i| 399.0 + i as f64 * 0.1).collect();
            let y = x.iter().map(|&e| f(e, &[100.0, center, 1.0]) + 1.0).collect();
            LcfReference::new(name, SpectrumTable::new(x, y, EnergyScale::Photon).unwrap())
        };
        let refs = [reference("A", 409.9), reference("B", 405.0)];

        let mut ds = Dataset::new("gauss", raw_table());
        assert!(matches!(
            ds.lcf(&refs, &LcfOptions::default()),
            Err(ThorondorError::StageError { .. })
        ));

        ds.reduce(&ReductionSpec::default()).unwrap();
        let options = LcfOptions {
            sum_to_one: false,
            ..Default::default()
        };
        let weight = ds.lcf(&refs, &options).unwrap().weight("A").unwrap();
        assert!(weight > 0.9);
        assert_eq!(ds.stage(), Stage::Reduced);
        assert!(ds.lcf_result().is_some());

        ds.calibrate(&CalibrationSpec::offset(0.5)).unwrap();
        assert!(ds.lcf_result().is_none());
    }

    #[test]
    fn test_comments() {
        let mut ds = Dataset::new("gauss", raw_table());
        ds.comment("first", false);
        ds.comment("second", false);
        assert_eq!(ds.comment_text(), "first\nsecond");
        ds.comment("fresh", true);
        assert_eq!(ds.comment_text(), "fresh");
        ds.comment("", true);
        assert_eq!(ds.comment_text(), "");
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut ds = Dataset::new("gauss", raw_table()).with_source("gauss.dat");
        ds.metadata.set("author", "operator");
        ds.metadata.set("beam_current", "400 mA");
        ds.comment("clean edge", false);
        ds.calibrate(&CalibrationSpec::offset(0.5)).unwrap();
        ds.reduce(&max_normalization()).unwrap();
        ds.fit(&model(), &FitOptions::default()).unwrap();

        let path = std::env::temp_dir().join(format!("thorondor_ds_{}.json", std::process::id()));
        ds.save(&path).unwrap();
        let restored = Dataset::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored, ds);
        assert_eq!(restored.stage(), Stage::Fitted);
    }

    #[test]
    fn test_load_rejects_corrupted_table() {
        let mut ds = Dataset::new("gauss", raw_table());
        ds.reduce(&ReductionSpec::default()).unwrap();
        let mut value = serde_json::to_value(&ds).unwrap();
        value["raw"]["y"] = serde_json::json!([1.0]);

        let path = std::env::temp_dir().join(format!("thorondor_bad_{}.json", std::process::id()));
        std::fs::write(&path, value.to_string()).unwrap();
        let loaded = Dataset::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(loaded, Err(ThorondorError::ParseError { .. })));

        let mut value = serde_json::to_value(&ds).unwrap();
        value["stage"] = serde_json::json!("Fitted");
        let path = std::env::temp_dir().join(format!("thorondor_stage_{}.json", std::process::id()));
        std::fs::write(&path, value.to_string()).unwrap();
        let loaded = Dataset::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(loaded, Err(ThorondorError::ParseError { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("thorondor_missing_dataset.json");
        assert!(matches!(
            Dataset::load(&path),
            Err(ThorondorError::FileNotFound { .. })
        ));
    }
}
