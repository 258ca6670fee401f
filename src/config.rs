//! # 流水线配置
//!
//! 批量处理用的 JSON 配置文件，由各阶段的设置直接组合而成：
//!
//! ```json
//! {
//!   "read": { "x": 0, "y": 1, "scale": "Binding" },
//!   "calibration": { "reference": { "offset": 0.35 } },
//!   "reduction": {
//!     "background": { "model": { "shirley": { "tolerance": 1e-6, "max_iterations": 100 } } },
//!     "normalization": { "mode": "maximum", "window": [280.0, 292.0] }
//!   },
//!   "model": { "background": "constant", "peak": "doniach_sunjic", "peaks": 2 },
//!   "fit": { "method": "levenberg_marquardt", "max_iterations": 2000 }
//! }
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `calibration/`, `reduction/`, `fitting/`, `parsers/`, `models/dataset.rs`

use crate::calibration::CalibrationSpec;
use crate::error::{Result, ThorondorError};
use crate::fitting::{FitObserver, FitOptions, ModelSpec};
use crate::models::dataset::Dataset;
use crate::parsers::ReadOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 整条流水线的设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 输入文件的列选择
    pub read: ReadOptions,
    /// 能量标定；None 表示不标定
    pub calibration: Option<CalibrationSpec>,
    /// 约化步骤
    pub reduction: crate::reduction::ReductionSpec,
    /// 峰模型；None 表示只约化不拟合
    pub model: Option<ModelSpec>,
    /// 拟合选项
    pub fit: FitOptions,
}

impl PipelineConfig {
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
        serde_json::from_str(&content).map_err(|e| ThorondorError::ParseError {
            format: "pipeline config".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ThorondorError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// 在数据集上依次执行标定、约化与拟合
    pub fn apply(&self, dataset: &mut Dataset, observer: &dyn FitObserver) -> Result<()> {
        if let Some(spec) = &self.calibration {
            dataset.calibrate(spec)?;
        }
        let reduced = dataset.reduce(&self.reduction)?.clone();

        if let Some(model_spec) = &self.model {
            let idx = match self.fit.window {
                Some((lo, hi)) => reduced.indices_within(lo, hi),
                None => (0..reduced.len()).collect(),
            };
            if idx.is_empty() {
                return Err(ThorondorError::range("fit window contains no samples"));
            }
            let x: Vec<f64> = idx.iter().map(|&i| reduced.x()[i]).collect();
            let y: Vec<f64> = idx.iter().map(|&i| reduced.y()[i]).collect();
            let model = model_spec.build(&x, &y)?;
            dataset.fit_observed(&model, &self.fit, observer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::{ShapeKind, SilentObserver};
    use crate::models::spectrum::{EnergyScale, SpectrumTable};
    use crate::models::Stage;

    #[test]
    fn test_parse_documented_example() {
        let json = r#"{
            "read": { "x": 0, "y": 1, "scale": "Binding" },
            "calibration": { "reference": { "offset": 0.35 } },
            "reduction": {
                "background": { "model": { "shirley": { "tolerance": 1e-6, "max_iterations": 100 } } },
                "normalization": { "mode": "maximum", "window": [280.0, 292.0] }
            },
            "model": { "background": "constant", "peak": "doniach_sunjic", "peaks": 2 },
            "fit": { "method": "levenberg_marquardt", "max_iterations": 2000 }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.read.scale, EnergyScale::Binding);
        assert_eq!(config.calibration, Some(CalibrationSpec::offset(0.35)));
        assert!(config.reduction.background.is_some());
        let model = config.model.unwrap();
        assert_eq!(model.peak, ShapeKind::DoniachSunjic);
        assert_eq!(model.peaks, 2);
        assert_eq!(config.fit.ftol, FitOptions::default().ftol);
    }

    #[test]
    fn test_parse_edge_jump_and_spline_reduction() {
        let json = r#"{
            "reduction": {
                "edge_jump": {
                    "pre_edge": [7080.0, 7100.0],
                    "post_edge": [7130.0, 7155.0],
                    "post_line": "victoreen"
                }
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        let jump = config.reduction.edge_jump.unwrap();
        assert_eq!(jump.e0, None);
        assert_eq!(jump.pre_line, crate::reduction::EdgeLine::Polynomial { degree: 1 });
        assert_eq!(jump.post_line, crate::reduction::EdgeLine::Victoreen);

        let json = r#"{ "reduction": { "background": {
            "model": { "anchors": { "energies": [281.0, 290.0] } },
            "window": [280.0, 292.0]
        } } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        let bg = config.reduction.background.unwrap();
        assert_eq!(
            bg.model,
            crate::reduction::BackgroundModel::Anchors {
                energies: vec![281.0, 290.0]
            }
        );
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_apply_runs_every_stage() {
        let f = ShapeKind::Gaussian.evaluator();
        let x: Vec<f64> = (0..201).map(|i| 400.0 + i as f64 * 0.1).collect();
        let y = x.iter().map(|&e| f(e, &[100.0, 409.9, 1.0]) + 2.0).collect();
        let mut ds = Dataset::new("g", SpectrumTable::new(x, y, EnergyScale::Photon).unwrap());

        let config = PipelineConfig {
            calibration: Some(CalibrationSpec::offset(-0.1)),
            model: Some(ModelSpec {
                peak: ShapeKind::Gaussian,
                ..Default::default()
            }),
            ..Default::default()
        };
        config.apply(&mut ds, &SilentObserver).unwrap();

        assert_eq!(ds.stage(), Stage::Fitted);
        let fit = ds.latest_fit().unwrap();
        assert!((fit.value("P0_center").unwrap() - 410.0).abs() < 1e-4);
        assert!((fit.value("Bcgd_c").unwrap() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_save_load_round_trip() {
        let config = PipelineConfig {
            calibration: Some(CalibrationSpec::offset(1.25)),
            model: Some(ModelSpec::default()),
            ..Default::default()
        };
        let path = std::env::temp_dir().join(format!("thorondor_cfg_{}.json", std::process::id()));
        config.save(&path).unwrap();
        let loaded = PipelineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
