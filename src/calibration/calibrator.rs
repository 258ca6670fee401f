//! # 能量轴标定
//!
//! 把参考特征（显式偏移或自动检测的边沿）对齐到目标位置：
//!
//! ```text
//! x' = target + scale · (x − detected)
//! offset = detected − target
//! ```
//!
//! 边沿参考重复作用于已标定的谱表时偏移为 0，缩放也退化为 1（幂等）：
//! 边沿已在目标位置的谱表视为已经标定过。显式偏移每次都会再平移一次。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `commands/calibrate.rs` 使用
//! - 使用 `calibration/edge.rs`, `models/spectrum.rs`

use crate::calibration::edge::{detect_edge, EdgeDirection};
use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use log::info;
use serde::{Deserialize, Serialize};

/// 小于 `SNAP_RELATIVE · max|x|` 的偏移视为 0
const SNAP_RELATIVE: f64 = 1e-9;

fn default_smoothing() -> usize {
    3
}

/// 标定参考
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    /// 直接给出偏移：x' = x − offset（缩放以 0 为中心）
    Offset(f64),
    /// 在窗口内检测边沿并移到 target
    Edge {
        window: (f64, f64),
        target: f64,
        direction: EdgeDirection,
        /// 滑动平均宽度（点数）
        #[serde(default = "default_smoothing")]
        smoothing: usize,
    },
}

/// 标定设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSpec {
    pub reference: Reference,
    /// 可选线性缩放（> 0）
    #[serde(default)]
    pub scale: Option<f64>,
}

impl CalibrationSpec {
    pub fn offset(value: f64) -> Self {
        CalibrationSpec {
            reference: Reference::Offset(value),
            scale: None,
        }
    }

    pub fn edge(window: (f64, f64), target: f64, direction: EdgeDirection) -> Self {
        CalibrationSpec {
            reference: Reference::Edge {
                window,
                target,
                direction,
                smoothing: default_smoothing(),
            },
            scale: None,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// 实际作用的标定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedCalibration {
    pub detected: f64,
    pub target: f64,
    pub offset: f64,
    pub scale: f64,
}

impl AppliedCalibration {
    /// 变换单个能量值
    pub fn apply(&self, x: f64) -> f64 {
        if self.scale == 1.0 {
            x - self.offset
        } else {
            self.target + self.scale * (x - self.detected)
        }
    }
}

/// 标定器
#[derive(Debug, Clone)]
pub struct Calibrator {
    spec: CalibrationSpec,
}

impl Calibrator {
    pub fn new(spec: CalibrationSpec) -> Self {
        Calibrator { spec }
    }

    pub fn spec(&self) -> &CalibrationSpec {
        &self.spec
    }

    /// 对给定谱表解析参考，得到具体偏移（不修改谱表）
    pub fn resolve(&self, table: &SpectrumTable) -> Result<AppliedCalibration> {
        if table.len() < 2 {
            return Err(ThorondorError::calibration(format!(
                "table has {} sample(s), at least 2 are required",
                table.len()
            )));
        }

        let scale = self.spec.scale.unwrap_or(1.0);
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(ThorondorError::calibration(format!(
                "scale must be positive, got {}",
                scale
            )));
        }

        let (detected, target) = match &self.spec.reference {
            Reference::Offset(value) => {
                if !value.is_finite() {
                    return Err(ThorondorError::calibration("offset is not finite"));
                }
                (*value, 0.0)
            }
            Reference::Edge {
                window,
                target,
                direction,
                smoothing,
            } => (detect_edge(table, *window, *direction, *smoothing)?, *target),
        };

        let mut offset = detected - target;
        let mut scale = scale;
        let magnitude = table.x().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if offset.abs() < SNAP_RELATIVE * magnitude {
            offset = 0.0;
            if matches!(self.spec.reference, Reference::Edge { .. }) {
                scale = 1.0;
            }
        }

        Ok(AppliedCalibration {
            detected: target + offset,
            target,
            offset,
            scale,
        })
    }

    /// 标定并返回新表与实际标定
    pub fn calibrate(&self, table: &SpectrumTable) -> Result<(SpectrumTable, AppliedCalibration)> {
        let applied = self.resolve(table)?;
        let x = table.x().iter().map(|&v| applied.apply(v)).collect();
        let shifted = table.with_x(x).map_err(|e| match e {
            ThorondorError::InvalidTable(reason) => ThorondorError::calibration(format!(
                "calibrated axis is invalid: {}",
                reason
            )),
            other => other,
        })?;
        info!(
            "Calibrated: detected {:.4} -> {:.4} (offset {:.4}, scale {})",
            applied.detected, applied.target, applied.offset, applied.scale
        );
        Ok((shifted, applied))
    }

    pub fn shift(&self, table: &SpectrumTable) -> Result<SpectrumTable> {
        self.calibrate(table).map(|(shifted, _)| shifted)
    }
}

/// 以给定设置标定
pub fn shift(table: &SpectrumTable, spec: &CalibrationSpec) -> Result<SpectrumTable> {
    Calibrator::new(spec.clone()).shift(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;

    fn fermi_table(edge: f64) -> SpectrumTable {
        let x: Vec<f64> = (0..161).map(|i| 82.0 + i as f64 * 0.025).collect();
        let rows: Vec<Vec<f64>> = (0..2)
            .map(|k| {
                x.iter()
                    .map(|&e| 100.0 / (1.0 + ((e - edge) / 0.1).exp()) + 5.0 + k as f64)
                    .collect()
            })
            .collect();
        SpectrumTable::from_iterations(x, rows, EnergyScale::Kinetic).unwrap()
    }

    #[test]
    fn test_offset_shift_keeps_intensity() {
        let table = fermi_table(84.3);
        let shifted = shift(&table, &CalibrationSpec::offset(1.5)).unwrap();
        for (a, b) in shifted.x().iter().zip(table.x()) {
            assert!((a - (b - 1.5)).abs() < 1e-12);
        }
        assert_eq!(shifted.y(), table.y());
        assert_eq!(shifted.iterations(), table.iterations());
    }

    #[test]
    fn test_edge_moves_to_target() {
        let table = fermi_table(84.31);
        let spec = CalibrationSpec::edge((83.0, 85.5), 84.0, EdgeDirection::Falling);
        let (shifted, applied) = Calibrator::new(spec).calibrate(&table).unwrap();
        assert!((applied.offset - 0.31).abs() < 0.01);
        let again = detect_edge(&shifted, (83.0, 85.5), EdgeDirection::Falling, 3).unwrap();
        assert!((again - 84.0).abs() < 1e-6);
    }

    #[test]
    fn test_calibration_is_idempotent() {
        let table = fermi_table(84.31);
        let calibrator = Calibrator::new(CalibrationSpec::edge(
            (83.0, 85.5),
            84.0,
            EdgeDirection::Falling,
        ));
        let once = calibrator.shift(&table).unwrap();
        let (twice, applied) = calibrator.calibrate(&once).unwrap();
        assert_eq!(applied.offset, 0.0);
        assert_eq!(twice.x(), once.x());
        assert!(table.x() != once.x());
    }

    #[test]
    fn test_scaled_edge_calibration_is_idempotent() {
        let table = fermi_table(84.31);
        let calibrator = Calibrator::new(
            CalibrationSpec::edge((83.0, 85.5), 84.0, EdgeDirection::Falling).with_scale(1.1),
        );
        let (once, first) = calibrator.calibrate(&table).unwrap();
        assert_eq!(first.scale, 1.1);
        assert!((once.x()[1] - once.x()[0] - 0.0275).abs() < 1e-12);

        let (twice, second) = calibrator.calibrate(&once).unwrap();
        assert_eq!(second.offset, 0.0);
        assert_eq!(second.scale, 1.0);
        assert_eq!(twice.x(), once.x());
    }

    #[test]
    fn test_scale_about_reference() {
        let table = fermi_table(84.3);
        let spec = CalibrationSpec::offset(0.0).with_scale(2.0);
        let shifted = shift(&table, &spec).unwrap();
        assert!((shifted.x()[1] - shifted.x()[0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_failures() {
        let table = fermi_table(84.3);
        // 非正缩放会翻转或压扁能量轴
        for scale in [0.0, -1.0] {
            let spec = CalibrationSpec::offset(1.0).with_scale(scale);
            assert!(matches!(
                shift(&table, &spec),
                Err(ThorondorError::CalibrationError { .. })
            ));
        }
        // 窗口中没有边沿
        let spec = CalibrationSpec::edge((82.0, 83.5), 84.0, EdgeDirection::Falling);
        assert!(matches!(
            shift(&table, &spec),
            Err(ThorondorError::CalibrationError { .. })
        ));
        // 样本不足
        let tiny = SpectrumTable::new(vec![1.0], vec![1.0], EnergyScale::Photon).unwrap();
        assert!(shift(&tiny, &CalibrationSpec::offset(0.5)).is_err());
    }
}
