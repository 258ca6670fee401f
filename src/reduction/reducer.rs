//! # 数据约化
//!
//! 按固定顺序处理：去毛刺 → 背景扣除 → 归一化。每一步都可单独开关，
//! 输入表不被修改。
//!
//! 边沿跳变归一化自带前沿扣除与跳变除法，只能在去毛刺之后单独使用，
//! 不能与 `background` 或 `normalization` 同时设置。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `commands/reduce.rs`, `config.rs` 使用
//! - 使用 `reduction/background.rs`, `reduction/normalize.rs`, `reduction/deglitch.rs`,
//!   `reduction/edge_jump.rs`

use crate::error::{Result, ThorondorError};
use crate::models::spectrum::SpectrumTable;
use crate::reduction::background::{compute_background, BackgroundSpec};
use crate::reduction::deglitch::{deglitch, DeglitchSpec};
use crate::reduction::edge_jump::{normalize_edge_jump, EdgeJumpSpec};
use crate::reduction::normalize::{normalize, NormalizationSpec};
use log::info;
use serde::{Deserialize, Serialize};

/// 约化设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionSpec {
    #[serde(default)]
    pub deglitch: Vec<DeglitchSpec>,
    #[serde(default)]
    pub background: Option<BackgroundSpec>,
    #[serde(default)]
    pub normalization: Option<NormalizationSpec>,
    #[serde(default)]
    pub edge_jump: Option<EdgeJumpSpec>,
}

/// 约化过程中得到的中间量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionRecord {
    /// 扣除的背景曲线（与 x 对齐）
    pub background: Option<Vec<f64>>,
    /// 归一化因子（边沿跳变时为跳变高度）
    pub normalization_factor: Option<f64>,
    /// 边沿跳变使用的 E0
    #[serde(default)]
    pub e0: Option<f64>,
    /// 修补的毛刺数
    pub glitches_removed: usize,
}

/// 约化器
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    spec: ReductionSpec,
}

impl Reducer {
    pub fn new(spec: ReductionSpec) -> Self {
        Reducer { spec }
    }

    pub fn spec(&self) -> &ReductionSpec {
        &self.spec
    }

    pub fn reduce(&self, table: &SpectrumTable) -> Result<SpectrumTable> {
        self.reduce_detailed(table).map(|(reduced, _)| reduced)
    }

    /// 约化并返回中间量
    pub fn reduce_detailed(&self, table: &SpectrumTable) -> Result<(SpectrumTable, ReductionRecord)> {
        if self.spec.edge_jump.is_some()
            && (self.spec.background.is_some() || self.spec.normalization.is_some())
        {
            return Err(ThorondorError::InvalidArgument(
                "edge-jump normalization cannot be combined with a background or normalization step"
                    .to_string(),
            ));
        }

        let mut current = table.clone();
        let mut record = ReductionRecord::default();

        for glitch in &self.spec.deglitch {
            current = deglitch(&current, glitch)?;
            record.glitches_removed += 1;
        }

        if let Some(bg_spec) = &self.spec.background {
            let background = compute_background(&current, bg_spec)?;
            let y = current
                .y()
                .iter()
                .zip(&background)
                .map(|(y, b)| y - b)
                .collect();
            current = current.with_y(y)?;
            info!("Subtracted {} background", bg_spec.model);
            record.background = Some(background);
        }

        if let Some(norm_spec) = &self.spec.normalization {
            let (normalized, factor) = normalize(&current, norm_spec)?;
            current = normalized;
            info!(
                "Normalized by {:?} over [{}, {}] (factor {:.6e})",
                norm_spec.mode, norm_spec.window.0, norm_spec.window.1, factor
            );
            record.normalization_factor = Some(factor);
        }

        if let Some(jump_spec) = &self.spec.edge_jump {
            let (normalized, jump) = normalize_edge_jump(&current, jump_spec)?;
            current = normalized;
            info!(
                "Edge-jump normalized at E0 = {:.4} (jump {:.6e})",
                jump.e0, jump.jump
            );
            record.background = Some(jump.pre_edge);
            record.normalization_factor = Some(jump.jump);
            record.e0 = Some(jump.e0);
        }

        Ok((current, record))
    }
}

/// 以给定设置约化
pub fn reduce(table: &SpectrumTable, spec: &ReductionSpec) -> Result<SpectrumTable> {
    Reducer::new(spec.clone()).reduce(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::EnergyScale;
    use crate::reduction::background::BackgroundModel;

    fn edge_table() -> SpectrumTable {
        let x: Vec<f64> = (0..101).map(|i| 520.0 + i as f64 * 0.2).collect();
        let y = x
            .iter()
            .map(|&e| 2.0 + 0.05 * (e - 520.0) + 3.0 / (1.0 + (-(e - 530.0) / 0.5).exp()))
            .collect();
        SpectrumTable::new(x, y, EnergyScale::Photon).unwrap()
    }

    #[test]
    fn test_background_then_normalization() {
        let table = edge_table();
        let spec = ReductionSpec {
            background: Some(BackgroundSpec::new(BackgroundModel::Linear).with_window(520.0, 526.0)),
            normalization: Some(NormalizationSpec::mean(535.0, 540.0)),
            ..Default::default()
        };
        let (reduced, record) = Reducer::new(spec).reduce_detailed(&table).unwrap();

        let bg = record.background.as_ref().unwrap();
        let factor = record.normalization_factor.unwrap();
        for i in 0..table.len() {
            let expected = (table.y()[i] - bg[i]) / factor;
            assert!((reduced.y()[i] - expected).abs() < 1e-12);
        }

        let idx = reduced.indices_within(535.0, 540.0);
        let mean = idx.iter().map(|&i| reduced.y()[i]).sum::<f64>() / idx.len() as f64;
        assert!((mean - 1.0).abs() < 1e-12);
        // 前沿区域扣除后接近零
        assert!(reduced.y()[5].abs() < 1e-3);
    }

    #[test]
    fn test_steps_are_optional_and_input_untouched() {
        let table = edge_table();
        let unchanged = Reducer::default().reduce(&table).unwrap();
        assert_eq!(unchanged, table);

        let only_norm = reduce(
            &table,
            &ReductionSpec {
                normalization: Some(NormalizationSpec::mean(520.0, 540.0)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(only_norm.x(), table.x());
        assert_ne!(only_norm.y(), table.y());
    }

    #[test]
    fn test_errors_propagate() {
        let spec = ReductionSpec {
            normalization: Some(NormalizationSpec::mean(530.05, 530.15)),
            ..Default::default()
        };
        assert!(matches!(
            reduce(&edge_table(), &spec),
            Err(ThorondorError::RangeError { .. })
        ));
    }

    #[test]
    fn test_edge_jump_step() {
        let table = edge_table();
        let spec = ReductionSpec {
            edge_jump: Some(EdgeJumpSpec::linear((520.0, 526.0), (534.0, 540.0))),
            ..Default::default()
        };
        let (reduced, record) = Reducer::new(spec.clone()).reduce_detailed(&table).unwrap();
        let e0 = record.e0.unwrap();
        assert!((e0 - 530.0).abs() < 0.3);
        // 两侧斜率相同，跳变等于台阶高度
        assert!((record.normalization_factor.unwrap() - 3.0).abs() < 0.05);
        assert!(reduced.y()[5].abs() < 1e-2);
        assert!((reduced.y()[95] - 1.0).abs() < 2e-2);

        let mixed = ReductionSpec {
            normalization: Some(NormalizationSpec::mean(535.0, 540.0)),
            ..spec
        };
        assert!(matches!(
            reduce(&table, &mixed),
            Err(ThorondorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_deglitch_runs_first() {
        let mut table_y = edge_table().y().to_vec();
        table_y[50] += 100.0;
        let table = edge_table().with_y(table_y).unwrap();
        let spec = ReductionSpec {
            deglitch: vec![DeglitchSpec::new(50, 51)],
            ..Default::default()
        };
        let (out, record) = Reducer::new(spec).reduce_detailed(&table).unwrap();
        assert_eq!(record.glitches_removed, 1);
        assert!((out.y()[50] - edge_table().y()[50]).abs() < 0.5);
    }
}
