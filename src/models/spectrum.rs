//! # 谱表数据模型
//!
//! 一次采集的规范内存表示：能量轴 x、强度 y，以及可选的逐次扫描原始计数。
//!
//! ## 不变量
//! - `x.len() == y.len()`，每一行扫描数据长度也与之相同
//! - x 严格单调（递增或递减均可，结合能约定下常见递减）
//! - 所有数值有限
//!
//! ## 依赖关系
//! - 被 `calibration/`, `reduction/`, `fitting/`, `models/dataset.rs` 使用
//! - 无外部模块依赖

use crate::error::{Result, ThorondorError};
use serde::{Deserialize, Serialize};

/// 能量轴约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnergyScale {
    /// 光子能量（XAS）
    #[default]
    Photon,
    /// 动能（XPS 原始数据）
    Kinetic,
    /// 结合能（XPS，以费米能级为零点）
    Binding,
}

impl std::fmt::Display for EnergyScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyScale::Photon => write!(f, "photon energy"),
            EnergyScale::Kinetic => write!(f, "kinetic energy"),
            EnergyScale::Binding => write!(f, "binding energy"),
        }
    }
}

/// 谱表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct SpectrumTable {
    /// 能量轴约定
    pub scale: EnergyScale,
    x: Vec<f64>,
    y: Vec<f64>,
    /// 逐次扫描强度（扫描序号 → 与 x 对齐的强度序列）
    iterations: Option<Vec<Vec<f64>>>,
}

/// 反序列化的中间形式，经 `validate()` 后才成为谱表
#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    scale: EnergyScale,
    x: Vec<f64>,
    y: Vec<f64>,
    #[serde(default)]
    iterations: Option<Vec<Vec<f64>>>,
}

impl TryFrom<RawTable> for SpectrumTable {
    type Error = ThorondorError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let table = SpectrumTable {
            scale: raw.scale,
            x: raw.x,
            y: raw.y,
            iterations: raw.iterations,
        };
        table.validate()?;
        Ok(table)
    }
}

impl SpectrumTable {
    /// 创建谱表并校验不变量
    pub fn new(x: Vec<f64>, y: Vec<f64>, scale: EnergyScale) -> Result<Self> {
        let table = SpectrumTable {
            scale,
            x,
            y,
            iterations: None,
        };
        table.validate()?;
        Ok(table)
    }

    /// 由逐次扫描数据创建，y 取各扫描的逐点平均
    pub fn from_iterations(x: Vec<f64>, rows: Vec<Vec<f64>>, scale: EnergyScale) -> Result<Self> {
        if rows.is_empty() {
            return Err(ThorondorError::InvalidTable(
                "at least one iteration row is required".to_string(),
            ));
        }
        let n = x.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != n) {
            return Err(ThorondorError::InvalidTable(format!(
                "iteration row {} has {} points, expected {}",
                bad,
                rows[bad].len(),
                n
            )));
        }

        let count = rows.len() as f64;
        let y = (0..n)
            .map(|i| rows.iter().map(|r| r[i]).sum::<f64>() / count)
            .collect();

        let table = SpectrumTable {
            scale,
            x,
            y,
            iterations: Some(rows),
        };
        table.validate()?;
        Ok(table)
    }

    /// 附加逐次扫描数据（不改变 y）
    pub fn with_iterations(mut self, rows: Vec<Vec<f64>>) -> Result<Self> {
        self.iterations = Some(rows);
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.x.len() != self.y.len() {
            return Err(ThorondorError::InvalidTable(format!(
                "x has {} points but y has {}",
                self.x.len(),
                self.y.len()
            )));
        }
        if self.x.is_empty() {
            return Err(ThorondorError::InvalidTable("table is empty".to_string()));
        }
        if self.x.iter().chain(self.y.iter()).any(|v| !v.is_finite()) {
            return Err(ThorondorError::InvalidTable(
                "table contains non-finite values".to_string(),
            ));
        }
        if !is_strictly_monotonic(&self.x) {
            return Err(ThorondorError::InvalidTable(
                "x axis is not strictly monotonic".to_string(),
            ));
        }
        if let Some(rows) = &self.iterations {
            if let Some(bad) = rows.iter().position(|r| r.len() != self.x.len()) {
                return Err(ThorondorError::InvalidTable(format!(
                    "iteration row {} has {} points, expected {}",
                    bad,
                    rows[bad].len(),
                    self.x.len()
                )));
            }
        }
        Ok(())
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn iterations(&self) -> Option<&[Vec<f64>]> {
        self.iterations.as_deref()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// x 是否递增
    pub fn is_increasing(&self) -> bool {
        self.x.len() < 2 || self.x[1] > self.x[0]
    }

    /// x 的取值范围 (min, max)
    pub fn x_range(&self) -> (f64, f64) {
        let first = self.x[0];
        let last = self.x[self.x.len() - 1];
        (first.min(last), first.max(last))
    }

    /// 落在闭区间 [lo, hi] 内的样本下标（按存储顺序）
    pub fn indices_within(&self, lo: f64, hi: f64) -> Vec<usize> {
        self.x
            .iter()
            .enumerate()
            .filter(|(_, &x)| x >= lo && x <= hi)
            .map(|(i, _)| i)
            .collect()
    }

    /// 用新的 x 轴替换（y 与扫描数据不变），重新校验单调性
    pub fn with_x(&self, x: Vec<f64>) -> Result<Self> {
        let table = SpectrumTable {
            scale: self.scale,
            x,
            y: self.y.clone(),
            iterations: self.iterations.clone(),
        };
        table.validate()?;
        Ok(table)
    }

    /// 用新的强度替换（x 不变）
    ///
    /// 逐次扫描数据描述的是原始计数，强度被处理后不再对应，因此丢弃。
    pub fn with_y(&self, y: Vec<f64>) -> Result<Self> {
        let table = SpectrumTable {
            scale: self.scale,
            x: self.x.clone(),
            y,
            iterations: None,
        };
        table.validate()?;
        Ok(table)
    }

    /// 动能与结合能互换：BE = hν − KE − φ
    pub fn converted(
        &self,
        target: EnergyScale,
        photon_energy: f64,
        work_function: f64,
    ) -> Result<Self> {
        let flip = |e: f64| photon_energy - e - work_function;
        match (self.scale, target) {
            (a, b) if a == b => Ok(self.clone()),
            (EnergyScale::Kinetic, EnergyScale::Binding)
            | (EnergyScale::Binding, EnergyScale::Kinetic) => {
                let mut table = self.with_x(self.x.iter().map(|&e| flip(e)).collect())?;
                table.scale = target;
                Ok(table)
            }
            (from, to) => Err(ThorondorError::InvalidArgument(format!(
                "cannot convert {} to {}",
                from, to
            ))),
        }
    }
}

/// 判断序列是否严格单调
pub fn is_strictly_monotonic(values: &[f64]) -> bool {
    if values.len() < 2 {
        return true;
    }
    let increasing = values[1] > values[0];
    values.windows(2).all(|w| {
        if increasing {
            w[1] > w[0]
        } else {
            w[1] < w[0]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_length_mismatch() {
        let err = SpectrumTable::new(vec![1.0, 2.0, 3.0], vec![1.0, 2.0], EnergyScale::Photon);
        assert!(matches!(err, Err(ThorondorError::InvalidTable(_))));
    }

    #[test]
    fn test_rejects_non_monotonic_axis() {
        let err = SpectrumTable::new(
            vec![1.0, 3.0, 2.0],
            vec![1.0, 1.0, 1.0],
            EnergyScale::Photon,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_accepts_decreasing_axis() {
        let table = SpectrumTable::new(
            vec![290.0, 289.5, 289.0],
            vec![1.0, 2.0, 3.0],
            EnergyScale::Binding,
        )
        .unwrap();
        assert!(!table.is_increasing());
        assert_eq!(table.x_range(), (289.0, 290.0));
        assert_eq!(table.indices_within(289.2, 290.0), vec![0, 1]);
    }

    #[test]
    fn test_from_iterations_averages_rows() {
        let table = SpectrumTable::from_iterations(
            vec![1.0, 2.0],
            vec![vec![1.0, 3.0], vec![3.0, 5.0]],
            EnergyScale::Photon,
        )
        .unwrap();
        assert_eq!(table.y(), &[2.0, 4.0]);
        assert_eq!(table.iterations().unwrap().len(), 2);

        let bad = SpectrumTable::from_iterations(
            vec![1.0, 2.0],
            vec![vec![1.0, 3.0], vec![3.0]],
            EnergyScale::Photon,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_deserialize_validates_table() {
        let ragged = r#"{"scale":"Photon","x":[3.0,1.0,2.0],"y":[1.0],"iterations":null}"#;
        let err = serde_json::from_str::<SpectrumTable>(ragged).unwrap_err();
        assert!(err.to_string().contains("x has 3 points but y has 1"));

        let unordered = r#"{"scale":"Photon","x":[3.0,1.0,2.0],"y":[1.0,1.0,1.0]}"#;
        assert!(serde_json::from_str::<SpectrumTable>(unordered).is_err());

        let empty = r#"{"scale":"Photon","x":[],"y":[]}"#;
        assert!(serde_json::from_str::<SpectrumTable>(empty).is_err());

        let table = SpectrumTable::new(vec![1.0, 2.0], vec![5.0, 6.0], EnergyScale::Kinetic).unwrap();
        let text = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<SpectrumTable>(&text).unwrap(), table);
    }

    #[test]
    fn test_kinetic_to_binding_conversion() {
        let table = SpectrumTable::new(
            vec![100.0, 101.0, 102.0],
            vec![1.0, 2.0, 3.0],
            EnergyScale::Kinetic,
        )
        .unwrap();
        let be = table.converted(EnergyScale::Binding, 400.0, 4.5).unwrap();
        assert_eq!(be.scale, EnergyScale::Binding);
        assert_eq!(be.x(), &[295.5, 294.5, 293.5]);
        assert_eq!(be.y(), table.y());

        let back = be.converted(EnergyScale::Kinetic, 400.0, 4.5).unwrap();
        assert_eq!(back.x(), table.x());
        assert!(table.converted(EnergyScale::Photon, 400.0, 4.5).is_err());
    }
}
