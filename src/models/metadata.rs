//! # 数据集元数据
//!
//! 稳定键（author, instrument, experiment, purpose, timestamp, logbook_entry）
//! 作为显式字段，其余键进入 `extra` 映射。`set`/`get` 对两者透明。
//!
//! ## 依赖关系
//! - 被 `models/dataset.rs`, `commands/show.rs` 使用

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 稳定键列表（按显示顺序）
pub const STABLE_KEYS: [&str; 6] = [
    "author",
    "instrument",
    "experiment",
    "purpose",
    "timestamp",
    "logbook_entry",
];

/// 元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// 操作者
    pub author: Option<String>,

    /// 光束线 / 谱仪
    pub instrument: Option<String>,

    /// 实验名称
    pub experiment: Option<String>,

    /// 测量目的
    pub purpose: Option<String>,

    /// 采集时间（原样保存的文本）
    pub timestamp: Option<String>,

    /// 对应的实验日志条目
    pub logbook_entry: Option<String>,

    /// 其他键
    pub extra: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "author" => Some(&mut self.author),
            "instrument" => Some(&mut self.instrument),
            "experiment" => Some(&mut self.experiment),
            "purpose" => Some(&mut self.purpose),
            "timestamp" => Some(&mut self.timestamp),
            "logbook_entry" => Some(&mut self.logbook_entry),
            _ => None,
        }
    }

    /// 设置键值；稳定键写入对应字段
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.slot(key) {
            Some(field) => *field = Some(value),
            None => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let field = match key {
            "author" => &self.author,
            "instrument" => &self.instrument,
            "experiment" => &self.experiment,
            "purpose" => &self.purpose,
            "timestamp" => &self.timestamp,
            "logbook_entry" => &self.logbook_entry,
            _ => return self.extra.get(key).map(String::as_str),
        };
        field.as_deref()
    }

    /// 删除键，返回旧值
    pub fn remove(&mut self, key: &str) -> Option<String> {
        match self.slot(key) {
            Some(field) => field.take(),
            None => self.extra.remove(key),
        }
    }

    /// 所有已设置的键值（稳定键在前）
    pub fn entries(&self) -> Vec<(&str, &str)> {
        STABLE_KEYS
            .iter()
            .filter_map(|&k| self.get(k).map(|v| (k, v)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_and_extra_keys() {
        let mut meta = Metadata::new();
        assert!(meta.is_empty());
        meta.set("author", "beamline staff");
        meta.set("sample_temperature", "300 K");

        assert_eq!(meta.author.as_deref(), Some("beamline staff"));
        assert_eq!(meta.get("author"), Some("beamline staff"));
        assert_eq!(meta.get("sample_temperature"), Some("300 K"));
        assert_eq!(meta.get("purpose"), None);
        assert_eq!(
            meta.entries(),
            vec![("author", "beamline staff"), ("sample_temperature", "300 K")]
        );

        assert_eq!(meta.remove("author").as_deref(), Some("beamline staff"));
        assert_eq!(meta.get("author"), None);
        assert_eq!(meta.entries().len(), 1);
    }
}
