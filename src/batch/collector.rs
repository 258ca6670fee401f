//! # 文件收集器
//!
//! 根据输入路径和模式收集待处理的谱数据文件。
//!
//! ## 功能
//! - 支持单文件和目录输入
//! - glob 模式匹配（逗号分隔的多模式）
//! - 递归目录搜索，结果按路径排序
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{Result, ThorondorError};
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 默认匹配模式
pub const DEFAULT_PATTERN: &str = "*.txt,*.dat,*.csv";

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    input: PathBuf,
    /// 匹配模式列表
    patterns: Vec<Pattern>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的文件收集器（使用默认模式）
    pub fn new(input: PathBuf) -> Self {
        let patterns = DEFAULT_PATTERN
            .split(',')
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        Self {
            input,
            patterns,
            recursive: false,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let patterns = pattern
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Pattern::new(s).map_err(|e| {
                    ThorondorError::InvalidArgument(format!("bad pattern '{}': {}", s, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if !patterns.is_empty() {
            self.patterns = patterns;
        }
        Ok(self)
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 收集所有匹配的文件
    pub fn collect(&self) -> Vec<PathBuf> {
        if self.input.is_file() {
            return vec![self.input.clone()];
        }

        if !self.input.is_dir() {
            return vec![];
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files: Vec<PathBuf> = WalkDir::new(&self.input)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|entry| self.matches_patterns(entry.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// 检查文件名是否匹配任一模式
    fn matches_patterns(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.patterns.iter().any(|p| p.matches(name)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let collector = FileCollector::new(PathBuf::from("."));
        assert!(collector.matches_patterns(Path::new("data/Fe_L3.dat")));
        assert!(collector.matches_patterns(Path::new("scan_001.csv")));
        assert!(!collector.matches_patterns(Path::new("scan_001.json")));

        let collector = FileCollector::new(PathBuf::from("."))
            .with_pattern("O1s_*.txt, scan_??.dat")
            .unwrap();
        assert!(collector.matches_patterns(Path::new("O1s_300K.txt")));
        assert!(collector.matches_patterns(Path::new("scan_12.dat")));
        assert!(!collector.matches_patterns(Path::new("scan_123.dat")));
        assert!(!collector.matches_patterns(Path::new("C1s_300K.txt")));
    }

    #[test]
    fn test_collect_from_directory() {
        let dir = std::env::temp_dir().join(format!("thorondor_collect_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["b.dat", "a.txt", "notes.md", "nested/c.csv"] {
            std::fs::write(dir.join(name), "1 2\n").unwrap();
        }

        let flat = FileCollector::new(dir.clone()).collect();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.dat"]);

        let deep = FileCollector::new(dir.clone()).recursive(true).collect();
        assert_eq!(deep.len(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_pattern() {
        assert!(FileCollector::new(PathBuf::from(".")).with_pattern("[").is_err());
    }
}
