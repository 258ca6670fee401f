//! # 批量执行器
//!
//! 数据集之间互不共享可变状态，可以并行处理；单个数据集内部按流水线顺序执行。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代，结果保持输入顺序
//! - 进度条显示
//! - 错误收集与汇总报告
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{Result, ThorondorError};
use crate::utils::progress;

use rayon::prelude::*;
use std::path::PathBuf;

/// 单个文件处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult<T> {
    /// 处理成功，附带产出
    Success(String, T),
    /// 跳过（附原因）
    Skipped(String, String),
    /// 处理失败
    Failed(String, String), // (文件路径, 错误信息)
}

/// 批量处理结果统计
#[derive(Debug)]
pub struct BatchResult<T> {
    /// 成功的产出（按输入顺序）
    pub outputs: Vec<(String, T)>,
    /// 跳过详情
    pub skipped: Vec<(String, String)>,
    /// 失败详情
    pub failures: Vec<(String, String)>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        BatchResult {
            outputs: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult<T>) {
        match result {
            ProcessResult::Success(path, out) => self.outputs.push((path, out)),
            ProcessResult::Skipped(path, why) => self.skipped.push((path, why)),
            ProcessResult::Failed(path, err) => self.failures.push((path, err)),
        }
    }

    pub fn success(&self) -> usize {
        self.outputs.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.outputs.len() + self.skipped.len() + self.failures.len()
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
    /// 是否显示进度条
    show_progress: bool,
}

impl BatchRunner {
    /// 创建新的批量执行器（0 表示使用全部 CPU）
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self {
            jobs,
            show_progress: true,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理文件列表
    pub fn run<T, F>(&self, files: Vec<PathBuf>, processor: F) -> Result<BatchResult<T>>
    where
        T: Send,
        F: Fn(&PathBuf) -> ProcessResult<T> + Sync + Send,
    {
        let pb = if self.show_progress {
            progress::create_progress_bar(files.len() as u64, "Processing")
        } else {
            indicatif::ProgressBar::hidden()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| ThorondorError::Other(format!("cannot start worker pool: {}", e)))?;

        let results: Vec<ProcessResult<T>> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let result = processor(file);
                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();

        let mut batch_result = BatchResult::default();
        for result in results {
            batch_result.merge(result);
        }
        Ok(batch_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_input_order() {
        let files: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("f{}.dat", i))).collect();
        let result = BatchRunner::new(4)
            .quiet()
            .run(files, |path| {
                let name = path.display().to_string();
                let index: usize = name[1..name.len() - 4].parse().unwrap();
                match index % 5 {
                    0 => ProcessResult::Failed(name, "bad".to_string()),
                    1 => ProcessResult::Skipped(name, "empty".to_string()),
                    _ => ProcessResult::Success(name, index * 10),
                }
            })
            .unwrap();

        assert_eq!(result.total(), 20);
        assert_eq!(result.failed(), 4);
        assert_eq!(result.skipped.len(), 4);
        assert_eq!(result.success(), 12);
        let outputs: Vec<usize> = result.outputs.iter().map(|(_, v)| *v).collect();
        let mut sorted = outputs.clone();
        sorted.sort();
        assert_eq!(outputs, sorted);
    }

    #[test]
    fn test_zero_jobs_uses_all_cpus() {
        assert_eq!(BatchRunner::new(0).jobs(), num_cpus::get());
    }
}
