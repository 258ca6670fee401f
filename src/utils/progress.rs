//! # 进度显示工具
//!
//! 封装 `indicatif` 提供统一的进度条样式，并把拟合迭代接到 spinner 上。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs` 使用
//! - 使用 `indicatif` crate, `fitting/optimizer.rs` 的 FitObserver

use crate::fitting::FitObserver;
use indicatif::{ProgressBar, ProgressStyle};

/// 创建标准进度条
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// 创建 spinner（用于不确定进度的任务）
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// 在 spinner 上显示拟合迭代次数与当前代价
pub struct FitSpinner {
    label: String,
    pb: ProgressBar,
}

impl FitSpinner {
    pub fn new(label: &str) -> Self {
        FitSpinner {
            label: label.to_string(),
            pb: create_spinner(label),
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl FitObserver for FitSpinner {
    fn on_iteration(&self, iteration: usize, cost: f64) {
        self.pb
            .set_message(format!("{}  iter {:>5}  cost {:.6e}", self.label, iteration, cost));
    }
}
