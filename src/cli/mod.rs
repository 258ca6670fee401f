//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `calibrate`: 能量轴标定
//! - `reduce`: 背景扣除与归一化
//! - `fit`: 峰拟合
//! - `lcf`: 参考谱线性组合拟合
//! - `run`: 按配置文件批量执行流水线
//! - `show`: 查看保存的数据集
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: input, calibrate, reduce, fit, lcf, run, show

pub mod calibrate;
pub mod fit;
pub mod input;
pub mod lcf;
pub mod reduce;
pub mod run;
pub mod show;

use clap::{Parser, Subcommand};

/// Thorondor - XAS/XPS 谱数据约化与峰拟合
#[derive(Parser)]
#[command(name = "thorondor")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Reduction and peak fitting of X-ray absorption / photoemission spectra", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Shift (and optionally rescale) the energy axis
    Calibrate(calibrate::CalibrateArgs),

    /// Subtract a background and normalize
    Reduce(reduce::ReduceArgs),

    /// Fit a composite peak model
    Fit(fit::FitArgs),

    /// Fit the reduced table as a linear combination of reference spectra
    Lcf(lcf::LcfArgs),

    /// Run a configured pipeline over a file or directory
    Run(run::RunArgs),

    /// Print the state of a saved dataset
    Show(show::ShowArgs),
}
