//! # Thorondor - XAS/XPS 谱数据约化与峰拟合命令行工具
//!
//! ## 子命令
//! - `calibrate` - 能量轴标定（显式偏移或边沿检测）
//! - `reduce` - 去毛刺、背景扣除与归一化
//! - `fit` - 多组分峰拟合
//! - `lcf` - 参考谱线性组合拟合
//! - `run` - 按配置文件批量执行流水线
//! - `show` - 查看保存的数据集
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   └── commands/   (命令执行逻辑)
//!         └── thorondor 库 (数值引擎与适配器)
//! ```

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use thorondor::utils::output;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = commands::run(cli.command) {
        output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
