//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `thorondor` 库（parsers, models, calibration, reduction, fitting, export）
//! - 子模块: calibrate, reduce, fit, lcf, run, show, report

pub mod calibrate;
pub mod fit;
pub mod lcf;
pub mod reduce;
pub mod report;
pub mod run;
pub mod show;

use crate::cli::input::InputArgs;
use crate::cli::Commands;
use std::path::Path;
use thorondor::parsers;
use thorondor::utils::output;
use thorondor::{Dataset, Result};

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Calibrate(args) => calibrate::execute(args),
        Commands::Reduce(args) => reduce::execute(args),
        Commands::Fit(args) => fit::execute(args),
        Commands::Lcf(args) => lcf::execute(args),
        Commands::Run(args) => run::execute(args),
        Commands::Show(args) => show::execute(args),
    }
}

/// 是否为保存的数据集
pub fn is_dataset_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// 数据集名称取文件名主干
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// 读取输入：数据集 JSON 原样恢复，文本谱数据新建数据集
pub fn load_dataset(input: &InputArgs) -> Result<Dataset> {
    let path = &input.input;
    if is_dataset_file(path) {
        let ds = Dataset::load(path)?;
        output::print_info(&format!("Restored dataset '{}' [{}]", ds.name, ds.stage()));
        return Ok(ds);
    }

    let table = parsers::parse_spectrum_file(path, &input.read_options()?)?;
    output::print_info(&format!(
        "Loaded '{}': {} points, {}",
        path.display(),
        table.len(),
        table.scale
    ));
    Ok(Dataset::new(dataset_name(path), table).with_source(path.display().to_string()))
}

/// 按 `--save` 保存数据集
pub fn save_dataset(ds: &Dataset, input: &InputArgs) -> Result<()> {
    if let Some(path) = &input.save {
        ds.save(path)?;
        output::print_written("dataset", &path.display().to_string());
    }
    Ok(())
}
