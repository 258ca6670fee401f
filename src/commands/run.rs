//! # run 子命令实现
//!
//! 按 `PipelineConfig` 对每个输入文件执行 标定 → 约化 → 拟合，
//! 每个数据集写出 `<name>.json`、约化表与拟合表，最后写出汇总表。
//!
//! ## 功能
//! - 支持单文件和批量目录处理
//! - 并行处理（rayon），数据集之间互不影响
//! - 单个文件失败不会中断整批
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的 RunArgs
//! - 使用 `batch/`, `config.rs`, `parsers/`, `export/`

use crate::cli::run::RunArgs;
use crate::commands::dataset_name;
use std::fs;
use std::path::Path;
use thorondor::batch::{BatchRunner, FileCollector, ProcessResult};
use thorondor::config::PipelineConfig;
use thorondor::export;
use thorondor::fitting::SilentObserver;
use thorondor::parsers;
use thorondor::utils::output;
use thorondor::{Dataset, Result, ThorondorError};

/// 执行批量流水线
pub fn execute(args: RunArgs) -> Result<()> {
    output::print_header("Pipeline Run");

    if !args.input.exists() {
        return Err(ThorondorError::FileNotFound {
            path: args.input.display().to_string(),
        });
    }
    let config = PipelineConfig::load(&args.config)?;
    output::print_info(&format!("Configuration: '{}'", args.config.display()));

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect();
    if files.is_empty() {
        output::print_warning(&format!(
            "No matching files found with pattern '{}'",
            args.pattern
        ));
        return Ok(());
    }

    fs::create_dir_all(&args.output).map_err(|e| ThorondorError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    let runner = BatchRunner::new(args.jobs);
    output::print_info(&format!(
        "Processing {} file(s) with {} job(s)",
        files.len(),
        runner.jobs()
    ));

    let result = runner.run(files, |path| process_file(path, &config, &args))?;

    for (path, why) in &result.skipped {
        output::print_skip(&format!("{}: {}", path, why));
    }
    for (path, err) in &result.failures {
        output::print_error(&format!("{}: {}", path, err));
    }

    let fitted: Vec<(String, &thorondor::fitting::FitResult)> = result
        .outputs
        .iter()
        .filter_map(|(_, ds)| ds.current_fit().map(|fit| (ds.name.clone(), fit)))
        .collect();
    if !fitted.is_empty() {
        let summary = args.output.join("summary.csv");
        export::summary_to_csv(&fitted, &summary)?;
        output::print_written("summary", &summary.display().to_string());
    }

    output::print_separator();
    output::print_done(&format!(
        "{} succeeded, {} skipped, {} failed (of {})",
        result.success(),
        result.skipped.len(),
        result.failed(),
        result.total()
    ));
    Ok(())
}

/// 处理单个文件
fn process_file(path: &Path, config: &PipelineConfig, args: &RunArgs) -> ProcessResult<Dataset> {
    let label = path.display().to_string();
    let name = dataset_name(path);
    let json_path = args.output.join(format!("{}.json", name));

    if args.skip_existing && json_path.exists() {
        return ProcessResult::Skipped(label, "dataset already exists".to_string());
    }
    if !parsers::is_spectrum_file(path) {
        return ProcessResult::Skipped(label, "not a spectrum file".to_string());
    }

    match run_pipeline(path, &name, config, args) {
        Ok(ds) => ProcessResult::Success(label, ds),
        Err(e) => ProcessResult::Failed(label, e.to_string()),
    }
}

fn run_pipeline(path: &Path, name: &str, config: &PipelineConfig, args: &RunArgs) -> Result<Dataset> {
    let table = parsers::parse_spectrum_file(path, &config.read)?;
    let mut ds = Dataset::new(name, table).with_source(path.display().to_string());
    config.apply(&mut ds, &SilentObserver)?;

    if let (Some(reduced), Some((_, record))) = (ds.reduced(), ds.reduction()) {
        export::table_to_csv(
            reduced,
            record.background.as_deref(),
            &args.output.join(format!("{}_reduced.csv", name)),
        )?;
    }
    if let Some(fit) = ds.current_fit() {
        export::fit_to_csv(fit, &args.output.join(format!("{}_fit.csv", name)))?;
        export::parameters_to_csv(fit, &args.output.join(format!("{}_params.csv", name)))?;
        if args.plot {
            export::plot_fit(fit, &args.output.join(format!("{}_fit.png", name)), name, 1200, 900)?;
        }
    }
    ds.save(&args.output.join(format!("{}.json", name)))?;
    Ok(ds)
}
