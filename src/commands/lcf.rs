//! # lcf 子命令实现
//!
//! 数据集 JSON 作为参考谱时依次取约化、标定、原始谱表中最先存在的一张。
//!
//! ## 依赖关系
//! - 使用 `cli/lcf.rs` 定义的 LcfArgs
//! - 使用 `fitting/lcf.rs`, `export/csv.rs`, `commands/report.rs`

use crate::cli::input::{parse_optional_window, InputArgs};
use crate::cli::lcf::LcfArgs;
use crate::commands::report::print_lcf_report;
use crate::commands::{dataset_name, is_dataset_file, load_dataset, save_dataset};
use std::collections::HashMap;
use std::path::Path;
use thorondor::export;
use thorondor::fitting::{LcfOptions, LcfReference};
use thorondor::parsers;
use thorondor::reduction::ReductionSpec;
use thorondor::utils::output;
use thorondor::{Dataset, Result, ThorondorError};

/// 解析 "NAME=VALUE" 列表
fn parse_named(items: &[String], flag: &str) -> Result<HashMap<String, f64>> {
    items
        .iter()
        .map(|item| {
            let bad = || {
                ThorondorError::InvalidArgument(format!("{} expects NAME=VALUE, got '{}'", flag, item))
            };
            let (name, value) = item.split_once('=').ok_or_else(bad)?;
            let value: f64 = value.trim().parse().map_err(|_| bad())?;
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

fn read_reference(path: &Path, input: &InputArgs) -> Result<LcfReference> {
    let name = dataset_name(path);
    let table = if is_dataset_file(path) {
        let ds = Dataset::load(path)?;
        ds.reduced()
            .or(ds.shifted())
            .unwrap_or(ds.raw())
            .clone()
    } else {
        parsers::parse_spectrum_file(path, &input.read_options()?)?
    };
    Ok(LcfReference::new(name, table))
}

/// 执行线性组合拟合
pub fn execute(args: LcfArgs) -> Result<()> {
    output::print_header("Linear Combination Fit");

    let shifts = parse_named(&args.shift, "--shift")?;
    let scales = parse_named(&args.scale_ref, "--scale-ref")?;
    let mut references = args
        .references
        .iter()
        .map(|p| read_reference(p, &args.input))
        .collect::<Result<Vec<_>>>()?;
    for r in &mut references {
        if let Some(&shift) = shifts.get(&r.name) {
            r.shift = shift;
        }
        if let Some(&scale) = scales.get(&r.name) {
            r.scale = scale;
        }
    }
    for name in shifts.keys().chain(scales.keys()) {
        if !references.iter().any(|r| &r.name == name) {
            output::print_warning(&format!("No reference named '{}'", name));
        }
    }

    let options = LcfOptions {
        window: parse_optional_window(args.window.as_deref())?,
        sum_to_one: !args.free_sum,
        max_iterations: args.max_iter,
    };

    let mut ds = load_dataset(&args.input)?;
    if ds.reduced().is_none() {
        output::print_info("No reduced table yet; fitting the data as loaded");
        ds.reduce(&ReductionSpec::default())?;
    }
    let result = ds.lcf(&references, &options)?.clone();
    print_lcf_report(&format!("LCF of '{}'", ds.name), &result);

    if let Some(path) = &args.output {
        export::lcf_to_csv(&result, path)?;
        output::print_written("LCF curves", &path.display().to_string());
    }

    output::print_done(&format!("'{}' decomposed", ds.name));
    save_dataset(&ds, &args.input)
}
