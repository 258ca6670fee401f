//! # fit 子命令实现
//!
//! 模型来源按优先级：`--retrieve`（数据集中最近一次拟合）、`--model` JSON、
//! 形状选项。逐参数选项最后应用。`--ci` 在拟合后逐参数步进 F 检验置信区间。
//!
//! ## 依赖关系
//! - 使用 `cli/fit.rs` 定义的 FitArgs
//! - 使用 `fitting/`, `export/`, `commands/report.rs`

use crate::cli::fit::{FitArgs, WeightArg};
use crate::cli::input::parse_optional_window;
use crate::commands::report::{print_confidence_report, print_fit_report};
use crate::commands::{load_dataset, save_dataset};
use std::collections::BTreeMap;
use thorondor::export;
use thorondor::fitting::{
    confidence_intervals, FitOptions, ModelSpec, ParamOverride, PeakModel, Weighting,
};
use thorondor::reduction::ReductionSpec;
use thorondor::utils::output;
use thorondor::utils::progress::FitSpinner;
use thorondor::{Result, ThorondorError};

/// 拆分 "NAME=REST"
fn split_assignment<'a>(text: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    text.split_once('=')
        .map(|(n, r)| (n.trim(), r.trim()))
        .filter(|(n, _)| !n.is_empty())
        .ok_or_else(|| {
            ThorondorError::InvalidArgument(format!("{} expects NAME=..., got '{}'", flag, text))
        })
}

fn parse_number(text: &str, flag: &str) -> Result<f64> {
    text.parse()
        .map_err(|_| ThorondorError::InvalidArgument(format!("{}: '{}' is not a number", flag, text)))
}

fn entry<'m>(map: &'m mut BTreeMap<String, ParamOverride>, name: &str) -> &'m mut ParamOverride {
    map.entry(name.to_string())
        .or_insert_with(|| ParamOverride::new(name))
}

/// 把逐参数选项合并成覆盖项（同名参数合并为一项）
pub fn collect_overrides(args: &FitArgs) -> Result<Vec<ParamOverride>> {
    let mut map: BTreeMap<String, ParamOverride> = BTreeMap::new();

    for item in &args.set {
        let (name, value) = split_assignment(item, "--set")?;
        entry(&mut map, name).value = Some(parse_number(value, "--set")?);
    }
    for item in &args.bounds {
        let (name, range) = split_assignment(item, "--bounds")?;
        let (lo, hi) = range.split_once(':').ok_or_else(|| {
            ThorondorError::InvalidRange(format!("{} (expected NAME=MIN:MAX)", item))
        })?;
        let o = entry(&mut map, name);
        if !lo.trim().is_empty() {
            o.min = Some(parse_number(lo.trim(), "--bounds")?);
        }
        if !hi.trim().is_empty() {
            o.max = Some(parse_number(hi.trim(), "--bounds")?);
        }
    }
    for name in &args.fix {
        entry(&mut map, name.trim()).vary = Some(false);
    }
    for name in &args.unlink {
        entry(&mut map, name.trim()).unlink = true;
    }
    for item in &args.link {
        let (name, expr) = split_assignment(item, "--link")?;
        entry(&mut map, name).expr = Some(expr.parse()?);
    }

    Ok(map.into_values().collect())
}

/// 由命令行参数构造拟合选项
pub fn build_options(args: &FitArgs) -> Result<FitOptions> {
    Ok(FitOptions {
        method: args.method.into(),
        max_iterations: args.max_iter,
        window: parse_optional_window(args.window.as_deref())?,
        weighting: match args.weights {
            WeightArg::None => Weighting::None,
            WeightArg::Intensity => Weighting::InverseIntensity,
            WeightArg::Rms => Weighting::Rms {
                points: args.rms_points,
                degree: args.rms_degree,
            },
        },
        ..Default::default()
    })
}

fn read_model_spec(path: &std::path::Path) -> Result<ModelSpec> {
    let content = std::fs::read_to_string(path).map_err(|e| ThorondorError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ThorondorError::ParseError {
        format: "model JSON".to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// 执行拟合
pub fn execute(args: FitArgs) -> Result<()> {
    output::print_header("Peak Fitting");

    let options = build_options(&args)?;
    let overrides = collect_overrides(&args)?;
    let mut ds = load_dataset(&args.input)?;

    if ds.reduced().is_none() {
        output::print_info("No reduced table yet; fitting the data as loaded");
        ds.reduce(&ReductionSpec::default())?;
    }

    let model: PeakModel = if args.retrieve {
        let mut model = ds.retrieve_parameters().ok_or_else(|| {
            ThorondorError::InvalidArgument(format!("'{}' has no previous fit to retrieve", ds.name))
        })?;
        for o in &overrides {
            model.apply_override(o)?;
        }
        model
    } else {
        let mut spec = match &args.model {
            Some(path) => read_model_spec(path)?,
            None => ModelSpec {
                background: args.bg.to_shape(args.degree),
                step: args.step.map(Into::into),
                peak: args.peak.into(),
                peaks: args.peaks,
                overrides: Vec::new(),
            },
        };
        spec.overrides.extend(overrides);

        let reduced = ds
            .reduced()
            .ok_or_else(|| ThorondorError::Other("reduced table missing".to_string()))?;
        let idx = match options.window {
            Some((lo, hi)) => reduced.indices_within(lo, hi),
            None => (0..reduced.len()).collect(),
        };
        let x: Vec<f64> = idx.iter().map(|&i| reduced.x()[i]).collect();
        let y: Vec<f64> = idx.iter().map(|&i| reduced.y()[i]).collect();
        spec.build(&x, &y)?
    };

    output::print_info(&format!(
        "{} components, {} free parameters, {}",
        model.len(),
        model.n_free(),
        options.method
    ));

    let spinner = FitSpinner::new(&format!("Fitting '{}'", ds.name));
    let fitted = ds.fit_observed(&model, &options, &spinner);
    spinner.finish();
    let result = fitted?.clone();

    print_fit_report(&format!("Fit #{} of '{}'", ds.fits().len(), ds.name), &result);

    if args.ci {
        let reduced = ds
            .reduced()
            .ok_or_else(|| ThorondorError::Other("reduced table missing".to_string()))?;
        let spinner = FitSpinner::new("Stepping confidence intervals");
        let intervals = confidence_intervals(reduced, &result, &options, &args.ci_sigmas);
        spinner.finish();
        print_confidence_report(&intervals?);
    }

    if let Some(path) = &args.output {
        export::fit_to_csv(&result, path)?;
        output::print_written("fit curves", &path.display().to_string());
    }
    if let Some(path) = &args.params_csv {
        export::parameters_to_csv(&result, path)?;
        output::print_written("parameters", &path.display().to_string());
    }
    if let Some(path) = &args.plot {
        export::plot_fit(&result, path, &ds.name, args.plot_width, args.plot_height)?;
        output::print_written("figure", &path.display().to_string());
    }

    output::print_done(&format!("'{}' fitted", ds.name));
    save_dataset(&ds, &args.input)
}
