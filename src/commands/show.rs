//! # show 子命令实现
//!
//! 恢复保存的数据集并打印阶段、标定、约化、元数据、注释、LCF 与拟合结果。
//!
//! ## 依赖关系
//! - 使用 `cli/show.rs` 定义的 ShowArgs
//! - 使用 `models/dataset.rs`, `commands/report.rs`

use crate::cli::show::ShowArgs;
use crate::commands::report::{print_fit_report, print_lcf_report};
use thorondor::calibration::Reference;
use thorondor::utils::output;
use thorondor::{Dataset, Result, ThorondorError};

/// 执行查看
pub fn execute(args: ShowArgs) -> Result<()> {
    let mut ds = Dataset::load(&args.dataset)?;

    let mut changed = false;
    for item in &args.meta {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            ThorondorError::InvalidArgument(format!("--meta expects KEY=VALUE, got '{}'", item))
        })?;
        ds.metadata.set(key.trim(), value.trim());
        changed = true;
    }
    if let Some(text) = &args.comment {
        ds.comment(text, args.erase_comments);
        changed = true;
    }
    if changed {
        ds.save(&args.dataset)?;
        output::print_written("dataset", &args.dataset.display().to_string());
    }

    output::print_header(&format!("Dataset '{}'", ds.name));
    output::print_stage(&ds.name, &ds.stage().to_string());
    if let Some(source) = &ds.source {
        output::print_kv("source", source);
    }
    let (lo, hi) = ds.raw().x_range();
    output::print_kv(
        "raw",
        &format!("{} points, {:.3} .. {:.3} ({})", ds.raw().len(), lo, hi, ds.raw().scale),
    );
    if let Some(rows) = ds.raw().iterations() {
        output::print_kv("scans", &rows.len().to_string());
    }

    if let Some((spec, applied)) = ds.calibration() {
        let reference = match &spec.reference {
            Reference::Offset(v) => format!("offset {}", v),
            Reference::Edge {
                window, direction, ..
            } => format!("{:?} edge in [{}, {}]", direction, window.0, window.1),
        };
        output::print_kv("calibration", &reference);
        output::print_kv(
            "",
            &format!(
                "{:.4} -> {:.4} (offset {:.4}, scale {})",
                applied.detected, applied.target, applied.offset, applied.scale
            ),
        );
    }

    if let Some((spec, record)) = ds.reduction() {
        if let Some(bg) = &spec.background {
            output::print_kv("background", &bg.model.to_string());
        }
        if let (Some(norm), Some(factor)) = (&spec.normalization, record.normalization_factor) {
            output::print_kv(
                "normalization",
                &format!(
                    "{:?} over [{}, {}], factor {:.6e}",
                    norm.mode, norm.window.0, norm.window.1, factor
                ),
            );
        }
        if let (Some(jump), Some(e0), Some(factor)) =
            (&spec.edge_jump, record.e0, record.normalization_factor)
        {
            output::print_kv(
                "edge jump",
                &format!(
                    "{:.6e} at E0 {:.4} (pre {}, post {})",
                    factor, e0, jump.pre_line, jump.post_line
                ),
            );
        }
        if record.glitches_removed > 0 {
            output::print_kv("glitches", &record.glitches_removed.to_string());
        }
    }

    if !ds.metadata.is_empty() {
        output::print_separator();
        for (key, value) in ds.metadata.entries() {
            output::print_kv(key, value);
        }
    }
    if !ds.comment_text().is_empty() {
        output::print_separator();
        for line in ds.comment_text().lines() {
            println!("  {}", line);
        }
    }

    if let Some(lcf) = ds.lcf_result() {
        print_lcf_report("Linear combination fit", lcf);
    }

    let fits = ds.fits();
    if fits.is_empty() {
        output::print_info("No fits stored");
        return Ok(());
    }
    if ds.current_fit().is_none() {
        output::print_warning("Stored fits predate the current reduced table");
    }
    let start = if args.all { 0 } else { fits.len() - 1 };
    for (i, fit) in fits.iter().enumerate().skip(start) {
        print_fit_report(&format!("Fit #{} of {}", i + 1, fits.len()), fit);
    }
    Ok(())
}
