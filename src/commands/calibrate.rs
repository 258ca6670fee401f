//! # calibrate 子命令实现
//!
//! ## 依赖关系
//! - 使用 `cli/calibrate.rs` 定义的 CalibrateArgs
//! - 使用 `calibration/`, `export/csv.rs`

use crate::cli::calibrate::{CalibrateArgs, DirectionArg};
use crate::cli::input::parse_window;
use crate::commands::{load_dataset, save_dataset};
use thorondor::calibration::{CalibrationSpec, EdgeDirection, Reference};
use thorondor::export;
use thorondor::utils::output;
use thorondor::{Result, ThorondorError};

/// 由命令行参数构造标定设置
fn build_spec(args: &CalibrateArgs) -> Result<CalibrationSpec> {
    let reference = match (args.offset, &args.edge, args.target) {
        (Some(offset), None, _) => Reference::Offset(offset),
        (None, Some(window), Some(target)) => Reference::Edge {
            window: parse_window(window)?,
            target,
            direction: match args.direction {
                DirectionArg::Falling => EdgeDirection::Falling,
                DirectionArg::Rising => EdgeDirection::Rising,
            },
            smoothing: args.smoothing,
        },
        _ => {
            return Err(ThorondorError::InvalidArgument(
                "give either --offset or --edge with --target".to_string(),
            ))
        }
    };
    Ok(CalibrationSpec {
        reference,
        scale: args.scale_factor,
    })
}

/// 执行标定
pub fn execute(args: CalibrateArgs) -> Result<()> {
    output::print_header("Energy Calibration");

    let spec = build_spec(&args)?;
    let mut ds = load_dataset(&args.input)?;
    let applied = ds.calibrate(&spec)?;

    output::print_kv("detected", &format!("{:.4}", applied.detected));
    output::print_kv("target", &format!("{:.4}", applied.target));
    output::print_kv("offset", &format!("{:.4}", applied.offset));
    output::print_kv("scale", &format!("{}", applied.scale));
    output::print_success(&format!("'{}' calibrated", ds.name));

    if let (Some(path), Some(shifted)) = (&args.output, ds.shifted()) {
        export::table_to_csv(shifted, None, path)?;
        output::print_written("shifted table", &path.display().to_string());
    }
    save_dataset(&ds, &args.input)
}
