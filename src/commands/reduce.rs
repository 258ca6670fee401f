//! # reduce 子命令实现
//!
//! ## 依赖关系
//! - 使用 `cli/reduce.rs` 定义的 ReduceArgs
//! - 使用 `reduction/`, `export/csv.rs`

use crate::cli::input::{parse_optional_window, parse_window};
use crate::cli::reduce::{BackgroundArg, NormalizeArg, ReduceArgs};
use crate::commands::{load_dataset, save_dataset};
use thorondor::export;
use thorondor::reduction::{
    BackgroundModel, BackgroundSpec, ConstantLevel, DeglitchSpec, EdgeJumpSpec, EdgeLine,
    NormalizationMode, NormalizationSpec, ReductionSpec,
};
use thorondor::utils::output;
use thorondor::{Result, ThorondorError};

/// 解析 "start:end" 下标区间
fn parse_glitch(text: &str) -> Result<DeglitchSpec> {
    let bad = || ThorondorError::InvalidRange(format!("{} (expected 'start:end')", text));
    let (a, b) = text.split_once(':').ok_or_else(bad)?;
    let start: usize = a.trim().parse().map_err(|_| bad())?;
    let end: usize = b.trim().parse().map_err(|_| bad())?;
    Ok(DeglitchSpec::new(start, end))
}

/// 解析前后沿曲线："victoreen" 或多项式阶数
fn parse_edge_line(text: &str) -> Result<EdgeLine> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("victoreen") {
        return Ok(EdgeLine::Victoreen);
    }
    text.parse()
        .map(|degree| EdgeLine::Polynomial { degree })
        .map_err(|_| {
            ThorondorError::InvalidArgument(format!(
                "edge line must be a polynomial degree or 'victoreen', got '{}'",
                text
            ))
        })
}

fn edge_jump_spec(args: &ReduceArgs) -> Result<EdgeJumpSpec> {
    let (pre, post) = match (&args.pre_edge, &args.post_edge) {
        (Some(pre), Some(post)) => (parse_window(pre)?, parse_window(post)?),
        _ => {
            return Err(ThorondorError::InvalidArgument(
                "--normalize edge-jump needs --pre-edge lo:hi and --post-edge lo:hi".to_string(),
            ))
        }
    };
    Ok(EdgeJumpSpec {
        e0: args.e0,
        pre_edge: pre,
        post_edge: post,
        pre_line: parse_edge_line(&args.pre_line)?,
        post_line: parse_edge_line(&args.post_line)?,
    })
}

/// 由命令行参数构造约化设置
pub fn build_spec(args: &ReduceArgs) -> Result<ReductionSpec> {
    let deglitch = args
        .deglitch
        .iter()
        .map(|g| parse_glitch(g))
        .collect::<Result<Vec<_>>>()?;

    let model = match args.background {
        BackgroundArg::None => None,
        BackgroundArg::Minimum => Some(BackgroundModel::Constant {
            level: ConstantLevel::Minimum,
        }),
        BackgroundArg::Edges => Some(BackgroundModel::Constant {
            level: ConstantLevel::Edges,
        }),
        BackgroundArg::Linear => Some(BackgroundModel::Linear),
        BackgroundArg::Shirley => Some(BackgroundModel::Shirley {
            tolerance: args.shirley_tol,
            max_iterations: args.shirley_iter,
        }),
        BackgroundArg::Als => Some(BackgroundModel::Als {
            lambda: args.als_lambda,
            p: args.als_p,
            iterations: 10,
        }),
        BackgroundArg::Chebyshev => Some(BackgroundModel::Chebyshev {
            degree: args.cheb_degree,
            power: args.cheb_power,
        }),
        BackgroundArg::Anchors => Some(BackgroundModel::Anchors {
            energies: args.anchors.clone(),
        }),
    };
    let background = model.map(|model| -> Result<BackgroundSpec> {
        Ok(BackgroundSpec {
            model,
            window: parse_optional_window(args.bg_window.as_deref())?,
            edge_points: args.edge_points,
        })
    });

    if args.normalize == NormalizeArg::EdgeJump {
        return Ok(ReductionSpec {
            deglitch,
            background: background.transpose()?,
            normalization: None,
            edge_jump: Some(edge_jump_spec(args)?),
        });
    }

    let mode = match args.normalize {
        NormalizeArg::None | NormalizeArg::EdgeJump => None,
        NormalizeArg::Mean => Some(NormalizationMode::Mean),
        NormalizeArg::Maximum => Some(NormalizationMode::Maximum),
        NormalizeArg::Area => Some(NormalizationMode::Area),
    };
    let normalization = match (mode, &args.norm_window) {
        (None, _) => None,
        (Some(mode), Some(window)) => Some(NormalizationSpec {
            mode,
            window: parse_window(window)?,
        }),
        (Some(_), None) => {
            return Err(ThorondorError::InvalidArgument(
                "--normalize needs --norm-window lo:hi".to_string(),
            ))
        }
    };

    Ok(ReductionSpec {
        deglitch,
        background: background.transpose()?,
        normalization,
        edge_jump: None,
    })
}

/// 执行约化
pub fn execute(args: ReduceArgs) -> Result<()> {
    output::print_header("Data Reduction");

    let spec = build_spec(&args)?;
    let mut ds = load_dataset(&args.input)?;
    ds.reduce(&spec)?;

    if let Some((_, record)) = ds.reduction() {
        if record.glitches_removed > 0 {
            output::print_kv("glitches", &record.glitches_removed.to_string());
        }
        if let Some(bg) = &spec.background {
            output::print_kv("background", &bg.model.to_string());
        }
        if let Some(e0) = record.e0 {
            output::print_kv("E0", &format!("{:.4}", e0));
        }
        if let Some(factor) = record.normalization_factor {
            let label = if record.e0.is_some() { "edge jump" } else { "norm. factor" };
            output::print_kv(label, &format!("{:.6e}", factor));
        }
    }
    output::print_success(&format!("'{}' reduced", ds.name));

    if let (Some(path), Some(reduced), Some((_, record))) =
        (&args.output, ds.reduced(), ds.reduction())
    {
        export::table_to_csv(reduced, record.background.as_deref(), path)?;
        output::print_written("reduced table", &path.display().to_string());
    }
    save_dataset(&ds, &args.input)
}
