//! # 拟合图生成
//!
//! 使用 `plotters` 绘制拟合结果：上方为数据、最优拟合曲线和各组分，
//! 下方为残差。支持 PNG 和 SVG 输出。
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs`, `batch/runner.rs` 调用
//! - 使用 `fitting/result.rs` 的 FitResult
//! - 使用 `plotters` 渲染图表

use crate::error::{Result, ThorondorError};
use crate::fitting::FitResult;

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// 图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    /// 根据扩展名推断，默认 PNG
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => ImageFormat::Svg,
            _ => ImageFormat::Png,
        }
    }
}

fn plot_err<E: std::fmt::Debug>(e: E) -> ThorondorError {
    ThorondorError::PlotError(format!("{:?}", e))
}

/// 组分配色
const PALETTE: [RGBColor; 6] = [
    RGBColor(230, 97, 1),
    RGBColor(94, 60, 153),
    RGBColor(27, 158, 119),
    RGBColor(217, 95, 2),
    RGBColor(117, 112, 179),
    RGBColor(102, 166, 30),
];

/// 生成拟合图
pub fn plot_fit(
    result: &FitResult,
    output_path: &Path,
    title: &str,
    width: u32,
    height: u32,
) -> Result<()> {
    match ImageFormat::from_path(output_path) {
        ImageFormat::Svg => {
            let root = SVGBackend::new(output_path, (width, height)).into_drawing_area();
            draw_fit(&root, result, title)?;
            root.present().map_err(plot_err)?;
        }
        ImageFormat::Png => {
            let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
            draw_fit(&root, result, title)?;
            root.present().map_err(plot_err)?;
        }
    }
    Ok(())
}

fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-12);
    (lo - pad, hi + pad)
}

fn draw_fit<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    result: &FitResult,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_err)?;

    let x = result.x();
    let (x_lo, x_hi) = span(x.iter().cloned());
    let (y_lo, y_hi) = span(
        result
            .data()
            .iter()
            .chain(result.best_fit())
            .chain(result.components().iter().flat_map(|(_, c)| c.iter()))
            .cloned(),
    );
    let (r_lo, r_hi) = span(result.residuals().iter().cloned());

    let height = root.dim_in_pixel().1;
    let (upper, lower) = root.split_vertically(height * 3 / 4);

    let mut chart = ChartBuilder::on(&upper)
        .caption(title, ("sans-serif", 24).into_font())
        .margin(20)
        .x_label_area_size(0)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .y_desc("Intensity (a.u.)")
        .x_label_style(("sans-serif", 14))
        .y_label_style(("sans-serif", 14))
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(plot_err)?;

    // 数据点
    chart
        .draw_series(
            x.iter()
                .zip(result.data())
                .map(|(&xi, &yi)| Circle::new((xi, yi), 2, BLACK.filled())),
        )
        .map_err(plot_err)?
        .label("data")
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));

    // 各组分
    for (i, (prefix, curve)) in result.components().iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        chart
            .draw_series(LineSeries::new(
                x.iter().cloned().zip(curve.iter().cloned()),
                color.stroke_width(1),
            ))
            .map_err(plot_err)?
            .label(prefix.trim_end_matches('_'))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    // 最优拟合
    let fit_color = RGBColor(0, 102, 204);
    chart
        .draw_series(LineSeries::new(
            x.iter().cloned().zip(result.best_fit().iter().cloned()),
            fit_color.stroke_width(2),
        ))
        .map_err(plot_err)?
        .label("best fit")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], fit_color.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 13))
        .draw()
        .map_err(plot_err)?;

    // 残差
    let mut residual_chart = ChartBuilder::on(&lower)
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, r_lo..r_hi)
        .map_err(plot_err)?;

    residual_chart
        .configure_mesh()
        .x_desc("Energy (eV)")
        .y_desc("Residual")
        .y_labels(4)
        .x_label_style(("sans-serif", 14))
        .y_label_style(("sans-serif", 12))
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(plot_err)?;

    residual_chart
        .draw_series(LineSeries::new(
            x.iter().cloned().zip(result.residuals().iter().cloned()),
            RED.stroke_width(1),
        ))
        .map_err(plot_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_path(Path::new("fit.svg")), ImageFormat::Svg);
        assert_eq!(ImageFormat::from_path(Path::new("fit.SVG")), ImageFormat::Svg);
        assert_eq!(ImageFormat::from_path(Path::new("fit.png")), ImageFormat::Png);
        assert_eq!(ImageFormat::from_path(Path::new("fit")), ImageFormat::Png);
    }

    #[test]
    fn test_span_pads_and_handles_empty() {
        let (lo, hi) = span([1.0, 3.0].into_iter());
        assert!(lo < 1.0 && hi > 3.0);
        assert_eq!(span(std::iter::empty()), (0.0, 1.0));
    }
}
