//! # CSV 导出
//!
//! ## 支持内容
//! - 谱表：x, y（可选 background）
//! - 拟合曲线：x, data, best_fit, residuals, 各组分
//! - 线性组合拟合：x, data, fit, 各参考谱的加权贡献
//! - 参数表：name, value, stderr, init_value, min, max, vary, expr
//! - 批量汇总：每个数据集一行统计量
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/runner.rs` 调用
//! - 使用 `csv` 库写入 CSV 文件

use crate::error::{Result, ThorondorError};
use crate::fitting::{FitResult, LcfResult};
use crate::models::spectrum::SpectrumTable;

use std::path::Path;

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:e}", v)).unwrap_or_default()
}

fn finish(mut wtr: csv::Writer<std::fs::File>, path: &Path) -> Result<()> {
    wtr.flush().map_err(|e| ThorondorError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 导出谱表（可附带背景曲线）
pub fn table_to_csv(table: &SpectrumTable, background: Option<&[f64]>, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["x", "y"];
    if background.is_some() {
        header.push("background");
    }
    wtr.write_record(&header)?;

    for i in 0..table.len() {
        let mut record = vec![table.x()[i].to_string(), table.y()[i].to_string()];
        if let Some(bg) = background {
            record.push(bg.get(i).map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }

    finish(wtr, path)
}

/// 导出拟合曲线与各组分
pub fn fit_to_csv(result: &FitResult, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header: Vec<String> = ["x", "data", "best_fit", "residuals"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(
        result
            .components()
            .iter()
            .map(|(prefix, _)| prefix.trim_end_matches('_').to_string()),
    );
    wtr.write_record(&header)?;

    for i in 0..result.x().len() {
        let mut record = vec![
            result.x()[i].to_string(),
            result.data()[i].to_string(),
            result.best_fit()[i].to_string(),
            result.residuals()[i].to_string(),
        ];
        record.extend(result.components().iter().map(|(_, c)| c[i].to_string()));
        wtr.write_record(&record)?;
    }

    finish(wtr, path)
}

/// 导出线性组合拟合曲线
pub fn lcf_to_csv(result: &LcfResult, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header: Vec<String> = ["x", "data", "fit"].iter().map(|s| s.to_string()).collect();
    header.extend(result.names.iter().cloned());
    wtr.write_record(&header)?;

    for i in 0..result.x.len() {
        let mut record = vec![
            result.x[i].to_string(),
            result.data[i].to_string(),
            result.fit[i].to_string(),
        ];
        record.extend(result.components.iter().map(|c| c[i].to_string()));
        wtr.write_record(&record)?;
    }

    finish(wtr, path)
}

/// 导出参数表
pub fn parameters_to_csv(result: &FitResult, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "name",
        "value",
        "stderr",
        "init_value",
        "min",
        "max",
        "vary",
        "expr",
    ])?;

    for p in result.parameters() {
        wtr.write_record(&[
            p.name.clone(),
            format!("{:e}", p.value),
            opt(p.stderr),
            format!("{:e}", p.init_value),
            opt(p.min),
            opt(p.max),
            p.vary.to_string(),
            p.expr.as_ref().map(|e| e.to_string()).unwrap_or_default(),
        ])?;
    }

    finish(wtr, path)
}

/// 批量汇总：每行一个数据集的最新拟合
pub fn summary_to_csv(rows: &[(String, &FitResult)], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "dataset",
        "method",
        "ndata",
        "nvarys",
        "chi_square",
        "reduced_chi_square",
        "r_factor",
        "aic",
        "bic",
    ])?;

    for (name, result) in rows {
        let s = result.statistics();
        wtr.write_record(&[
            name.clone(),
            result.method().to_string(),
            s.ndata.to_string(),
            s.nvarys.to_string(),
            format!("{:e}", s.chi_square),
            opt(s.reduced_chi_square),
            opt(s.r_factor),
            format!("{:.4}", s.aic),
            format!("{:.4}", s.bic),
        ])?;
    }

    finish(wtr, path)
}
