//! # 拟合报告
//!
//! 用 `tabled` 打印参数表、统计量、强相关参数对、置信区间与 LCF 权重。
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs`, `commands/lcf.rs`, `commands/show.rs` 使用
//! - 使用 `fitting/result.rs`, `fitting/confidence.rs`, `fitting/lcf.rs`

use tabled::{Table, Tabled};
use thorondor::fitting::{ConfidenceInterval, FitResult, LcfResult};
use thorondor::utils::output;

/// 报告中列出的相关系数阈值
const CORRELATION_THRESHOLD: f64 = 0.5;

#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Std. error")]
    stderr: String,
    #[tabled(rename = "Initial")]
    init: String,
    #[tabled(rename = "Bounds")]
    bounds: String,
    #[tabled(rename = "Constraint")]
    constraint: String,
}

#[derive(Tabled)]
struct IntervalRow {
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Lower")]
    lower: String,
    #[tabled(rename = "Best")]
    best: String,
    #[tabled(rename = "Upper")]
    upper: String,
}

#[derive(Tabled)]
struct WeightRow {
    #[tabled(rename = "Reference")]
    name: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Std. error")]
    stderr: String,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Statistic")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6e}", v)).unwrap_or_else(|| "-".to_string())
}

/// 打印一次拟合的完整报告
pub fn print_fit_report(title: &str, result: &FitResult) {
    output::print_header(title);

    let rows: Vec<ParameterRow> = result
        .parameters()
        .iter()
        .map(|p| {
            let bounds = match (p.min, p.max) {
                (None, None) => "-".to_string(),
                (min, max) => format!(
                    "[{}, {}]",
                    min.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-inf".to_string()),
                    max.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "inf".to_string())
                ),
            };
            let constraint = match (&p.expr, p.vary) {
                (Some(expr), _) => format!("= {}", expr),
                (None, false) => "fixed".to_string(),
                (None, true) => String::new(),
            };
            ParameterRow {
                name: p.name.clone(),
                value: format!("{:.6}", p.value),
                stderr: p
                    .stderr
                    .map(|e| format!("{:.3e}", e))
                    .unwrap_or_else(|| "-".to_string()),
                init: format!("{:.6}", p.init_value),
                bounds,
                constraint,
            }
        })
        .collect();
    println!("{}", Table::new(&rows));

    let s = result.statistics();
    let stats = vec![
        StatRow {
            name: "method",
            value: result.method().to_string(),
        },
        StatRow {
            name: "data points",
            value: s.ndata.to_string(),
        },
        StatRow {
            name: "variables",
            value: s.nvarys.to_string(),
        },
        StatRow {
            name: "iterations",
            value: format!("{} ({} evaluations)", s.iterations, s.evaluations),
        },
        StatRow {
            name: "chi-square",
            value: format!("{:.6e}", s.chi_square),
        },
        StatRow {
            name: "reduced chi-square",
            value: fmt_opt(s.reduced_chi_square),
        },
        StatRow {
            name: "Pearson chi-square",
            value: fmt_opt(s.pearson_chi_square),
        },
        StatRow {
            name: "R-factor (%)",
            value: fmt_opt(s.r_factor),
        },
        StatRow {
            name: "AIC",
            value: format!("{:.3}", s.aic),
        },
        StatRow {
            name: "BIC",
            value: format!("{:.3}", s.bic),
        },
    ];
    println!("{}", Table::new(&stats));

    if !result.has_uncertainties() {
        output::print_warning("Standard errors could not be estimated for this fit");
        return;
    }

    let mut strong: Vec<(String, String, f64)> = result
        .correlations()
        .iter()
        .flat_map(|(a, row)| {
            row.iter()
                .filter(move |(b, _)| a < *b)
                .map(move |(b, &c)| (a.clone(), b.clone(), c))
        })
        .filter(|(_, _, c)| c.abs() >= CORRELATION_THRESHOLD)
        .collect();
    strong.sort_by(|x, y| y.2.abs().total_cmp(&x.2.abs()));
    if !strong.is_empty() {
        println!("\n  Correlations (|C| >= {}):", CORRELATION_THRESHOLD);
        for (a, b, c) in strong {
            output::print_kv(&format!("{} / {}", a, b), &format!("{:+.3}", c));
        }
    }
}

/// 打印置信区间，端点以相对最优值的偏移给出
pub fn print_confidence_report(intervals: &[ConfidenceInterval]) {
    output::print_header("Confidence intervals (F-test)");
    let offset = |v: Option<f64>, best: f64| {
        v.map(|v| format!("{:+.4e}", v - best))
            .unwrap_or_else(|| "-".to_string())
    };
    let rows: Vec<IntervalRow> = intervals
        .iter()
        .flat_map(|ci| {
            ci.levels.iter().map(move |level| IntervalRow {
                name: ci.name.clone(),
                level: format!("{}σ ({:.2}%)", level.sigma, 100.0 * level.probability),
                lower: offset(level.lower, ci.best),
                best: format!("{:.6}", ci.best),
                upper: offset(level.upper, ci.best),
            })
        })
        .collect();
    println!("{}", Table::new(&rows));
}

/// 打印线性组合拟合的权重与 R 因子
pub fn print_lcf_report(title: &str, result: &LcfResult) {
    output::print_header(title);
    let rows: Vec<WeightRow> = result
        .names
        .iter()
        .zip(&result.weights)
        .zip(&result.stderr)
        .map(|((name, w), e)| WeightRow {
            name: name.clone(),
            weight: format!("{:.4}", w),
            stderr: e.map(|e| format!("{:.3e}", e)).unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", Table::new(&rows));
    output::print_kv("sum of weights", &format!("{:.4}", result.total_weight()));
    output::print_kv("R-factor (%)", &fmt_opt(result.r_factor));
    output::print_kv("chi-square", &format!("{:.6e}", result.chi_square));
    if result.stderr.iter().all(Option::is_none) {
        output::print_warning("Weight uncertainties could not be estimated");
    }
}
