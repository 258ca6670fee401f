//! # 美化输出工具
//!
//! 统一的终端输出样式：状态前缀、写出文件、阶段与键值对。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块和 `main.rs` 使用
//! - 使用 `colored` crate

use colored::Colorize;

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 打印跳过消息
pub fn print_skip(msg: &str) {
    println!("{} {}", "[SKIP]".dimmed(), msg);
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印写出的文件
pub fn print_written(what: &str, path: &str) {
    println!("{} {} {} {}", "[OK]".green().bold(), what.dimmed(), "->".cyan(), path);
}

/// 打印阶段变化
pub fn print_stage(name: &str, stage: &str) {
    println!("{} {} {}", "[*]".blue().bold(), name, format!("[{}]", stage).magenta());
}

/// 打印键值对（空键用于续行）
pub fn print_kv(key: &str, value: &str) {
    let key = if key.is_empty() {
        String::new()
    } else {
        format!("{}:", key)
    };
    println!("  {:<16} {}", key.dimmed(), value);
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

/// 打印分隔线
pub fn print_separator() {
    println!("{}", "─".repeat(60).dimmed());
}
