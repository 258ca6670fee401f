//! # 参数表达式
//!
//! 参数之间的约束（例如 `P1_sigma = P0_sigma`、`P1_center = P0_center + 1.2`）
//! 用一棵小表达式树表示，通过解释执行求值，不执行任何动态代码。
//!
//! ## 语法
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | primary
//! primary := number | identifier | '(' expr ')'
//! ```
//!
//! ## 依赖关系
//! - 被 `fitting/params.rs`, `fitting/model.rs` 使用
//! - 文本形式用于 CLI 参数和 JSON 配置（serde 序列化为字符串）

use crate::error::{Result, ThorondorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }

    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

/// 参数表达式树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Expr {
    Const(f64),
    Param(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// 表达式引用的参数名（按出现顺序，可能重复）
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Const(_) => {}
            Expr::Param(name) => out.push(name),
            Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
        }
    }

    /// 用名字查找函数求值；未知参数返回 None
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        match self {
            Expr::Const(v) => Some(*v),
            Expr::Param(name) => lookup(name),
            Expr::Neg(inner) => inner.eval(lookup).map(|v| -v),
            Expr::Binary { op, lhs, rhs } => Some(op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?)),
        }
    }

    /// 把参数名绑定为下标，得到可在拟合内循环中快速求值的形式
    pub(crate) fn bind(&self, index_of: &dyn Fn(&str) -> Option<usize>) -> Result<BoundExpr> {
        Ok(match self {
            Expr::Const(v) => BoundExpr::Const(*v),
            Expr::Param(name) => BoundExpr::Param(index_of(name).ok_or_else(|| {
                ThorondorError::InvalidModelError(format!(
                    "expression references unknown parameter '{}'",
                    name
                ))
            })?),
            Expr::Neg(inner) => BoundExpr::Neg(Box::new(inner.bind(index_of)?)),
            Expr::Binary { op, lhs, rhs } => BoundExpr::Binary {
                op: *op,
                lhs: Box::new(lhs.bind(index_of)?),
                rhs: Box::new(rhs.bind(index_of)?),
            },
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Neg(_) => 3,
            _ => 4,
        }
    }
}

/// 已绑定下标的表达式
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BoundExpr {
    Const(f64),
    Param(usize),
    Neg(Box<BoundExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<BoundExpr>,
        rhs: Box<BoundExpr>,
    },
}

impl BoundExpr {
    pub(crate) fn eval(&self, values: &[f64]) -> f64 {
        match self {
            BoundExpr::Const(v) => *v,
            BoundExpr::Param(i) => values[*i],
            BoundExpr::Neg(inner) => -inner.eval(values),
            BoundExpr::Binary { op, lhs, rhs } => op.apply(lhs.eval(values), rhs.eval(values)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Param(name) => write!(f, "{}", name),
            Expr::Neg(inner) => {
                if inner.precedence() < 3 {
                    write!(f, "-({})", inner)
                } else {
                    write!(f, "-{}", inner)
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                if lhs.precedence() < p {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op.symbol())?;
                // 右结合位置上同级运算需要括号：a - (b - c)
                if rhs.precedence() <= p {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

impl From<Expr> for String {
    fn from(expr: Expr) -> Self {
        expr.to_string()
    }
}

impl TryFrom<String> for Expr {
    type Error = ThorondorError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl FromStr for Expr {
    type Err = ThorondorError;

    fn from_str(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source: text,
        };
        let expr = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }
}

// ─────────────────────────────────────────────────────────────
// 词法与语法分析
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // 科学计数法：1.5e-3
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal.parse::<f64>().map_err(|_| parse_error(text, "bad number"))?;
            tokens.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if matches!(c, '+' | '-' | '*' | '/') {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else {
            return Err(parse_error(text, &format!("unexpected character '{}'", c)));
        }
    }

    if tokens.is_empty() {
        return Err(parse_error(text, "empty expression"));
    }
    Ok(tokens)
}

fn parse_error(source: &str, reason: &str) -> ThorondorError {
    ThorondorError::ParseError {
        format: "parameter expression".to_string(),
        path: source.to_string(),
        reason: reason.to_string(),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> ThorondorError {
        parse_error(self.source, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Number(v) => Ok(Expr::Const(v)),
            Token::Ident(name) => Ok(Expr::Param(name)),
            Token::LParen => {
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("missing ')'")),
                }
            }
            _ => Err(self.error("expected a number, a parameter name or '('")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<f64> {
        match name {
            "P0_sigma" => Some(0.5),
            "P0_center" => Some(284.6),
            _ => None,
        }
    }

    #[test]
    fn test_parse_and_eval() {
        let expr: Expr = "2 * P0_sigma + 0.1".parse().unwrap();
        assert!((expr.eval(&lookup).unwrap() - 1.1).abs() < 1e-12);
        assert_eq!(expr.references(), vec!["P0_sigma"]);

        let expr: Expr = "-(P0_center - 1.5e1) / 2".parse().unwrap();
        assert!((expr.eval(&lookup).unwrap() + 134.8).abs() < 1e-9);
    }

    #[test]
    fn test_operator_precedence() {
        let none = |_: &str| -> Option<f64> { None };
        let expr: Expr = "1 + 2 * 3 - 4 / 2".parse().unwrap();
        assert_eq!(expr.eval(&none), Some(5.0));
        let expr: Expr = "10 - (4 - 1)".parse().unwrap();
        assert_eq!(expr.eval(&none), Some(7.0));
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["P0_sigma", "10 - (4 - 1)", "(a + b) * c", "-(a + 2) / 3", "a / (b * c)"] {
            let expr: Expr = text.parse().unwrap();
            let reparsed: Expr = expr.to_string().parse().unwrap();
            assert_eq!(expr, reparsed, "{}", text);
        }
    }

    #[test]
    fn test_unknown_reference_evaluates_to_none() {
        let expr: Expr = "P9_sigma * 2".parse().unwrap();
        assert_eq!(expr.eval(&lookup), None);
    }

    #[test]
    fn test_rejects_malformed_text() {
        for text in ["", "2 *", "(P0_sigma", "P0_sigma $ 2", "1 2"] {
            assert!(text.parse::<Expr>().is_err(), "{}", text);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let expr: Expr = "P0_sigma * 2".parse().unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, "\"P0_sigma * 2\"");
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }
}
