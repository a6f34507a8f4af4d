// ABOUTME: Typed syntax tree for contract expressions
// ABOUTME: Path references, literals, comparisons, and boolean connectives

use serde::Serialize;
use std::fmt;

use crate::parser::ConfigValue;

/// A dotted reference `<task label>.<config key>[.<nested key>...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPath {
    pub task: String,
    pub key: Vec<String>,
}

impl ConfigPath {
    pub fn new(task: impl Into<String>, key: Vec<String>) -> Self {
        Self {
            task: task.into(),
            key,
        }
    }

    /// The key part joined back with dots.
    pub fn key_string(&self) -> String {
        self.key.join(".")
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task, self.key_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Path(ConfigPath),
    Literal(ConfigValue),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Every config path referenced by the expression, left to right.
    pub fn paths(&self) -> Vec<&ConfigPath> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a ConfigPath>) {
        match self {
            Expr::Path(path) => paths.push(path),
            Expr::Literal(_) => {}
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
            Expr::Not(inner) => inner.collect_paths(paths),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(path) => write!(f, "{}", path),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expr::Not(inner) => write!(f, "not ({})", inner),
            Expr::And(left, right) => write!(f, "({}) and ({})", left, right),
            Expr::Or(left, right) => write!(f, "({}) or ({})", left, right),
        }
    }
}
