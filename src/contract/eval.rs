// ABOUTME: Evaluation of parsed contracts against a read-only snapshot of resolved task config
// ABOUTME: Provides the ContractValidator used by pre-flight to halt on violated invariants

use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

use super::ast::{CompareOp, ConfigPath, Expr};
use super::error::{ContractError, Result};
use super::parser;
use crate::parser::{ConfigMap, ConfigValue, ContractEntry, ValidationError};

/// Resolved configuration of every task, keyed by task label.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigSnapshot {
    tasks: IndexMap<String, ConfigMap>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, config: ConfigMap) {
        self.tasks.insert(label.into(), config);
    }

    pub fn task(&self, label: &str) -> Option<&ConfigMap> {
        self.tasks.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn lookup(&self, path: &ConfigPath) -> Result<&ConfigValue> {
        let config = self
            .tasks
            .get(&path.task)
            .ok_or_else(|| ContractError::UnknownTask {
                task: path.task.clone(),
            })?;

        let segments: Vec<&str> = path.key.iter().map(String::as_str).collect();
        crate::parser::value::lookup_segments(config, &segments).ok_or_else(|| {
            ContractError::UnknownKey {
                task: path.task.clone(),
                key: path.key_string(),
            }
        })
    }
}

impl FromIterator<(String, ConfigMap)> for ConfigSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ConfigMap)>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

/// Evaluate an expression to a value. Comparisons and connectives yield booleans.
pub fn evaluate(expr: &Expr, snapshot: &ConfigSnapshot) -> Result<ConfigValue> {
    match expr {
        Expr::Path(path) => snapshot.lookup(path).cloned(),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Not(inner) => Ok(ConfigValue::Bool(
            !evaluate(inner, snapshot)?.is_truthy(),
        )),
        Expr::And(left, right) => {
            if !evaluate(left, snapshot)?.is_truthy() {
                return Ok(ConfigValue::Bool(false));
            }
            Ok(ConfigValue::Bool(evaluate(right, snapshot)?.is_truthy()))
        }
        Expr::Or(left, right) => {
            if evaluate(left, snapshot)?.is_truthy() {
                return Ok(ConfigValue::Bool(true));
            }
            Ok(ConfigValue::Bool(evaluate(right, snapshot)?.is_truthy()))
        }
        Expr::Compare { left, op, right } => {
            let left = evaluate(left, snapshot)?;
            let right = evaluate(right, snapshot)?;
            compare(&left, *op, &right).map(ConfigValue::Bool)
        }
    }
}

fn mismatch(op: CompareOp, left: &ConfigValue, right: &ConfigValue) -> ContractError {
    ContractError::TypeMismatch {
        op: op.symbol().to_string(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

fn values_equal(left: &ConfigValue, right: &ConfigValue) -> bool {
    match (left, right) {
        (ConfigValue::Int(_) | ConfigValue::Float(_), ConfigValue::Int(_) | ConfigValue::Float(_)) => {
            match (left, right) {
                (ConfigValue::Int(a), ConfigValue::Int(b)) => a == b,
                _ => left.as_f64() == right.as_f64(),
            }
        }
        (ConfigValue::List(a), ConfigValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (ConfigValue::Map(a), ConfigValue::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn ordering(left: &ConfigValue, op: CompareOp, right: &ConfigValue) -> Result<Ordering> {
    match (left, right) {
        (ConfigValue::Int(a), ConfigValue::Int(b)) => Ok(a.cmp(b)),
        (ConfigValue::String(a), ConfigValue::String(b)) => Ok(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| mismatch(op, left, right)),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

fn contains(container: &ConfigValue, item: &ConfigValue, op: CompareOp) -> Result<bool> {
    match (container, item) {
        (ConfigValue::List(items), _) => Ok(items.iter().any(|x| values_equal(x, item))),
        (ConfigValue::String(haystack), ConfigValue::String(needle)) => {
            Ok(haystack.contains(needle.as_str()))
        }
        (ConfigValue::Map(map), ConfigValue::String(key)) => Ok(map.contains_key(key)),
        _ => Err(mismatch(op, item, container)),
    }
}

fn compare(left: &ConfigValue, op: CompareOp, right: &ConfigValue) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::Lt => Ok(ordering(left, op, right)? == Ordering::Less),
        CompareOp::Le => Ok(ordering(left, op, right)? != Ordering::Greater),
        CompareOp::Gt => Ok(ordering(left, op, right)? == Ordering::Greater),
        CompareOp::Ge => Ok(ordering(left, op, right)? != Ordering::Less),
        CompareOp::In => contains(right, left, op),
        CompareOp::NotIn => contains(right, left, op).map(|found| !found),
    }
}

/// A parsed contract together with its source text and optional message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    pub source: String,
    pub message: Option<String>,
    #[serde(skip)]
    pub expr: Expr,
}

impl Contract {
    pub fn parse(entry: &ContractEntry) -> std::result::Result<Self, ValidationError> {
        let source = entry.expression().trim().to_string();
        let expr = parser::parse(&source).map_err(|e| ValidationError::InvalidContract {
            expression: source.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source,
            message: entry.message().map(str::to_string),
            expr,
        })
    }

    pub fn holds(&self, snapshot: &ConfigSnapshot) -> Result<bool> {
        evaluate(&self.expr, snapshot).map(|value| value.is_truthy())
    }

    /// Evaluate and convert a false or unevaluable result into a `ValidationError`.
    pub fn check(&self, snapshot: &ConfigSnapshot) -> std::result::Result<(), ValidationError> {
        match self.holds(snapshot) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ValidationError::ContractViolation {
                expression: self.source.clone(),
                message: self.message.clone(),
            }),
            Err(e) => Err(ValidationError::ContractEvaluation {
                expression: self.source.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Passed,
    Violated,
    Error,
}

/// Result of evaluating one contract, used for reports.
#[derive(Debug, Clone, Serialize)]
pub struct ContractOutcome {
    pub expression: String,
    pub status: ContractStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContractOutcome {
    pub fn passed(&self) -> bool {
        self.status == ContractStatus::Passed
    }

    /// The pre-flight error this outcome stands for, if it did not pass.
    pub fn to_error(&self) -> Option<ValidationError> {
        match self.status {
            ContractStatus::Passed => None,
            ContractStatus::Violated => Some(ValidationError::ContractViolation {
                expression: self.expression.clone(),
                message: self.message.clone(),
            }),
            ContractStatus::Error => Some(ValidationError::ContractEvaluation {
                expression: self.expression.clone(),
                reason: self.error.clone().unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractValidator {
    contracts: Vec<Contract>,
}

impl ContractValidator {
    /// Parse every entry, failing on the first malformed expression.
    pub fn from_entries(entries: &[ContractEntry]) -> std::result::Result<Self, ValidationError> {
        let contracts = entries
            .iter()
            .map(Contract::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { contracts })
    }

    /// Parse every entry, keeping the well-formed ones and returning the errors.
    pub fn collect(entries: &[ContractEntry]) -> (Self, Vec<ValidationError>) {
        let mut contracts = Vec::new();
        let mut errors = Vec::new();
        for entry in entries {
            match Contract::parse(entry) {
                Ok(contract) => contracts.push(contract),
                Err(e) => errors.push(e),
            }
        }
        (Self { contracts }, errors)
    }

    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Check contracts in document order, stopping at the first failure.
    pub fn check(&self, snapshot: &ConfigSnapshot) -> std::result::Result<(), ValidationError> {
        for contract in &self.contracts {
            contract.check(snapshot)?;
            debug!("Contract holds: {}", contract.source);
        }
        Ok(())
    }

    pub fn evaluate_all(&self, snapshot: &ConfigSnapshot) -> Vec<ContractOutcome> {
        self.contracts
            .iter()
            .map(|contract| {
                let (status, error) = match contract.holds(snapshot) {
                    Ok(true) => (ContractStatus::Passed, None),
                    Ok(false) => (ContractStatus::Violated, None),
                    Err(e) => (ContractStatus::Error, Some(e.to_string())),
                };
                ContractOutcome {
                    expression: contract.source.clone(),
                    status,
                    message: contract.message.clone(),
                    error,
                }
            })
            .collect()
    }
}
