// ABOUTME: Contract module for pre-flight invariants over resolved task configuration
// ABOUTME: Parses contract expressions into a typed AST and evaluates them read-only

pub mod ast;
pub mod error;
pub mod eval;
pub mod parser;

pub use ast::{CompareOp, ConfigPath, Expr};
pub use error::{ContractError, Result};
pub use eval::{
    evaluate, ConfigSnapshot, Contract, ContractOutcome, ContractStatus, ContractValidator,
};
pub use parser::parse;
