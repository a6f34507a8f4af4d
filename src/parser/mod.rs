// ABOUTME: Parser module for YAML pipeline documents
// ABOUTME: Exports document loading, inheritance resolution, validation, and data structures

pub mod document;
pub mod error;
pub mod inherit;
pub mod task;
pub mod validation;
pub mod value;

pub use document::{ContractEntry, InheritsRef, PipelineDocument, PipelineParser, SubsetSpec};
pub use error::{ParserError, ValidationError};
pub use task::TaskSpec;
pub use validation::{PipelineValidator, ValidationReport};
pub use value::{ConfigMap, ConfigValue};
