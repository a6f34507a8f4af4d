// ABOUTME: Resolution of `inherits.location` chains between pipeline documents
// ABOUTME: Expands environment variables, loads parents, detects cycles, and merges child over parent

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::document::PipelineDocument;
use super::error::{ParserError, Result};

/// Expand `$VAR` and `${VAR}` references. Unset variables are an error.
pub fn expand_env(location: &str) -> Result<String> {
    expand_with(location, |name| std::env::var(name).ok())
}

fn expand_with<F>(location: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let unresolved = |reason: String| ParserError::Inheritance {
        location: location.to_string(),
        reason,
    };

    let mut expanded = String::with_capacity(location.len());
    let mut chars = location.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            expanded.push(ch);
            continue;
        }

        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => name.push(c),
                    None => return Err(unresolved("unterminated '${'".to_string())),
                }
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };

        if name.is_empty() {
            return Err(unresolved("empty variable name after '$'".to_string()));
        }

        let value = lookup(&name)
            .ok_or_else(|| unresolved(format!("environment variable '{}' is not set", name)))?;
        expanded.push_str(&value);
    }

    Ok(expanded)
}

/// Resolve an inherits location against the directory of the inheriting file.
pub fn resolve_location(location: &str, base_dir: Option<&Path>) -> Result<PathBuf> {
    let expanded = PathBuf::from(expand_env(location)?);
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    Ok(match base_dir {
        Some(dir) => dir.join(expanded),
        None => expanded,
    })
}

/// Merge a child document over its parent.
///
/// Parent tasks keep their order and child-only tasks are appended. For a
/// shared label the child's class wins and config overrides merge key by key
/// with the child winning. Contracts concatenate without duplicates.
pub fn merge(parent: PipelineDocument, child: PipelineDocument) -> PipelineDocument {
    if let (Some(parent_instrument), Some(child_instrument)) =
        (parent.instrument.as_ref(), child.instrument.as_ref())
    {
        if parent_instrument != child_instrument {
            warn!(
                "Inherited pipeline is for instrument '{}' but child declares '{}'",
                parent_instrument, child_instrument
            );
        }
    }

    let mut tasks = parent.tasks;
    for (label, child_task) in child.tasks {
        match tasks.get_mut(&label) {
            Some(existing) => {
                existing.class = child_task.class;
                existing.config.extend(child_task.config);
            }
            None => {
                tasks.insert(label, child_task);
            }
        }
    }

    let mut parameters = parent.parameters;
    parameters.extend(child.parameters);

    let mut subsets = parent.subsets;
    subsets.extend(child.subsets);

    let mut contracts = parent.contracts;
    for contract in child.contracts {
        if !contracts.contains(&contract) {
            contracts.push(contract);
        }
    }

    PipelineDocument {
        description: child.description,
        instrument: child.instrument.or(parent.instrument),
        inherits: None,
        parameters,
        tasks,
        subsets,
        contracts,
    }
}

/// Load a document and every ancestor it inherits from, then merge them.
pub(crate) async fn load_chain(path: &Path) -> Result<PipelineDocument> {
    let mut chain: Vec<PipelineDocument> = Vec::new();
    let mut visited: Vec<PathBuf> = Vec::new();
    let mut next = Some(path.to_path_buf());

    while let Some(current) = next.take() {
        let canonical = fs::canonicalize(&current)
            .await
            .map_err(ParserError::IoError)?;

        if visited.contains(&canonical) {
            let mut cycle: Vec<String> = visited.iter().map(|p| p.display().to_string()).collect();
            cycle.push(canonical.display().to_string());
            return Err(ParserError::InheritanceCycle { chain: cycle });
        }

        let content = fs::read_to_string(&canonical)
            .await
            .map_err(ParserError::IoError)?;
        let document = PipelineDocument::from_yaml(&content)?;
        debug!("Read pipeline document {}", canonical.display());

        if let Some(ref inherits) = document.inherits {
            next = Some(resolve_location(&inherits.location, canonical.parent())?);
        }

        visited.push(canonical);
        chain.push(document);
    }

    // chain[0] is the file that was asked for; fold from the root ancestor down
    let mut documents = chain.into_iter().rev();
    let root = documents.next().ok_or(ParserError::EmptyPipeline)?;
    let merged = documents.fold(root, merge);

    let merged = PipelineDocument {
        inherits: None,
        ..merged
    };
    merged.validate_structure()?;
    Ok(merged)
}
