// src/core/resolver.rs

use crate::{
    core::tokenizer,
    models::{
        ConfigValue, ContextSnapshot, PlaceholderResolution, PlaceholderToken, ResolutionStatus,
        SubstitutionResult, TokenCategory,
    },
};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// A fatal substitution failure. Created the moment a token fails to
/// resolve; aborts the whole request, never retried. Each variant names the
/// offending token verbatim so the caller can surface an actionable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("Cannot resolve '{token}': the task is not associated with any workspace folder.")]
    MissingWorkspace { token: String },
    #[error("Cannot resolve '{token}': {message}")]
    MissingFile { token: String, message: String },
    #[error("Cannot resolve '{token}': environment variable '{name}' is not set.")]
    MissingEnvironment { token: String, name: String },
    #[error("Cannot resolve '{token}': configuration key '{key}' was not found.")]
    MissingConfig { token: String, key: String },
    #[error(
        "Cannot resolve '{token}': configuration key '{key}' holds an object or array, only string, number and boolean values can be substituted."
    )]
    UnsupportedConfigType { token: String, key: String },
}

impl SubstitutionError {
    /// The raw token text this failure is about.
    pub fn token(&self) -> &str {
        match self {
            Self::MissingWorkspace { token }
            | Self::MissingFile { token, .. }
            | Self::MissingEnvironment { token, .. }
            | Self::MissingConfig { token, .. }
            | Self::UnsupportedConfigType { token, .. } => token,
        }
    }
}

/// The fields of one task that undergo substitution. Borrowed from the
/// caller's `TaskSpec`; nothing here is mutated.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionRequest<'a> {
    pub command: &'a str,
    pub args: &'a [String],
    pub working_directory: Option<&'a str>,
    pub environment_variables: &'a BTreeMap<String, String>,
}

/// Resolves every `${...}` placeholder across all fields of a request
/// against a context snapshot.
///
/// Each distinct raw token is resolved exactly once and cached for the
/// lifetime of this call; the first failure, in visiting order (command,
/// args, working directory, environment values), aborts the request with no
/// partial substitution. Unknown tokens pass through verbatim and are
/// recorded as `Ignored`.
pub fn resolve(
    request: SubstitutionRequest<'_>,
    context: &ContextSnapshot,
) -> Result<SubstitutionResult, SubstitutionError> {
    // 1. Collect the distinct token set in deterministic visiting order.
    let mut seen: HashSet<String> = HashSet::new();
    let mut distinct: Vec<PlaceholderToken> = Vec::new();
    let mut visit = |text: &str| {
        for token in tokenizer::scan(text) {
            if seen.insert(token.raw.clone()) {
                distinct.push(token);
            }
        }
    };
    visit(request.command);
    for arg in request.args {
        visit(arg);
    }
    if let Some(cwd) = request.working_directory {
        visit(cwd);
    }
    for value in request.environment_variables.values() {
        visit(value);
    }

    // 2. Resolve each distinct token once. Fail-fast on the first error.
    let mut values: HashMap<String, String> = HashMap::new();
    let mut resolutions: Vec<PlaceholderResolution> = Vec::with_capacity(distinct.len());
    for token in distinct {
        match resolve_token(&token, context)? {
            Some(value) => {
                values.insert(token.raw.clone(), value.clone());
                resolutions.push(PlaceholderResolution {
                    token,
                    status: ResolutionStatus::Resolved,
                    resolved_value: Some(value),
                    message: None,
                });
            }
            None => {
                log::debug!("Ignoring unrecognized placeholder '{}'.", token.raw);
                resolutions.push(PlaceholderResolution {
                    token,
                    status: ResolutionStatus::Ignored,
                    resolved_value: None,
                    message: Some("unrecognized placeholder, passed through".to_string()),
                });
            }
        }
    }

    // 3. Substitute every occurrence across all fields, preserving literals.
    Ok(SubstitutionResult {
        command: tokenizer::substitute(request.command, &values),
        args: request
            .args
            .iter()
            .map(|arg| tokenizer::substitute(arg, &values))
            .collect(),
        working_directory: request
            .working_directory
            .map(|cwd| tokenizer::substitute(cwd, &values)),
        environment_variables: request
            .environment_variables
            .iter()
            .map(|(k, v)| (k.clone(), tokenizer::substitute(v, &values)))
            .collect(),
        resolutions,
    })
}

/// Resolves one token against the snapshot. `Ok(None)` means the token is
/// unknown and passes through; errors are fatal.
fn resolve_token(
    token: &PlaceholderToken,
    context: &ContextSnapshot,
) -> Result<Option<String>, SubstitutionError> {
    match token.category {
        TokenCategory::Workspace => resolve_workspace(token, context).map(Some),
        TokenCategory::File => resolve_file(token, context).map(Some),
        TokenCategory::Env => context
            .env
            .get(&token.key)
            .cloned()
            .map(Some)
            .ok_or_else(|| SubstitutionError::MissingEnvironment {
                token: token.raw.clone(),
                name: token.key.clone(),
            }),
        TokenCategory::Config => resolve_config(token, context).map(Some),
        TokenCategory::Unknown => Ok(None),
    }
}

fn resolve_workspace(
    token: &PlaceholderToken,
    context: &ContextSnapshot,
) -> Result<String, SubstitutionError> {
    let folder = context
        .workspace_folder
        .as_ref()
        .ok_or_else(|| SubstitutionError::MissingWorkspace {
            token: token.raw.clone(),
        })?;
    let value = match token.key.as_str() {
        "workspaceFolderBasename" => folder.name.clone(),
        // "workspaceFolder" and any future path-valued variant.
        _ => dunce::simplified(&folder.fs_path)
            .to_string_lossy()
            .into_owned(),
    };
    Ok(value)
}

fn resolve_file(
    token: &PlaceholderToken,
    context: &ContextSnapshot,
) -> Result<String, SubstitutionError> {
    let missing = |message: &str| SubstitutionError::MissingFile {
        token: token.raw.clone(),
        message: message.to_string(),
    };
    let file = context
        .active_file
        .as_ref()
        .ok_or_else(|| missing("no active file is open."))?;
    let path = dunce::simplified(&file.fs_path);

    let value = match token.key.as_str() {
        "file" => path.to_string_lossy().into_owned(),
        "fileDirname" => path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "fileBasename" => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "fileBasenameNoExtension" => path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "fileExtname" => path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
        "relativeFile" => file
            .relative_path
            .clone()
            .ok_or_else(|| missing("the active file is not inside the workspace folder."))?,
        "lineNumber" => {
            let selection = file
                .selection
                .ok_or_else(|| missing("the active file has no selection."))?;
            // Selections are zero-based; the variable is one-based.
            (selection.line + 1).to_string()
        }
        // Unreachable while the tokenizer's known-name table and this match
        // stay in sync; resolve conservatively to the file path.
        _ => path.to_string_lossy().into_owned(),
    };
    Ok(value)
}

fn resolve_config(
    token: &PlaceholderToken,
    context: &ContextSnapshot,
) -> Result<String, SubstitutionError> {
    let value = context
        .config
        .get(&token.key)
        .ok_or_else(|| SubstitutionError::MissingConfig {
            token: token.raw.clone(),
            key: token.key.clone(),
        })?;
    if matches!(value, ConfigValue::Unsupported) {
        return Err(SubstitutionError::UnsupportedConfigType {
            token: token.raw.clone(),
            key: token.key.clone(),
        });
    }
    Ok(value.to_string())
}

// MARK: --- UNIT TESTS ---
