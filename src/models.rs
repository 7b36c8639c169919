// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

// --- TASK MODELS (What the caller hands to the preparer) ---

/// An explicit per-task shell, bypassing the platform fallback chain entirely.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ShellOverride {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A user-authored task definition. All textual fields may contain `${...}`
/// placeholders. Owned by the caller and read-only to the core.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TaskSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_directory: Option<String>,
    /// `BTreeMap` so placeholder resolution visits values in a stable order.
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    /// Used to find the owning workspace folder; not read otherwise.
    pub source_file_path: Option<PathBuf>,
    pub shell_override: Option<ShellOverride>,
}

// --- CONTEXT MODELS (What resolution reads from) ---

/// The project root folder that owns a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    pub fs_path: PathBuf,
    pub name: String,
}

/// A cursor position in the active document. Zero-based, editor style;
/// the `lineNumber` variable renders it one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub line: u32,
    pub column: u32,
}

/// The document currently focused in the editing surface, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFile {
    pub fs_path: PathBuf,
    pub relative_path: Option<String>,
    pub selection: Option<Selection>,
}

/// A configuration value as a closed union. Anything that is not a scalar
/// (tables, arrays) is `Unsupported` and fails substitution explicitly
/// instead of being silently stringified.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Unsupported,
}

impl fmt::Display for ConfigValue {
    /// Canonical string form used for substitution (`14` -> `"14"`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Unsupported => write!(f, "<unsupported>"),
        }
    }
}

/// Everything resolution needs, gathered once per preparation call.
/// Immutable after construction and never shared between concurrent calls.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub workspace_folder: Option<WorkspaceFolder>,
    pub active_file: Option<ActiveFile>,
    /// Merged environment: task values > workspace defaults > process env.
    pub env: HashMap<String, String>,
    /// Merged configuration, only the keys the request actually needs.
    pub config: HashMap<String, ConfigValue>,
    pub timestamp: SystemTime,
}

// --- PLACEHOLDER MODELS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    Workspace,
    File,
    Env,
    Config,
    Unknown,
}

impl fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Workspace => "workspace",
            Self::File => "file",
            Self::Env => "env",
            Self::Config => "config",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One `${...}` occurrence, classified but not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderToken {
    /// The literal text, braces included. Identical raw text resolves to an
    /// identical value within one request.
    pub raw: String,
    pub category: TokenCategory,
    /// The env name, config key, or bare variable name inside the braces.
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Resolved,
    Ignored,
    Failed,
}

/// The audit record for one distinct token of a request.
#[derive(Debug, Clone)]
pub struct PlaceholderResolution {
    pub token: PlaceholderToken,
    pub status: ResolutionStatus,
    pub resolved_value: Option<String>,
    pub message: Option<String>,
}

/// Output of a successful resolution pass: the rebuilt task fields plus one
/// record per distinct token (including `Ignored` ones).
#[derive(Debug, Clone)]
pub struct SubstitutionResult {
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: Option<String>,
    pub environment_variables: BTreeMap<String, String>,
    pub resolutions: Vec<PlaceholderResolution>,
}

// --- PLATFORM MODELS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Posix,
}

impl OsFamily {
    /// The family of the platform this process runs on.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

/// The quoting dialect a prepared argument must survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFamily {
    Posix,
    Cmd,
    PowerShell,
}

/// The concrete shell a plan will launch under, with the human-readable
/// notes accumulated while the fallback chain ran.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub os_family: OsFamily,
    pub shell_executable: PathBuf,
    pub shell_launch_args: Vec<String>,
    pub shell_family: ShellFamily,
    pub diagnostics: Vec<String>,
}

/// A ready-to-spawn command. Consumed exactly once by an external spawner;
/// arguments are already escaped for the profile's shell family.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}
