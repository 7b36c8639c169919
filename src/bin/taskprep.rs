// src/bin/taskprep.rs

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use taskprep::{
    constants::{USER_CONFIG_DIR, USER_CONFIG_FILENAME, WORKSPACE_CONFIG_FILENAME},
    core::{
        preparer::ExecutionPreparer,
        resolver::SubstitutionError,
        snapshot::{
            ActiveEditorProvider, ConfigurationProvider, EnvironmentProvider, WorkspaceLocator,
        },
    },
    models::{ActiveFile, ConfigValue, ExecutionPlan, TaskSpec, WorkspaceFolder},
    system::shell::ShellResolver,
};

/// Resolves `${...}` placeholders in a task and prints the shell-ready
/// execution plan. The plan is prepared, never spawned; pipe it into
/// whatever runs your processes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The command to prepare. Omit when --task-file is given.
    command: Option<String>,

    /// Arguments for the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Load the task definition from a TOML file instead.
    #[arg(long, value_name = "FILE", conflicts_with = "command")]
    task_file: Option<PathBuf>,

    /// Working directory for the task (may contain placeholders).
    #[arg(long, value_name = "DIR")]
    cwd: Option<String>,

    /// Extra environment entries, highest precedence in the merge.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Workspace folder to resolve against, bypassing discovery.
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// File the task definition came from, used for workspace discovery.
    #[arg(long, value_name = "FILE")]
    source: Option<PathBuf>,
}

// --- PROCESS-BACKED COLLABORATORS ---

/// Finds the owning workspace by walking up from the task's source file
/// until a `taskprep.toml` or `.git` marker appears.
#[derive(Debug)]
struct FsWorkspaceLocator {
    explicit: Option<PathBuf>,
}

impl WorkspaceLocator for FsWorkspaceLocator {
    async fn locate(&self, file_path: &Path) -> Result<Option<WorkspaceFolder>> {
        if let Some(root) = &self.explicit {
            return Ok(Some(folder_descriptor(root)));
        }
        let mut current = file_path.parent();
        while let Some(dir) = current {
            if dir.join(WORKSPACE_CONFIG_FILENAME).is_file() || dir.join(".git").is_dir() {
                return Ok(Some(folder_descriptor(dir)));
            }
            current = dir.parent();
        }
        Ok(None)
    }
}

fn folder_descriptor(path: &Path) -> WorkspaceFolder {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    WorkspaceFolder {
        fs_path: dunce::simplified(path).to_path_buf(),
        name,
    }
}

/// A headless host has no focused document.
#[derive(Debug)]
struct NoActiveEditor;

impl ActiveEditorProvider for NoActiveEditor {
    async fn current(&self) -> Result<Option<ActiveFile>> {
        Ok(None)
    }
}

#[derive(Debug)]
struct ProcessEnvironment;

impl EnvironmentProvider for ProcessEnvironment {
    fn snapshot(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }
}

/// Layered TOML configuration: `taskprep.toml` in the workspace folder for
/// scoped lookups, `<config dir>/taskprep/config.toml` for the global
/// fallback. Dotted keys address nested tables.
#[derive(Debug)]
struct TomlConfiguration;

impl ConfigurationProvider for TomlConfiguration {
    async fn get(&self, key: &str, scope: Option<&WorkspaceFolder>) -> Result<Option<ConfigValue>> {
        let path = match scope {
            Some(folder) => folder.fs_path.join(WORKSPACE_CONFIG_FILENAME),
            None => match dirs::config_dir() {
                Some(dir) => dir.join(USER_CONFIG_DIR).join(USER_CONFIG_FILENAME),
                None => return Ok(None),
            },
        };
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration '{}'", path.display()))?;
        let root: toml::Value = content
            .parse()
            .with_context(|| format!("Failed to parse configuration '{}'", path.display()))?;
        Ok(lookup_dotted(&root, key).map(to_config_value))
    }
}

/// Traverses nested tables along a dotted key path.
fn lookup_dotted<'a>(root: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    let mut current = root;
    for part in key.split('.') {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn to_config_value(value: &toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s.clone()),
        toml::Value::Integer(i) => ConfigValue::Integer(*i),
        toml::Value::Float(x) => ConfigValue::Float(*x),
        toml::Value::Boolean(b) => ConfigValue::Boolean(*b),
        // Tables, arrays, datetimes: substitutable only as an explicit error.
        _ => ConfigValue::Unsupported,
    }
}

// --- ENTRY POINT ---

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        // Substitution failures get the actionable one-liner; everything
        // else falls through with its context chain.
        if let Some(substitution) = e.downcast_ref::<SubstitutionError>() {
            eprintln!("\n{}: {}", "Error".red().bold(), substitution);
        } else {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let task = build_task(&cli)?;
    log::debug!("Prepared task spec: {:?}", task);

    let workspace = FsWorkspaceLocator {
        explicit: cli.workspace,
    };
    let editor = NoActiveEditor;
    let environment = ProcessEnvironment;
    let configuration = TomlConfiguration;
    let shells = ShellResolver::new();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let plan = runtime.block_on(
        ExecutionPreparer::new(&workspace, &editor, &environment, &configuration, &shells)
            .prepare(&task),
    )?;

    print_plan(&plan);
    Ok(())
}

/// Builds the task spec from either a TOML task file or the CLI arguments.
fn build_task(cli: &Cli) -> Result<TaskSpec> {
    let mut task = match (&cli.task_file, &cli.command) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read task file '{}'", path.display()))?;
            let mut task: TaskSpec = toml::from_str(&content)
                .with_context(|| format!("Failed to parse task file '{}'", path.display()))?;
            if task.source_file_path.is_none() {
                task.source_file_path = Some(path.clone());
            }
            task
        }
        (None, Some(command)) => TaskSpec {
            command: command.clone(),
            args: cli.args.clone(),
            ..Default::default()
        },
        (None, None) => bail!("Nothing to prepare: pass a command or --task-file."),
    };

    if cli.cwd.is_some() {
        task.working_directory = cli.cwd.clone();
    }
    for pair in &cli.env {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid --env entry '{}', expected KEY=VALUE.", pair))?;
        task.environment_variables
            .insert(key.to_string(), value.to_string());
    }
    if let Some(source) = &cli.source {
        task.source_file_path = Some(source.clone());
    }
    if task.source_file_path.is_none() {
        // Anchor workspace discovery in the current directory.
        task.source_file_path = std::env::current_dir().ok().map(|d| d.join("task"));
    }
    Ok(task)
}

fn print_plan(plan: &ExecutionPlan) {
    println!("{} {}", "executable:".dimmed(), plan.executable.display());
    for arg in &plan.arguments {
        println!("{} {}", "argument:  ".dimmed(), arg.green());
    }
    if let Some(cwd) = &plan.working_directory {
        println!("{} {}", "directory: ".dimmed(), cwd.display());
    }
    println!(
        "{} {} entries",
        "environment:".dimmed(),
        plan.environment.len()
    );
}
