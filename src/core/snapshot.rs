// src/core/snapshot.rs

use crate::models::{ActiveFile, ConfigValue, ContextSnapshot, TaskSpec, WorkspaceFolder};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

// --- COLLABORATOR INTERFACES ---
//
// The core never talks to an editor, a filesystem watcher, or a settings
// store directly. Callers implement these traits and inject them; tests
// construct stubs instead of resetting shared global state.

/// Finds the workspace folder that owns a given file, if any.
pub trait WorkspaceLocator {
    fn locate(
        &self,
        file_path: &Path,
    ) -> impl Future<Output = Result<Option<WorkspaceFolder>>> + Send;
}

/// Reports the currently focused document and selection, if any.
pub trait ActiveEditorProvider {
    fn current(&self) -> impl Future<Output = Result<Option<ActiveFile>>> + Send;
}

/// Supplies the raw process environment plus any workspace-level defaults.
pub trait EnvironmentProvider {
    fn snapshot(&self) -> HashMap<String, String>;

    /// Workspace-level default environment entries. These sit between the
    /// raw process environment and the task's own entries in the merge.
    fn workspace_defaults(&self, _scope: Option<&WorkspaceFolder>) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Layered configuration lookup. A `scope` of `Some(folder)` asks for the
/// value as seen from that workspace folder; `None` asks for the
/// user/global fallback.
pub trait ConfigurationProvider {
    fn get(
        &self,
        key: &str,
        scope: Option<&WorkspaceFolder>,
    ) -> impl Future<Output = Result<Option<ConfigValue>>> + Send;

    fn has(
        &self,
        key: &str,
        scope: Option<&WorkspaceFolder>,
    ) -> impl Future<Output = Result<bool>> + Send
    where
        Self: Sync,
    {
        async move { Ok(self.get(key, scope).await?.is_some()) }
    }
}

// --- BUILDER ---

/// Gathers everything one resolution request needs into an immutable
/// [`ContextSnapshot`]. Pure read-only function of its collaborators at a
/// point in time; collaborator errors propagate, they are never papered
/// over with defaults.
#[derive(Debug)]
pub struct ContextBuilder<'a, W, A, E, C> {
    workspace: &'a W,
    editor: &'a A,
    environment: &'a E,
    configuration: &'a C,
}

impl<'a, W, A, E, C> ContextBuilder<'a, W, A, E, C>
where
    W: WorkspaceLocator,
    A: ActiveEditorProvider,
    E: EnvironmentProvider,
    C: ConfigurationProvider,
{
    pub fn new(workspace: &'a W, editor: &'a A, environment: &'a E, configuration: &'a C) -> Self {
        Self {
            workspace,
            editor,
            environment,
            configuration,
        }
    }

    /// Builds a fresh snapshot for `task`, fetching only the configuration
    /// keys the caller knows it will need.
    pub async fn build(&self, task: &TaskSpec, config_keys_needed: &[String]) -> Result<ContextSnapshot> {
        // 1. Owning workspace. A task with no source file, or one outside
        //    every known folder, simply has no workspace. Not an error.
        let workspace_folder = match &task.source_file_path {
            Some(path) => self
                .workspace
                .locate(path)
                .await
                .with_context(|| format!("Workspace lookup failed for '{}'", path.display()))?,
            None => None,
        };

        // 2. Active file, with the relative path computed against the
        //    workspace when both exist.
        let mut active_file = self
            .editor
            .current()
            .await
            .context("Active editor query failed")?;
        if let (Some(file), Some(folder)) = (active_file.as_mut(), workspace_folder.as_ref())
            && file.relative_path.is_none()
        {
            file.relative_path = relative_to(&file.fs_path, &folder.fs_path);
        }

        // 3. Environment merge, highest precedence last so later inserts win:
        //    process env < workspace defaults < task entries.
        let mut env = self.environment.snapshot();
        env.extend(self.environment.workspace_defaults(workspace_folder.as_ref()));
        for (key, value) in &task.environment_variables {
            env.insert(key.clone(), value.clone());
        }

        // 4. Lazy configuration fetch: workspace-scoped value first, then the
        //    user/global fallback. Missing keys stay absent from the map.
        let mut config = HashMap::new();
        for key in config_keys_needed {
            let scoped = self
                .configuration
                .get(key, workspace_folder.as_ref())
                .await
                .with_context(|| format!("Configuration lookup failed for '{}'", key))?;
            let value = match scoped {
                Some(v) => Some(v),
                None => self
                    .configuration
                    .get(key, None)
                    .await
                    .with_context(|| format!("Configuration lookup failed for '{}'", key))?,
            };
            if let Some(v) = value {
                config.insert(key.clone(), v);
            }
        }

        Ok(ContextSnapshot {
            workspace_folder,
            active_file,
            env,
            config,
            timestamp: SystemTime::now(),
        })
    }
}

/// Computes `path` relative to `base`, in simplified display form.
fn relative_to(path: &Path, base: &Path) -> Option<String> {
    dunce::simplified(path)
        .strip_prefix(dunce::simplified(base))
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

// MARK: --- UNIT TESTS ---
