// src/core/preparer.rs

use crate::{
    constants::{COMSPEC_VAR, WINDOWS_SHELL_PROFILE_KEY},
    core::{
        resolver::{self, SubstitutionRequest},
        snapshot::{
            ActiveEditorProvider, ConfigurationProvider, ContextBuilder, EnvironmentProvider,
            WorkspaceLocator,
        },
        summary, tokenizer,
    },
    models::{
        ConfigValue, ExecutionPlan, PlatformProfile, ShellFamily, TaskSpec, TokenCategory,
    },
    system::{escape, shell::{ShellResolver, ShellSettings}},
};
use anyhow::Result;
use std::path::PathBuf;

/// Turns a task specification into a ready-to-spawn [`ExecutionPlan`]:
/// snapshot, placeholder resolution, summary logging, platform shell
/// selection, and per-shell argument escaping, in that order.
///
/// Any substitution failure or snapshot error aborts before a shell is
/// resolved or anything is escaped; nothing irreversible happens during
/// preparation, so a discarded result is always safe.
#[derive(Debug)]
pub struct ExecutionPreparer<'a, W, A, E, C> {
    workspace: &'a W,
    editor: &'a A,
    environment: &'a E,
    configuration: &'a C,
    shells: &'a ShellResolver,
}

impl<'a, W, A, E, C> ExecutionPreparer<'a, W, A, E, C>
where
    W: WorkspaceLocator,
    A: ActiveEditorProvider,
    E: EnvironmentProvider,
    C: ConfigurationProvider,
{
    pub fn new(
        workspace: &'a W,
        editor: &'a A,
        environment: &'a E,
        configuration: &'a C,
        shells: &'a ShellResolver,
    ) -> Self {
        Self {
            workspace,
            editor,
            environment,
            configuration,
            shells,
        }
    }

    pub async fn prepare(&self, task: &TaskSpec) -> Result<ExecutionPlan> {
        // 1. One immutable snapshot per call; the config fetch is driven by
        //    the keys this task actually references, plus the shell profile.
        let config_keys = config_keys_needed(task);
        let snapshot = ContextBuilder::new(
            self.workspace,
            self.editor,
            self.environment,
            self.configuration,
        )
        .build(task, &config_keys)
        .await?;

        // 2. Resolve placeholders. Fail-fast: a typed SubstitutionError
        //    propagates before any shell work happens.
        let request = SubstitutionRequest {
            command: &task.command,
            args: &task.args,
            working_directory: task.working_directory.as_deref(),
            environment_variables: &task.environment_variables,
        };
        let result = resolver::resolve(request, &snapshot)?;

        // 3. Redacted audit trail.
        let summary = summary::summarize(&result);
        if !summary.is_empty() {
            log::info!("Substitution summary:\n{}", summary);
            log::debug!("Substitution payload: {}", summary.to_payload());
        }

        // 4. Platform shell.
        let default_profile = match snapshot.config.get(WINDOWS_SHELL_PROFILE_KEY) {
            Some(ConfigValue::String(name)) => Some(name.clone()),
            _ => None,
        };
        let settings = ShellSettings {
            task_override: task.shell_override.as_ref(),
            default_profile: default_profile.as_deref(),
            comspec: snapshot.env.get(COMSPEC_VAR).map(String::as_str),
        };
        let profile = self.shells.resolve(&settings);
        for note in &profile.diagnostics {
            log::warn!("Shell resolution: {}", note);
        }

        // 5. Escape and assemble.
        let arguments = assemble_arguments(&profile, &result.command, &result.args);

        // The plan environment is the snapshot merge overlaid with the
        // task's now-resolved entries.
        let mut environment = snapshot.env.clone();
        for (key, value) in &result.environment_variables {
            environment.insert(key.clone(), value.clone());
        }

        let working_directory = result
            .working_directory
            .map(PathBuf::from)
            .or_else(|| snapshot.workspace_folder.as_ref().map(|f| f.fs_path.clone()));

        Ok(ExecutionPlan {
            executable: profile.shell_executable,
            arguments,
            working_directory,
            environment,
        })
    }
}

/// The distinct config keys referenced by any field of the task, plus the
/// shell-profile key the resolver chain reads. Keeps the snapshot fetch
/// lazy: unrelated settings are never probed.
fn config_keys_needed(task: &TaskSpec) -> Vec<String> {
    let mut keys = vec![WINDOWS_SHELL_PROFILE_KEY.to_string()];
    let mut collect = |text: &str| {
        for token in tokenizer::scan(text) {
            if token.category == TokenCategory::Config && !keys.contains(&token.key) {
                keys.push(token.key.clone());
            }
        }
    };
    collect(&task.command);
    for arg in &task.args {
        collect(arg);
    }
    if let Some(cwd) = &task.working_directory {
        collect(cwd);
    }
    for value in task.environment_variables.values() {
        collect(value);
    }
    keys
}

/// Builds the final argument vector after the launch flags.
///
/// PowerShell parses its `-Command` tail argument-by-argument, so the
/// escaped command and every escaped argument stay discrete. The
/// line-oriented shells (`sh -c`, `cmd /C`) receive one joined command
/// line: each argument is escaped, but the resolved command is
/// concatenated verbatim — a command like `echo secret` is shell input,
/// not a single word, and quoting it would turn it into one.
fn assemble_arguments(profile: &PlatformProfile, command: &str, args: &[String]) -> Vec<String> {
    let mut arguments = profile.shell_launch_args.clone();
    match profile.shell_family {
        ShellFamily::PowerShell => {
            arguments.push(escape::escape(command, profile.shell_family).into_owned());
            arguments.extend(
                args.iter()
                    .map(|arg| escape::escape(arg, profile.shell_family).into_owned()),
            );
        }
        ShellFamily::Posix | ShellFamily::Cmd => {
            let mut line = command.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(&escape::escape(arg, profile.shell_family));
            }
            arguments.push(line);
        }
    }
    arguments
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::SubstitutionError;
    use crate::models::{ActiveFile, OsFamily, WorkspaceFolder};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixture {
        workspace: Option<WorkspaceFolder>,
        env: HashMap<String, String>,
        config: HashMap<String, ConfigValue>,
    }

    impl WorkspaceLocator for Fixture {
        async fn locate(&self, _file_path: &Path) -> Result<Option<WorkspaceFolder>> {
            Ok(self.workspace.clone())
        }
    }
    impl ActiveEditorProvider for Fixture {
        async fn current(&self) -> Result<Option<ActiveFile>> {
            Ok(None)
        }
    }
    impl EnvironmentProvider for Fixture {
        fn snapshot(&self) -> HashMap<String, String> {
            self.env.clone()
        }
    }
    impl ConfigurationProvider for Fixture {
        async fn get(
            &self,
            key: &str,
            scope: Option<&WorkspaceFolder>,
        ) -> Result<Option<ConfigValue>> {
            if scope.is_some() {
                return Ok(None);
            }
            Ok(self.config.get(key).cloned())
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            workspace: Some(WorkspaceFolder {
                fs_path: "/repo/app".into(),
                name: "app".to_string(),
            }),
            env: HashMap::from([("API_KEY".to_string(), "secret".to_string())]),
            config: HashMap::new(),
        }
    }

    fn task(command: &str, args: &[&str]) -> TaskSpec {
        TaskSpec {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            source_file_path: Some("/repo/app/tasks.toml".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_prepare_produces_posix_plan() {
        let fx = fixture();
        let shells = ShellResolver::with_probe(|_| false);
        let preparer = ExecutionPreparer::new(&fx, &fx, &fx, &fx, &shells);

        let task = task("${workspaceFolder}/scripts/build.sh", &["Hello World"]);
        let plan = preparer.prepare(&task).await.unwrap();

        if OsFamily::current() == OsFamily::Posix {
            assert_eq!(plan.executable, PathBuf::from("/bin/sh"));
            assert_eq!(
                plan.arguments,
                vec![
                    "-c".to_string(),
                    "/repo/app/scripts/build.sh 'Hello World'".to_string()
                ]
            );
        }
        // Task cwd is unset, so the workspace folder is the fallback.
        assert_eq!(plan.working_directory, Some(PathBuf::from("/repo/app")));
        assert_eq!(plan.environment.get("API_KEY").unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_prepare_fails_fast_before_shell_resolution() {
        let fx = fixture();
        let probes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&probes);
        let shells = ShellResolver::with_probe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        let preparer = ExecutionPreparer::new(&fx, &fx, &fx, &fx, &shells);

        let task = task("echo ${env:MISSING_VALUE}", &[]);
        let err = preparer.prepare(&task).await.unwrap_err();

        // The typed failure survives the anyhow boundary.
        let substitution = err.downcast_ref::<SubstitutionError>().unwrap();
        assert_eq!(substitution.token(), "${env:MISSING_VALUE}");
        // And the shell chain never ran.
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prepare_resolves_task_env_into_plan() {
        let fx = fixture();
        let shells = ShellResolver::with_probe(|_| false);
        let preparer = ExecutionPreparer::new(&fx, &fx, &fx, &fx, &shells);

        let mut spec = task("deploy", &[]);
        spec.environment_variables
            .insert("TOKEN".to_string(), "${env:API_KEY}".to_string());
        spec.working_directory = Some("${workspaceFolder}/out".to_string());

        let plan = preparer.prepare(&spec).await.unwrap();
        assert_eq!(plan.environment.get("TOKEN").unwrap(), "secret");
        assert_eq!(plan.working_directory, Some(PathBuf::from("/repo/app/out")));
    }

    #[test]
    fn test_config_keys_collection_is_lazy_and_distinct() {
        let mut spec = task("${config:a} ${config:a}", &["${config:b}", "${env:X}"]);
        spec.working_directory = Some("${config:c}".to_string());
        let keys = config_keys_needed(&spec);
        assert_eq!(
            keys,
            vec![
                WINDOWS_SHELL_PROFILE_KEY.to_string(),
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
            ]
        );
    }

    #[test]
    fn test_powershell_arguments_stay_discrete() {
        let profile = PlatformProfile {
            os_family: OsFamily::Windows,
            shell_executable: "powershell.exe".into(),
            shell_launch_args: vec!["-Command".to_string()],
            shell_family: ShellFamily::PowerShell,
            diagnostics: Vec::new(),
        };
        let args = vec!["Hello World".to_string(), "$env:Path Override".to_string()];
        let assembled = assemble_arguments(&profile, "run.ps1", &args);
        assert_eq!(
            assembled,
            vec![
                "-Command".to_string(),
                "run.ps1".to_string(),
                "'Hello World'".to_string(),
                "\"$env:Path Override\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_posix_multiword_command_stays_shell_input() {
        let profile = PlatformProfile {
            os_family: OsFamily::Posix,
            shell_executable: "/bin/sh".into(),
            shell_launch_args: vec!["-c".to_string()],
            shell_family: ShellFamily::Posix,
            diagnostics: Vec::new(),
        };
        // A resolved command with spaces is a command line, not one word;
        // only the arguments get quoted.
        let args = vec!["Hello World".to_string()];
        let assembled = assemble_arguments(&profile, "echo secret", &args);
        assert_eq!(
            assembled,
            vec!["-c".to_string(), "echo secret 'Hello World'".to_string()]
        );
    }

    #[test]
    fn test_cmd_arguments_join_into_one_line() {
        let profile = PlatformProfile {
            os_family: OsFamily::Windows,
            shell_executable: "cmd.exe".into(),
            shell_launch_args: vec!["/C".to_string()],
            shell_family: ShellFamily::Cmd,
            diagnostics: Vec::new(),
        };
        let args = vec!["a b".to_string()];
        let assembled = assemble_arguments(&profile, "build.bat", &args);
        assert_eq!(
            assembled,
            vec!["/C".to_string(), "build.bat \"a b\"".to_string()]
        );
    }
}
