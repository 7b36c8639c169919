// src/constants.rs

/// Prefix marking an environment-variable placeholder, e.g. `${env:PATH}`.
pub const ENV_PREFIX: &str = "env:";

/// Prefix marking a configuration placeholder, e.g. `${config:build.outputDir}`.
pub const CONFIG_PREFIX: &str = "config:";

/// Display stand-in for resolved environment values in logs and summaries.
pub const REDACTED_VALUE: &str = "[REDACTED]";

/// Configuration key holding the preferred Windows shell profile identifier.
pub const WINDOWS_SHELL_PROFILE_KEY: &str = "shell.windows.profile";

/// Environment variable naming the system command interpreter on Windows.
pub const COMSPEC_VAR: &str = "ComSpec";

/// The fixed POSIX launcher. Intentionally not configurable.
pub const POSIX_SHELL: &str = "/bin/sh";

/// Launch flag for the POSIX launcher.
pub const POSIX_SHELL_FLAG: &str = "-c";

/// Hard-coded Windows fallback when every other candidate is rejected.
pub const CMD_FALLBACK: &str = "cmd.exe";

/// Minimal launch flag for the Windows command prompt.
pub const CMD_FLAG: &str = "/C";

/// Name of the per-workspace configuration file read by the CLI binary.
pub const WORKSPACE_CONFIG_FILENAME: &str = "taskprep.toml";

/// Subdirectory of the user config dir holding the global configuration.
pub const USER_CONFIG_DIR: &str = "taskprep";

/// Filename of the global configuration inside [`USER_CONFIG_DIR`].
pub const USER_CONFIG_FILENAME: &str = "config.toml";
