// src/system/shell.rs

use crate::{
    constants::{CMD_FALLBACK, CMD_FLAG, POSIX_SHELL, POSIX_SHELL_FLAG},
    models::{OsFamily, PlatformProfile, ShellFamily, ShellOverride},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The known Windows shell profiles: identifier, executable path, launch
/// flags, and quoting family. Identifiers are matched case-sensitively.
const WINDOWS_SHELL_PROFILES: &[(&str, &str, &[&str], ShellFamily)] = &[
    (
        "PowerShell",
        r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe",
        &["-Command"],
        ShellFamily::PowerShell,
    ),
    (
        "PowerShell Core",
        r"C:\Program Files\PowerShell\7\pwsh.exe",
        &["-Command"],
        ShellFamily::PowerShell,
    ),
    (
        "Command Prompt",
        r"C:\Windows\System32\cmd.exe",
        &["/C"],
        ShellFamily::Cmd,
    ),
];

/// Inputs to one shell resolution. All optional pieces come from the
/// request's context snapshot; none of them is consulted on POSIX.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSettings<'a> {
    pub task_override: Option<&'a ShellOverride>,
    /// The host's configured default shell-profile identifier.
    pub default_profile: Option<&'a str>,
    /// The system command-interpreter variable (`ComSpec`), if set.
    pub comspec: Option<&'a str>,
}

type Probe = dyn Fn(&Path) -> bool + Send + Sync;

/// Determines which shell executable and launch arguments to use on a given
/// platform, walking an explicit fallback chain on Windows.
///
/// Construct one instance and pass it by reference; the existence probe is
/// injectable for tests, and successful lookups are memoized for the
/// lifetime of the instance (same inputs always produce the same outputs,
/// so the cache never needs invalidation).
pub struct ShellResolver {
    probe: Box<Probe>,
    probe_cache: Mutex<HashMap<PathBuf, bool>>,
}

impl std::fmt::Debug for ShellResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellResolver").finish_non_exhaustive()
    }
}

impl Default for ShellResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellResolver {
    /// A resolver backed by real filesystem checks.
    pub fn new() -> Self {
        Self::with_probe(|path: &Path| path.is_file())
    }

    /// A resolver with an injected existence probe. Tests use this instead
    /// of touching the real filesystem.
    pub fn with_probe(probe: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            probe_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the shell profile for the platform this process runs on.
    pub fn resolve(&self, settings: &ShellSettings<'_>) -> PlatformProfile {
        self.resolve_for(OsFamily::current(), settings)
    }

    /// Resolves the shell profile for an explicit platform. Split out so the
    /// Windows chain is testable from any host.
    pub fn resolve_for(&self, os_family: OsFamily, settings: &ShellSettings<'_>) -> PlatformProfile {
        match os_family {
            // The POSIX launcher is fixed and unaffected by overrides,
            // profiles, or environment variables.
            OsFamily::Posix => PlatformProfile {
                os_family,
                shell_executable: PathBuf::from(POSIX_SHELL),
                shell_launch_args: vec![POSIX_SHELL_FLAG.to_string()],
                shell_family: ShellFamily::Posix,
                diagnostics: Vec::new(),
            },
            OsFamily::Windows => self.resolve_windows(settings),
        }
    }

    /// The Windows fallback chain: per-task override, configured profile,
    /// `ComSpec`, then the hard-coded command prompt. Every rejected
    /// candidate leaves a diagnostic; the chain itself never fails.
    fn resolve_windows(&self, settings: &ShellSettings<'_>) -> PlatformProfile {
        let mut diagnostics = Vec::new();

        // 1. Explicit per-task override: used as-is, no existence check.
        if let Some(over) = settings.task_override {
            diagnostics.push(format!(
                "Using per-task shell override '{}'.",
                over.executable.display()
            ));
            return PlatformProfile {
                os_family: OsFamily::Windows,
                shell_executable: over.executable.clone(),
                shell_launch_args: over.args.clone(),
                shell_family: family_of_executable(&over.executable),
                diagnostics,
            };
        }

        // 2. Configured default profile, mapped through the known table and
        //    verified on disk.
        if let Some(profile_name) = settings.default_profile {
            match lookup_profile(profile_name) {
                Some((executable, flags, family)) => {
                    if self.probe_exists(&executable) {
                        diagnostics.push(format!("Resolved shell profile '{}'.", profile_name));
                        return PlatformProfile {
                            os_family: OsFamily::Windows,
                            shell_executable: executable,
                            shell_launch_args: flags,
                            shell_family: family,
                            diagnostics,
                        };
                    }
                    diagnostics.push(format!(
                        "Shell profile '{}' detection failed: '{}' not found.",
                        profile_name,
                        executable.display()
                    ));
                }
                None => {
                    diagnostics.push(format!("Unknown shell profile '{}'.", profile_name));
                }
            }
        }

        // 3. The system command interpreter, verified on disk.
        if let Some(comspec) = settings.comspec {
            let executable = PathBuf::from(comspec);
            if self.probe_exists(&executable) {
                diagnostics.push(format!("Using system ComSpec '{}'.", comspec));
                return PlatformProfile {
                    os_family: OsFamily::Windows,
                    shell_executable: executable,
                    shell_launch_args: vec![CMD_FLAG.to_string()],
                    shell_family: ShellFamily::Cmd,
                    diagnostics,
                };
            }
            diagnostics.push(format!("ComSpec '{}' not found.", comspec));
        }

        // 4. Bottom of the chain.
        diagnostics.push("Defaulting to Command Prompt.".to_string());
        PlatformProfile {
            os_family: OsFamily::Windows,
            shell_executable: PathBuf::from(CMD_FALLBACK),
            shell_launch_args: vec![CMD_FLAG.to_string()],
            shell_family: ShellFamily::Cmd,
            diagnostics,
        }
    }

    /// Memoized filesystem existence check.
    fn probe_exists(&self, path: &Path) -> bool {
        if let Ok(cache) = self.probe_cache.lock()
            && let Some(known) = cache.get(path)
        {
            return *known;
        }
        let exists = (self.probe)(path);
        if let Ok(mut cache) = self.probe_cache.lock() {
            cache.insert(path.to_path_buf(), exists);
        }
        exists
    }
}

fn lookup_profile(name: &str) -> Option<(PathBuf, Vec<String>, ShellFamily)> {
    WINDOWS_SHELL_PROFILES
        .iter()
        .find(|(id, _, _, _)| *id == name)
        .map(|(_, path, flags, family)| {
            (
                PathBuf::from(path),
                flags.iter().map(|f| f.to_string()).collect(),
                *family,
            )
        })
}

/// Guesses the quoting family of an arbitrary executable from its stem.
fn family_of_executable(executable: &Path) -> ShellFamily {
    let stem = executable
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match stem.as_str() {
        "powershell" | "pwsh" => ShellFamily::PowerShell,
        _ => ShellFamily::Cmd,
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_posix_profile_is_fixed() {
        let resolver = ShellResolver::with_probe(|_| panic!("posix must not probe the disk"));
        // Even a loaded settings struct changes nothing on POSIX.
        let over = ShellOverride {
            executable: PathBuf::from("/usr/bin/zsh"),
            args: vec!["-c".to_string()],
        };
        let settings = ShellSettings {
            task_override: Some(&over),
            default_profile: Some("PowerShell"),
            comspec: Some("C:\\Windows\\System32\\cmd.exe"),
        };
        let profile = resolver.resolve_for(OsFamily::Posix, &settings);
        assert_eq!(profile.shell_executable, PathBuf::from("/bin/sh"));
        assert_eq!(profile.shell_launch_args, vec!["-c".to_string()]);
        assert_eq!(profile.shell_family, ShellFamily::Posix);
        assert!(profile.diagnostics.is_empty());
    }

    #[test]
    fn test_windows_override_wins_without_probing() {
        let resolver = ShellResolver::with_probe(|_| panic!("override must not probe the disk"));
        let over = ShellOverride {
            executable: PathBuf::from("C:\\tools\\pwsh.exe"),
            args: vec!["-NoProfile".to_string(), "-Command".to_string()],
        };
        let settings = ShellSettings {
            task_override: Some(&over),
            default_profile: Some("Command Prompt"),
            comspec: None,
        };
        let profile = resolver.resolve_for(OsFamily::Windows, &settings);
        assert_eq!(profile.shell_executable, PathBuf::from("C:\\tools\\pwsh.exe"));
        assert_eq!(profile.shell_family, ShellFamily::PowerShell);
    }

    #[test]
    fn test_windows_profile_resolves_when_executable_exists() {
        let resolver = ShellResolver::with_probe(|_| true);
        let settings = ShellSettings {
            default_profile: Some("PowerShell"),
            ..Default::default()
        };
        let profile = resolver.resolve_for(OsFamily::Windows, &settings);
        assert_eq!(profile.shell_family, ShellFamily::PowerShell);
        assert_eq!(profile.shell_launch_args, vec!["-Command".to_string()]);
        assert!(
            profile
                .diagnostics
                .iter()
                .any(|d| d.contains("Resolved shell profile 'PowerShell'"))
        );
    }

    #[test]
    fn test_windows_missing_profile_falls_back_to_cmd() {
        // Scenario: configured PowerShell whose executable is absent.
        let resolver = ShellResolver::with_probe(|_| false);
        let settings = ShellSettings {
            default_profile: Some("PowerShell"),
            ..Default::default()
        };
        let profile = resolver.resolve_for(OsFamily::Windows, &settings);
        assert_eq!(profile.shell_executable, PathBuf::from("cmd.exe"));
        assert_eq!(profile.shell_family, ShellFamily::Cmd);
        assert!(
            profile
                .diagnostics
                .iter()
                .any(|d| d.contains("detection failed"))
        );
        assert!(
            profile
                .diagnostics
                .iter()
                .any(|d| d.contains("Defaulting to Command Prompt"))
        );
    }

    #[test]
    fn test_windows_unknown_profile_leaves_diagnostic() {
        let resolver = ShellResolver::with_probe(|_| false);
        let settings = ShellSettings {
            default_profile: Some("Fish"),
            ..Default::default()
        };
        let profile = resolver.resolve_for(OsFamily::Windows, &settings);
        assert!(
            profile
                .diagnostics
                .iter()
                .any(|d| d.contains("Unknown shell profile 'Fish'"))
        );
    }

    #[test]
    fn test_windows_comspec_step_runs_after_profile() {
        let comspec_path = "C:\\Windows\\System32\\cmd.exe";
        let resolver =
            ShellResolver::with_probe(move |p: &Path| p == Path::new(comspec_path));
        let settings = ShellSettings {
            default_profile: Some("PowerShell Core"),
            comspec: Some(comspec_path),
            ..Default::default()
        };
        let profile = resolver.resolve_for(OsFamily::Windows, &settings);
        assert_eq!(profile.shell_executable, PathBuf::from(comspec_path));
        assert_eq!(profile.shell_family, ShellFamily::Cmd);
        assert_eq!(profile.shell_launch_args, vec!["/C".to_string()]);
        assert!(profile.diagnostics.iter().any(|d| d.contains("ComSpec")));
    }

    #[test]
    fn test_default_probe_checks_the_real_filesystem() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolver = ShellResolver::new();
        assert!(resolver.probe_exists(file.path()));
        assert!(!resolver.probe_exists(Path::new("/nonexistent/shell.exe")));
    }

    #[test]
    fn test_probe_results_are_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = ShellResolver::with_probe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        let settings = ShellSettings {
            default_profile: Some("PowerShell"),
            ..Default::default()
        };
        resolver.resolve_for(OsFamily::Windows, &settings);
        resolver.resolve_for(OsFamily::Windows, &settings);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
