// src/system/escape.rs

use crate::models::ShellFamily;
use std::borrow::Cow;

/// Quotes one raw argument so it reaches the target shell's parser with
/// exactly its original meaning. Pure and total: arguments that need no
/// quoting are returned unchanged (borrowed).
pub fn escape(arg: &str, family: ShellFamily) -> Cow<'_, str> {
    match family {
        ShellFamily::Posix => escape_posix(arg),
        ShellFamily::Cmd => escape_cmd(arg),
        ShellFamily::PowerShell => escape_powershell(arg),
    }
}

/// Characters that make a POSIX shell interpret a word specially.
const POSIX_METACHARS: &str = "|&;<>()$`\\\"'*?[]#~=%!{}";

fn escape_posix(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || POSIX_METACHARS.contains(c))
    {
        return Cow::Borrowed(arg);
    }
    // Single quotes disable every metacharacter; an embedded quote closes,
    // escapes, and reopens the quoted span.
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    quoted.push_str(&arg.replace('\'', "'\\''"));
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Characters reserved by the Windows command prompt.
const CMD_RESERVED: &str = "&<>()@^|\"%!";

fn escape_cmd(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || CMD_RESERVED.contains(c))
    {
        return Cow::Borrowed(arg);
    }
    let trailing_backslashes = arg.len() - arg.trim_end_matches('\\').len();
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    quoted.push_str(&arg.replace('"', "\"\""));
    // A backslash right before the closing quote would escape it; double
    // the trailing run so the quote survives.
    for _ in 0..trailing_backslashes {
        quoted.push('\\');
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Characters that need quoting under PowerShell.
const POWERSHELL_SPECIAL: &str = "'\"$&|;<>()";

fn escape_powershell(arg: &str) -> Cow<'_, str> {
    // Decision order matters; the first matching rule applies.
    if !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || POWERSHELL_SPECIAL.contains(c))
    {
        return Cow::Borrowed(arg);
    }
    // `$` expands even inside single-quote-free contexts, and a trailing
    // backslash inside single quotes is misparsed; both cases take the
    // double-quote form.
    if arg.contains('$') || arg.ends_with('\\') {
        let mut quoted = String::with_capacity(arg.len() + 2);
        quoted.push('"');
        quoted.push_str(&arg.replace('"', "\"\""));
        quoted.push('"');
        return Cow::Owned(quoted);
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    quoted.push_str(&arg.replace('\'', "''"));
    quoted.push('\'');
    Cow::Owned(quoted)
}

// MARK: --- UNIT TESTS ---
