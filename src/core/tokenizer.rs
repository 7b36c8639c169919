// src/core/tokenizer.rs

use crate::{
    constants::{CONFIG_PREFIX, ENV_PREFIX},
    models::{PlaceholderToken, TokenCategory},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    // Non-nested grammar: the first `}` after `${` terminates the token.
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\$\{([^}]*)\}").unwrap();
}

/// Bare variable names understood without a prefix, with the category each
/// one belongs to. Matching is case-sensitive.
const KNOWN_VARIABLES: &[(&str, TokenCategory)] = &[
    ("workspaceFolder", TokenCategory::Workspace),
    ("workspaceFolderBasename", TokenCategory::Workspace),
    ("file", TokenCategory::File),
    ("fileDirname", TokenCategory::File),
    ("fileBasename", TokenCategory::File),
    ("fileBasenameNoExtension", TokenCategory::File),
    ("fileExtname", TokenCategory::File),
    ("relativeFile", TokenCategory::File),
    ("lineNumber", TokenCategory::File),
];

/// Scans a string for `${...}` occurrences in left-to-right order.
///
/// Classification only; no validation happens here. Duplicate raw texts are
/// returned as-is and deduplicated downstream.
pub fn scan(text: &str) -> Vec<PlaceholderToken> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|caps| {
            let raw = caps.get(0).map_or("", |m| m.as_str());
            let body = caps.get(1).map_or("", |m| m.as_str());
            let (category, key) = classify(body);
            PlaceholderToken {
                raw: raw.to_string(),
                category,
                key: key.to_string(),
            }
        })
        .collect()
}

/// Classifies a token body into a category and its lookup key.
fn classify(body: &str) -> (TokenCategory, &str) {
    if let Some(name) = body.strip_prefix(ENV_PREFIX) {
        return (TokenCategory::Env, name);
    }
    if let Some(key) = body.strip_prefix(CONFIG_PREFIX) {
        return (TokenCategory::Config, key);
    }
    for (name, category) in KNOWN_VARIABLES {
        if *name == body {
            return (*category, body);
        }
    }
    // Custom namespaces (`foo:bar`) and anything unrecognized pass through.
    (TokenCategory::Unknown, body)
}

/// Rebuilds `text`, replacing every `${...}` occurrence whose raw form has an
/// entry in `values` and keeping all other spans byte-for-byte.
///
/// Substituted values are never re-scanned, so a resolved value containing
/// `${` text cannot trigger a second round of resolution.
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    for m in PLACEHOLDER_RE.find_iter(text) {
        out.push_str(&text[last_end..m.start()]);
        match values.get(m.as_str()) {
            Some(value) => out.push_str(value),
            None => out.push_str(m.as_str()),
        }
        last_end = m.end();
    }
    out.push_str(&text[last_end..]);
    out
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_plain_text_yields_nothing() {
        assert!(scan("echo hello world").is_empty());
        assert!(scan("").is_empty());
    }

    #[test]
    fn test_scan_preserves_left_to_right_order() {
        let tokens = scan("${file} and ${workspaceFolder} and ${env:HOME}");
        let raws: Vec<_> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["${file}", "${workspaceFolder}", "${env:HOME}"]);
    }

    #[test]
    fn test_scan_keeps_duplicates() {
        let tokens = scan("${env:A} ${env:A}");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].raw, tokens[1].raw);
    }

    #[test]
    fn test_classify_env_and_config_prefixes() {
        let tokens = scan("${env:API_KEY} ${config:build.outDir}");
        assert_eq!(tokens[0].category, TokenCategory::Env);
        assert_eq!(tokens[0].key, "API_KEY");
        assert_eq!(tokens[1].category, TokenCategory::Config);
        assert_eq!(tokens[1].key, "build.outDir");
    }

    #[test]
    fn test_classify_known_bare_names() {
        let tokens = scan("${workspaceFolderBasename} ${fileDirname} ${lineNumber}");
        assert_eq!(tokens[0].category, TokenCategory::Workspace);
        assert_eq!(tokens[1].category, TokenCategory::File);
        assert_eq!(tokens[2].category, TokenCategory::File);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        let tokens = scan("${WorkspaceFolder} ${ENV:PATH}");
        assert_eq!(tokens[0].category, TokenCategory::Unknown);
        assert_eq!(tokens[1].category, TokenCategory::Unknown);
    }

    #[test]
    fn test_classify_custom_namespace_is_unknown() {
        let tokens = scan("${input:pickTarget} ${command:doThing}");
        assert_eq!(tokens[0].category, TokenCategory::Unknown);
        assert_eq!(tokens[0].key, "input:pickTarget");
        assert_eq!(tokens[1].category, TokenCategory::Unknown);
    }

    #[test]
    fn test_scan_unterminated_and_empty_bodies() {
        // No closing brace: not a token at all.
        assert!(scan("echo ${file").is_empty());
        // Empty body: a token, but unknown.
        let tokens = scan("${}");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].category, TokenCategory::Unknown);
        assert_eq!(tokens[0].key, "");
    }

    #[test]
    fn test_scan_first_brace_terminates() {
        // `${a${b}` closes at the first `}`; the body keeps the inner `${`.
        let tokens = scan("${a${b}");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].raw, "${a${b}");
        assert_eq!(tokens[0].category, TokenCategory::Unknown);
    }

    #[test]
    fn test_substitute_replaces_all_occurrences() {
        let mut values = HashMap::new();
        values.insert("${env:A}".to_string(), "1".to_string());
        assert_eq!(substitute("${env:A}+${env:A}", &values), "1+1");
    }

    #[test]
    fn test_substitute_leaves_unmapped_tokens_verbatim() {
        let values = HashMap::new();
        assert_eq!(substitute("run ${input:x}", &values), "run ${input:x}");
    }

    #[test]
    fn test_substitute_does_not_rescan_values() {
        let mut values = HashMap::new();
        values.insert("${env:A}".to_string(), "${env:B}".to_string());
        values.insert("${env:B}".to_string(), "nope".to_string());
        // The value of A contains token text, but it must not be re-resolved.
        assert_eq!(substitute("${env:A}", &values), "${env:B}");
    }
}
