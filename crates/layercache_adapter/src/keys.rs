// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key namespacing and glob translation used by every adapter.
//!
//! Adapters store keys as `namespace:key` so several logical caches can share one
//! physical store, and strip the prefix again before handing keys back.

use regex::Regex;

use crate::Error;

/// Separator between a namespace and the key it scopes.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Prefixes `key` with `namespace`.
///
/// ```
/// assert_eq!(layercache_adapter::keys::namespaced_key("app", "user:1"), "app:user:1");
/// ```
#[must_use]
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    let mut out = String::with_capacity(namespace.len() + key.len() + 1);
    out.push_str(namespace);
    out.push(NAMESPACE_SEPARATOR);
    out.push_str(key);
    out
}

/// Removes the `namespace:` prefix from `stored`, if present.
///
/// ```
/// assert_eq!(layercache_adapter::keys::strip_namespace("app", "app:user:1"), Some("user:1"));
/// assert_eq!(layercache_adapter::keys::strip_namespace("app", "other:user:1"), None);
/// ```
#[must_use]
pub fn strip_namespace<'a>(namespace: &str, stored: &'a str) -> Option<&'a str> {
    stored.strip_prefix(namespace)?.strip_prefix(NAMESPACE_SEPARATOR)
}

/// Translates a glob pattern into an anchored regular expression.
///
/// `*` matches any run of characters, `?` matches exactly one, and `[...]` character
/// classes pass through (with a leading `!` turned into `^`). Everything else is
/// matched literally.
///
/// # Errors
///
/// Returns an error when the resulting expression does not compile, e.g. for an
/// unterminated character class.
///
/// ```
/// let re = layercache_adapter::keys::glob_to_regex("user:*").unwrap();
/// assert!(re.is_match("user:42"));
/// assert!(!re.is_match("session:42"));
/// ```
pub fn glob_to_regex(pattern: &str) -> Result<Regex, Error> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 2);
    expr.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            '[' => {
                expr.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    expr.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        expr.push('\\');
                    }
                    expr.push(inner);
                }
                expr.push(']');
            }
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    expr.push('$');
    Regex::new(&expr).map_err(Error::caused_by)
}
