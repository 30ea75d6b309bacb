//! Key translation between a scoped view and the full keyspace.
//!
//! `unscope(p, &scope(p, k)) == Some(k)` holds for every prefix `p` and key `k`.

use tracing::error;

use crate::Error;
use crate::Result;

/// Full store key for `key` inside the view bound to `prefix`
pub fn scope(
    prefix: &str,
    key: &str,
) -> String {
    let mut scoped = String::with_capacity(prefix.len() + key.len());
    scoped.push_str(prefix);
    scoped.push_str(key);
    scoped
}

/// Local key for a full store key, or `None` when `key` lies outside `prefix`
pub fn unscope<'a>(
    prefix: &str,
    key: &'a str,
) -> Option<&'a str> {
    key.strip_prefix(prefix)
}

/// Owned variant of [`unscope`] for keys coming back from the store.
///
/// A key outside the scope can only come from a broken delegation chain, so
/// it is reported as [`Error::ScopeViolation`].
pub(crate) fn unscope_owned(
    prefix: &str,
    key: String,
) -> Result<String> {
    if prefix.is_empty() {
        return Ok(key);
    }
    match unscope(prefix, &key) {
        Some(local) => Ok(local.to_string()),
        None => {
            error!(key = %key, prefix, "store returned a key outside the bound prefix");
            Err(Error::ScopeViolation {
                key,
                prefix: prefix.to_string(),
            })
        }
    }
}
