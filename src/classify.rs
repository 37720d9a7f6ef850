//! Resource classification.
//!
//! The kind of a resource is derived from the shape of its path:
//!
//! - `/users` (one segment) is a **collection**,
//! - `/users/42` (two segments) is an **item**,
//! - anything matched by a registered function is a **function**, whatever its shape,
//! - everything else is **invalid**.
//!
//! Functions take precedence and are exempt from the allowed-method table; they
//! decide for themselves which requests they accept.

use crate::message::Command;
use crate::registry::FunctionRegistry;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Collection,
    Item,
    Function,
    Invalid,
}

impl ResourceKind {
    /// Classifies `path`, giving registered functions precedence.
    ///
    /// A path claimed by any function is a function path whatever the command, so
    /// a command no function accepts there is refused instead of reaching storage.
    pub fn of(path: &str, functions: &FunctionRegistry) -> Self {
        if functions.matches_path(path) {
            return ResourceKind::Function;
        }
        Self::structural(path)
    }

    /// Classification from segment count alone.
    pub fn structural(path: &str) -> Self {
        match segments(path).as_deref() {
            Some([_]) => ResourceKind::Collection,
            Some([_, _]) => ResourceKind::Item,
            _ => ResourceKind::Invalid,
        }
    }

    /// Whether the generic executor accepts `command` on this kind.
    pub fn allows(&self, command: Command) -> bool {
        match self {
            ResourceKind::Collection => matches!(command, Command::Get | Command::Post),
            ResourceKind::Item => {
                matches!(command, Command::Get | Command::Put | Command::Delete)
            }
            ResourceKind::Function => true,
            ResourceKind::Invalid => false,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Collection => "collection",
            ResourceKind::Item => "item",
            ResourceKind::Function => "function",
            ResourceKind::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Splits a rooted path into its segments.
///
/// Returns `None` for paths without a leading `/` or with empty segments
/// (`//users`, `/users/`).
pub fn segments(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}
