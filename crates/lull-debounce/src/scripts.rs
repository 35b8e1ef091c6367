//! The atomic mutation scripts and their registry.
//!
//! All pointer and item-map writes go through three named scripts; no other
//! code path touches those keys. The scripts are embedded at compile time
//! and assembled once into an immutable [`ScriptRegistry`]. Source-
//! evaluating backends (Redis-class stores) ship [`Script::source`] to the
//! server, while the in-memory store dispatches on [`Script::name`] and runs
//! the same semantics natively.
//!
//! Script bodies may splice shared helpers with a `-- $include(name)` marker;
//! the splice happens exactly once, at load.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

const NEW_DEBOUNCE_SOURCE: &str = include_str!("scripts/lua/newDebounce.lua");
const UPDATE_DEBOUNCE_SOURCE: &str = include_str!("scripts/lua/updateDebounce.lua");
const START_EXECUTION_SOURCE: &str = include_str!("scripts/lua/startExecution.lua");

const INCLUDES: &[(&str, &str)] = &[(
    "get_queue_item.lua",
    include_str!("scripts/lua/includes/get_queue_item.lua"),
)];

const INCLUDE_OPEN: &str = "-- $include(";

/// The named mutations a [`ScriptStore`](crate::store::ScriptStore) must
/// evaluate atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptName {
    /// Create a window if none exists; otherwise report the existing id.
    NewDebounce,
    /// Extend an existing window with a newer event.
    UpdateDebounce,
    /// Rotate the pointer when the executor claims a fired window.
    StartExecution,
}

impl ScriptName {
    /// All script names, in load order.
    pub const ALL: [Self; 3] = [Self::NewDebounce, Self::UpdateDebounce, Self::StartExecution];

    /// The script's registry name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewDebounce => "newDebounce",
            Self::UpdateDebounce => "updateDebounce",
            Self::StartExecution => "startExecution",
        }
    }

    const fn raw_source(self) -> &'static str {
        match self {
            Self::NewDebounce => NEW_DEBOUNCE_SOURCE,
            Self::UpdateDebounce => UPDATE_DEBOUNCE_SOURCE,
            Self::StartExecution => START_EXECUTION_SOURCE,
        }
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One loaded script: its name plus the fully-spliced source.
#[derive(Debug, Clone)]
pub struct Script {
    name: ScriptName,
    source: String,
}

impl Script {
    /// The script's name, used by native backends to dispatch.
    #[must_use]
    pub const fn name(&self) -> ScriptName {
        self.name
    }

    /// The spliced source, used by source-evaluating backends.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Immutable table of loaded scripts, built once at initialization.
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    scripts: HashMap<ScriptName, Script>,
}

impl ScriptRegistry {
    /// Assembles the registry from the embedded sources, splicing every
    /// `-- $include(name)` marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptLoad`] if a marker references an unknown
    /// include. The sources are embedded, so this only fires on a broken
    /// build of this crate itself.
    pub fn load() -> Result<Self> {
        let mut scripts = HashMap::new();
        for name in ScriptName::ALL {
            let source = splice_includes(name, name.raw_source())?;
            scripts.insert(name, Script { name, source });
        }
        Ok(Self { scripts })
    }

    /// Returns the loaded script for `name`.
    ///
    /// # Panics
    ///
    /// Never: [`ScriptRegistry::load`] inserts every variant of
    /// [`ScriptName`].
    #[must_use]
    pub fn get(&self, name: ScriptName) -> &Script {
        self.scripts
            .get(&name)
            .unwrap_or_else(|| unreachable!("registry is loaded with all scripts"))
    }
}

/// Replaces each `-- $include(name)` marker with the named helper's source.
fn splice_includes(script: ScriptName, raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find(INCLUDE_OPEN) {
        let after_marker = &rest[open + INCLUDE_OPEN.len()..];
        let Some(close) = after_marker.find(')') else {
            return Err(Error::ScriptLoad {
                message: format!("{script}: unterminated $include marker"),
            });
        };
        let include_name = &after_marker[..close];

        let Some((_, body)) = INCLUDES.iter().find(|(name, _)| *name == include_name) else {
            return Err(Error::ScriptLoad {
                message: format!("{script}: unknown include '{include_name}'"),
            });
        };

        out.push_str(&rest[..open]);
        out.push_str(body);
        rest = &after_marker[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_loads_all_scripts() {
        let registry = ScriptRegistry::load().unwrap();
        for name in ScriptName::ALL {
            let script = registry.get(name);
            assert_eq!(script.name(), name);
            assert!(!script.source().is_empty());
        }
    }

    #[test]
    fn update_script_splices_its_include() {
        let registry = ScriptRegistry::load().unwrap();
        let source = registry.get(ScriptName::UpdateDebounce).source();

        assert!(!source.contains("$include"), "marker must be spliced away");
        assert!(source.contains("local function get_queue_item"));
    }

    #[test]
    fn scripts_without_markers_load_verbatim() {
        let registry = ScriptRegistry::load().unwrap();
        assert_eq!(
            registry.get(ScriptName::StartExecution).source(),
            START_EXECUTION_SOURCE
        );
    }

    #[test]
    fn unknown_include_is_a_load_error() {
        let err = splice_includes(ScriptName::NewDebounce, "-- $include(missing.lua)\n")
            .unwrap_err();
        assert!(err.to_string().contains("unknown include"));
    }

    #[test]
    fn unterminated_marker_is_a_load_error() {
        let err = splice_includes(ScriptName::NewDebounce, "-- $include(oops").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }
}
