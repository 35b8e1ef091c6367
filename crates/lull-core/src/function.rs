//! The slice of a function definition the execution plane consumes.

use serde::{Deserialize, Serialize};

use crate::id::FunctionId;

/// A deployed function definition.
///
/// Only the fields the execution plane needs are represented here; the full
/// definition (triggers, steps, concurrency) lives with the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// The function's stable identifier.
    pub id: FunctionId,

    /// Human-readable slug, e.g. `"send-cart-reminder"`.
    pub name: String,

    /// Version of the definition, bumped on each deploy.
    pub version: i32,

    /// Debounce configuration, if the function debounces its trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<Debounce>,
}

impl Function {
    /// Creates a function definition without a debounce config.
    #[must_use]
    pub fn new(id: FunctionId, name: impl Into<String>, version: i32) -> Self {
        Self {
            id,
            name: name.into(),
            version,
            debounce: None,
        }
    }

    /// Attaches a debounce configuration.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Debounce) -> Self {
        self.debounce = Some(debounce);
        self
    }
}

/// Debounce configuration for a function.
///
/// Durations are Go-style strings (`"30s"`, `"5m"`) as written in function
/// definitions; parsing happens at the point of use so an invalid period
/// surfaces as a configuration error on the triggering path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debounce {
    /// The quiet period that must elapse with no matching events before the
    /// function runs.
    pub period: String,

    /// Hard ceiling on how long a window may keep extending, as a duration
    /// from window creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Expression grouping events into windows, evaluated against
    /// `{"event": ...}`. Absent means one window per function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Debounce {
    /// Creates a debounce config with just a period.
    #[must_use]
    pub fn new(period: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            timeout: None,
            key: None,
        }
    }

    /// Sets the hard timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Sets the grouping key expression.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_builder_attaches_debounce() {
        let function = Function::new(FunctionId::generate(), "send-cart-reminder", 3)
            .with_debounce(Debounce::new("30s").with_timeout("10m").with_key("event.data.cart_id"));

        let debounce = function.debounce.expect("debounce config");
        assert_eq!(debounce.period, "30s");
        assert_eq!(debounce.timeout.as_deref(), Some("10m"));
        assert_eq!(debounce.key.as_deref(), Some("event.data.cart_id"));
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let function = Function::new(FunctionId::generate(), "fn", 1);
        let json = serde_json::to_string(&function).unwrap();
        assert!(!json.contains("debounce"));
    }
}
