//! Shared workflow context and template resolution
//!
//! The context is the workflow-scoped key/value store used for `${name}`
//! template resolution and inter-step data passing. It is guarded by a
//! lock; concurrent writes from one wavefront serialize, and the last
//! write wins on key collision.

use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid")
    })
}

/// Workflow-scoped key/value store shared by all steps
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl WorkflowContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with the given entries
    pub fn from_map(seed: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(seed)),
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Insert a single entry; last write wins
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.inner.write().insert(key.into(), value);
    }

    /// Merge entries into the context; last write wins per key
    pub fn merge(&self, entries: HashMap<String, Value>) {
        let mut inner = self.inner.write();
        for (key, value) in entries {
            inner.insert(key, value);
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().clone()
    }

    /// Resolve `${name}` placeholders in every string value of a task-data map
    ///
    /// Substitution is verbatim: a placeholder whose key is missing from
    /// the context, or whose context value is not a string, passes through
    /// unchanged. Non-string task-data values are never touched.
    pub fn resolve_map(&self, task_data: &HashMap<String, Value>) -> HashMap<String, Value> {
        let inner = self.inner.read();
        task_data
            .iter()
            .map(|(key, value)| (key.clone(), resolve_value(value, &inner)))
            .collect()
    }

    /// Merge a step result into the context
    ///
    /// The raw result is stored under `step_<id>_result`. When the result
    /// is an object, every top-level key not prefixed with `_` is also
    /// flattened directly into the context.
    pub fn merge_step_result(&self, step_id: &str, result: &Value) {
        let mut inner = self.inner.write();
        inner.insert(format!("step_{}_result", step_id), result.clone());

        if let Value::Object(map) = result {
            for (key, value) in map {
                if key.starts_with('_') {
                    continue;
                }
                inner.insert(key.clone(), value.clone());
            }
        }

        debug!(step = step_id, "Merged step result into context");
    }
}

fn resolve_value(value: &Value, context: &HashMap<String, Value>) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };

    let resolved = placeholder_regex().replace_all(text, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match context.get(key) {
            Some(Value::String(replacement)) => replacement.clone(),
            _ => caps[0].to_string(),
        }
    });

    Value::String(resolved.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_resolve_substitutes_string_values() {
        let context = WorkflowContext::from_map(data(&[(
            "product_description",
            json!("foo"),
        )]));

        let resolved = context.resolve_map(&data(&[(
            "description",
            json!("${product_description}"),
        )]));
        assert_eq!(resolved["description"], json!("foo"));
    }

    #[test]
    fn test_resolve_unmatched_key_passes_through() {
        let context = WorkflowContext::new();
        let resolved = context.resolve_map(&data(&[("description", json!("${missing}"))]));
        assert_eq!(resolved["description"], json!("${missing}"));
    }

    #[test]
    fn test_resolve_non_string_context_value_passes_through() {
        let context = WorkflowContext::from_map(data(&[("count", json!(3))]));
        let resolved = context.resolve_map(&data(&[("text", json!("${count} items"))]));
        assert_eq!(resolved["text"], json!("${count} items"));
    }

    #[test]
    fn test_resolve_leaves_non_string_values_alone() {
        let context = WorkflowContext::from_map(data(&[("k", json!("v"))]));
        let resolved = context.resolve_map(&data(&[("limit", json!(10)), ("flags", json!(["${k}"]))]));
        assert_eq!(resolved["limit"], json!(10));
        assert_eq!(resolved["flags"], json!(["${k}"]));
    }

    #[test]
    fn test_resolve_embedded_placeholder() {
        let context = WorkflowContext::from_map(data(&[("name", json!("widget"))]));
        let resolved = context.resolve_map(&data(&[("text", json!("classify the ${name} now"))]));
        assert_eq!(resolved["text"], json!("classify the widget now"));
    }

    #[test]
    fn test_merge_step_result_stores_raw_and_flattens() {
        let context = WorkflowContext::new();
        context.merge_step_result("a", &json!({"category": "apparel", "_debug": "x"}));

        assert_eq!(
            context.get("step_a_result"),
            Some(json!({"category": "apparel", "_debug": "x"}))
        );
        assert_eq!(context.get("category"), Some(json!("apparel")));
        assert_eq!(context.get("_debug"), None, "private keys are not flattened");
    }

    #[test]
    fn test_merge_step_result_non_object() {
        let context = WorkflowContext::new();
        context.merge_step_result("a", &json!(42));
        assert_eq!(context.get("step_a_result"), Some(json!(42)));
        assert_eq!(context.snapshot().len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let context = WorkflowContext::new();
        context.insert("k", json!("first"));
        context.insert("k", json!("second"));
        assert_eq!(context.get("k"), Some(json!("second")));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Strings with no placeholder syntax resolve to themselves.
            #[test]
            fn resolution_is_identity_without_placeholders(text in "[a-zA-Z0-9 .,!-]*") {
                let context = WorkflowContext::from_map(
                    [("key".to_string(), serde_json::json!("value"))].into_iter().collect(),
                );
                let input: HashMap<String, Value> =
                    [("t".to_string(), Value::String(text.clone()))].into_iter().collect();
                let resolved = context.resolve_map(&input);
                prop_assert_eq!(resolved["t"].clone(), Value::String(text));
            }
        }
    }
}
