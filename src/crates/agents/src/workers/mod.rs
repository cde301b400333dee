//! Built-in worker types
//!
//! Fixed-lookup-table classification and enrichment agents. These exist to
//! give the registry constructible capability sets out of the box; the
//! tables are deliberately small and the heuristics deliberately simple.

pub mod classifier;
pub mod enricher;

pub use classifier::ClassifierAgent;
pub use enricher::EnricherAgent;

use crate::registry::AgentRegistry;
use crate::Result;

/// Register the built-in agent types on a registry
pub fn register_builtin_types(registry: &AgentRegistry) -> Result<()> {
    registry.register_type("classifier", classifier::factory)?;
    registry.register_type("enricher", enricher::factory)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::task::Task;
    use serde_json::json;

    #[tokio::test]
    async fn test_builtin_types_register_and_run() {
        let registry = AgentRegistry::with_defaults();
        register_builtin_types(&registry).unwrap();

        registry.create("classifier", "cls-1", AgentConfig::new()).unwrap();
        registry.create("enricher", "enr-1", AgentConfig::new()).unwrap();
        registry.start("cls-1").unwrap();
        registry.start("enr-1").unwrap();

        let classified = registry
            .execute(
                "cls-1",
                Task::new("classify").with_input("description", json!("blue denim jacket")),
            )
            .await
            .unwrap();
        assert_eq!(classified["category"], json!("apparel"));

        let enriched = registry
            .execute(
                "enr-1",
                Task::new("enrich").with_input("description", json!("blue denim jacket")),
            )
            .await
            .unwrap();
        assert!(enriched["word_count"].as_u64().unwrap() >= 3);
    }
}
