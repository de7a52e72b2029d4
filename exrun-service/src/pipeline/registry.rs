// Unit Registry
// Maps unit identifiers to the factories that build them

use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::descriptor::{UnitDescriptor, UnitParams};
use crate::pipeline::runner::Unit;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builds a unit from its constructor arguments
pub type UnitFactory = Arc<dyn Fn(&UnitParams) -> ServiceResult<Box<dyn Unit>> + Send + Sync>;

/// Registry of known units.
///
/// A unit registered as `exrun.units.RunShell` is also reachable as
/// `RunShell` unless another unit already took that short name. The
/// dotted prefixes (`exrun`, `exrun.units`) are known namespaces: they
/// resolve, but not to a unit.
#[derive(Clone, Default)]
pub struct UnitRegistry {
    factories: HashMap<String, UnitFactory>,
    namespaces: HashSet<String>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in unit
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::units::register_builtins(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, identifier: &str, factory: F)
    where
        F: Fn(&UnitParams) -> ServiceResult<Box<dyn Unit>> + Send + Sync + 'static,
    {
        let factory: UnitFactory = Arc::new(factory);

        if let Some((namespace, short)) = identifier.rsplit_once('.') {
            let mut prefix = String::new();
            for part in namespace.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                self.namespaces.insert(prefix.clone());
            }
            self.factories
                .entry(short.to_string())
                .or_insert_with(|| factory.clone());
        }

        self.factories.insert(identifier.to_string(), factory);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the unit a descriptor names
    pub fn create(&self, descriptor: &UnitDescriptor) -> ServiceResult<Box<dyn Unit>> {
        let identifier = descriptor.identifier.as_str();
        match self.factories.get(identifier) {
            Some(factory) => factory(&descriptor.params),
            None if self.namespaces.contains(identifier) => Err(ServiceError::unit_load(
                identifier,
                "names a namespace, not a unit",
            )),
            None => Err(ServiceError::unit_load(identifier, "unknown unit")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::PipelineState;
    use serde_json::json;

    struct Marker {
        label: String,
    }

    #[async_trait::async_trait]
    impl Unit for Marker {
        fn name(&self) -> &str {
            "Marker"
        }

        async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
            state.document["marker"] = json!(self.label);
            Ok(())
        }
    }

    fn registry() -> UnitRegistry {
        let mut registry = UnitRegistry::new();
        registry.register("lab.units.Marker", |params: &UnitParams| {
            params.check("Marker", &["label"])?;
            let label = params.string("Marker", 0, "label")?.unwrap_or_default();
            Ok(Box::new(Marker { label }) as Box<dyn Unit>)
        });
        registry
    }

    #[test]
    fn test_qualified_and_short_names() {
        let registry = registry();
        assert!(registry.contains("lab.units.Marker"));
        assert!(registry.contains("Marker"));
        assert_eq!(registry.identifiers(), vec!["Marker", "lab.units.Marker"]);
    }

    #[test]
    fn test_create_passes_params() {
        let registry = registry();
        let descriptor = UnitDescriptor::parse("Marker('a')").unwrap();
        assert!(registry.create(&descriptor).is_ok());

        let descriptor = UnitDescriptor::parse("Marker('a', 'b')").unwrap();
        assert!(matches!(
            registry.create(&descriptor),
            Err(ServiceError::UnitLoad { .. })
        ));
    }

    #[test]
    fn test_unknown_and_namespace_identifiers() {
        let registry = registry();

        match registry.create(&UnitDescriptor::parse("Missing").unwrap()) {
            Err(ServiceError::UnitLoad { reason, .. }) => assert_eq!(reason, "unknown unit"),
            other => panic!("unexpected: {:?}", other.map(|u| u.name().to_string())),
        }

        match registry.create(&UnitDescriptor::parse("lab.units").unwrap()) {
            Err(ServiceError::UnitLoad { reason, .. }) => assert!(reason.contains("namespace")),
            other => panic!("unexpected: {:?}", other.map(|u| u.name().to_string())),
        }
    }

    #[test]
    fn test_short_name_is_first_come() {
        let mut registry = registry();
        registry.register("other.Marker", |_: &UnitParams| {
            Ok(Box::new(Marker {
                label: "other".to_string(),
            }) as Box<dyn Unit>)
        });

        assert!(registry.contains("other.Marker"));
        assert!(registry.contains("lab.units.Marker"));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = UnitRegistry::with_builtins();
        for name in [
            "ExplodeAndRun",
            "RunShell",
            "WriteConfigToFile",
            "ReplaceConfigFromFile",
            "MakeAndCdTempDir",
            "PrintCurrentJson",
            "PrintExplodedJsons",
            "RecordFailure",
            "exrun.units.RunShell",
        ] {
            assert!(registry.contains(name), "{} missing", name);
        }
    }
}
