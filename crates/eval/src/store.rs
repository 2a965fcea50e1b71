//! Step factories and the registry freezing resolves step names against.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use scl_core::schema::{ERROR_BEHAVIOUR_ENUM, MULTIPLICITY_ENUM, SCL_TYPE_ENUM};
use scl_core::{ErrorBehaviour, ErrorCode, Multiplicity, SchemaPropertyType, SclError, SclObject};
use tracing::warn;

use crate::descriptor::StepDescriptor;
use crate::state::StateMonad;
use crate::step::{serialize_named, CompoundStep};

/// One step type: its signature and how to run it.
#[async_trait]
pub trait StepFactory: Send + Sync {
    fn descriptor(&self) -> &StepDescriptor;

    /// Extra static checks once generics are known, e.g. that compared
    /// values are comparable.
    fn check_types(&self, _step: &CompoundStep) -> Result<(), ErrorCode> {
        Ok(())
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError>;

    fn serialize(&self, step: &CompoundStep) -> String {
        serialize_named(step)
    }
}

// ──────────────────────────────────────────────
// Store
// ──────────────────────────────────────────────

/// Step factories by case-insensitive name or alias, plus the enum types
/// SCL literals may name.
pub struct StepFactoryStore {
    factories: Vec<Arc<dyn StepFactory>>,
    by_name: HashMap<String, usize>,
    enum_types: BTreeMap<String, Vec<String>>,
}

impl StepFactoryStore {
    pub fn builder() -> StepFactoryStoreBuilder {
        StepFactoryStoreBuilder::default()
    }

    /// The built-in catalog and enum types.
    pub fn with_core_steps() -> Self {
        Self::builder().core_steps().build()
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn StepFactory>> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .and_then(|i| self.factories.get(*i))
    }

    /// Every registered factory, in registration order.
    pub fn factories(&self) -> impl Iterator<Item = &Arc<dyn StepFactory>> {
        self.factories.iter()
    }

    /// Canonical enum type name and its members.
    pub fn enum_type(&self, name: &str) -> Option<(&str, &[String])> {
        self.enum_types
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn first_enum_member(&self, name: &str) -> Option<String> {
        self.enum_type(name).and_then(|(_, m)| m.first().cloned())
    }

    pub fn enum_types(&self) -> &BTreeMap<String, Vec<String>> {
        &self.enum_types
    }
}

#[derive(Default)]
pub struct StepFactoryStoreBuilder {
    factories: Vec<Arc<dyn StepFactory>>,
    enum_types: BTreeMap<String, Vec<String>>,
}

impl StepFactoryStoreBuilder {
    pub fn register(mut self, factory: impl StepFactory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn register_enum<I, S>(mut self, name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_types
            .insert(name.to_string(), members.into_iter().map(Into::into).collect());
        self
    }

    /// The built-in step catalog and the enum types its parameters use.
    pub fn core_steps(mut self) -> Self {
        self.factories.extend(crate::steps::core_factories());
        self.register_enum(ERROR_BEHAVIOUR_ENUM, ErrorBehaviour::ALL.iter().map(|b| b.name()))
            .register_enum(MULTIPLICITY_ENUM, Multiplicity::ALL.iter().map(|m| m.name()))
            .register_enum(SCL_TYPE_ENUM, SchemaPropertyType::ALL.iter().map(|t| t.name()))
    }

    pub fn build(self) -> StepFactoryStore {
        let mut by_name = HashMap::new();
        for (i, factory) in self.factories.iter().enumerate() {
            let d = factory.descriptor();
            for name in std::iter::once(&d.name).chain(d.aliases.iter()) {
                if by_name.insert(name.to_ascii_lowercase(), i).is_some() {
                    warn!(step = *name, "step registered twice; the later registration wins");
                }
            }
        }
        StepFactoryStore {
            factories: self.factories,
            by_name,
            enum_types: self.enum_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_follows_aliases() {
        let store = StepFactoryStore::with_core_steps();
        assert_eq!(store.find("print").unwrap().descriptor().name, "Print");
        assert_eq!(store.find("ARRAYLENGTH").unwrap().descriptor().name, "ArrayLength");
        assert_eq!(store.find("ArrayCount").unwrap().descriptor().name, "ArrayLength");
        assert!(store.find("NoSuchStep").is_none());
    }

    #[test]
    fn enum_types_are_registered() {
        let store = StepFactoryStore::with_core_steps();
        let (name, members) = store.enum_type("errorbehaviour").unwrap();
        assert_eq!(name, "ErrorBehaviour");
        assert!(members.iter().any(|m| m == "Skip"));
        assert_eq!(store.first_enum_member("Multiplicity").as_deref(), Some("ExactlyOne"));
    }
}
