//! Addon discovery

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use cq_core::AddonInitialiser;
use thiserror::Error;
use tracing::debug;

/// An initialiser together with the module name it is registered under
#[derive(Clone)]
pub struct AddonModule {
    pub module_name: String,
    pub initialiser: Arc<dyn AddonInitialiser>,
}

/// A module that could not be loaded
///
/// Load errors are collected and reported; they never stop other modules
/// from loading.
#[derive(Debug, Clone, Error)]
pub enum AddonLoadError {
    #[error("module {module} is invalid: {reason}")]
    InvalidModule { module: String, reason: String },

    #[error("failed to initialise {module}: {reason}")]
    Factory { module: String, reason: String },
}

impl AddonLoadError {
    pub fn module(&self) -> &str {
        match self {
            AddonLoadError::InvalidModule { module, .. } | AddonLoadError::Factory { module, .. } => module,
        }
    }
}

/// Source of addon modules
#[async_trait]
pub trait AddonLoader: Send + Sync {
    async fn discover_addons(&self) -> (Vec<AddonModule>, Vec<AddonLoadError>);
}

/// Builds an initialiser, or explains why it cannot
pub type AddonFactory = Box<dyn Fn() -> Result<Arc<dyn AddonInitialiser>, String> + Send + Sync>;

/// [`AddonLoader`] over modules compiled into the host
#[derive(Default)]
pub struct StaticAddonLoader {
    factories: Vec<(String, AddonFactory)>,
    disabled: HashSet<String>,
}

impl StaticAddonLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module built lazily by `factory` when addons are discovered
    pub fn with_factory<F>(mut self, module_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn AddonInitialiser>, String> + Send + Sync + 'static,
    {
        self.factories.push((module_name.into(), Box::new(factory)));
        self
    }

    /// Add a module from an already built initialiser
    pub fn with_initialiser(
        self,
        module_name: impl Into<String>,
        initialiser: Arc<dyn AddonInitialiser>,
    ) -> Self {
        self.with_factory(module_name, move || Ok(initialiser.clone()))
    }

    /// Skip the named modules during discovery
    pub fn with_disabled<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(modules.into_iter().map(Into::into));
        self
    }

    fn validate(module_name: &str, initialiser: &dyn AddonInitialiser) -> Result<(), String> {
        if module_name.trim().is_empty() {
            return Err("module name is empty".to_string());
        }

        let metadata = initialiser.metadata();
        if metadata.name.trim().is_empty() {
            return Err("initialiser metadata has no name".to_string());
        }

        let mut seen = HashSet::new();
        for input in &metadata.inputs {
            if !seen.insert(input.unique_id.as_str()) {
                return Err(format!("input id {} is declared more than once", input.unique_id));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AddonLoader for StaticAddonLoader {
    async fn discover_addons(&self) -> (Vec<AddonModule>, Vec<AddonLoadError>) {
        let mut modules: Vec<AddonModule> = Vec::new();
        let mut errors = Vec::new();

        for (module_name, factory) in &self.factories {
            if self.disabled.contains(module_name) {
                debug!(module = %module_name, "Skipping disabled addon");
                continue;
            }

            if modules.iter().any(|m| &m.module_name == module_name) {
                errors.push(AddonLoadError::InvalidModule {
                    module: module_name.clone(),
                    reason: "module name is registered more than once".to_string(),
                });
                continue;
            }

            let initialiser = match factory() {
                Ok(initialiser) => initialiser,
                Err(reason) => {
                    errors.push(AddonLoadError::Factory {
                        module: module_name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            if let Err(reason) = Self::validate(module_name, initialiser.as_ref()) {
                errors.push(AddonLoadError::InvalidModule {
                    module: module_name.clone(),
                    reason,
                });
                continue;
            }

            modules.push(AddonModule {
                module_name: module_name.clone(),
                initialiser,
            });
        }

        (modules, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_core::{
        Addon, AddonMetadata, CapabilityError, CapabilityResult, InitialiserMetadata, InputKind,
        UserInput, UserInputValue,
    };

    struct Named(InitialiserMetadata);

    #[async_trait]
    impl AddonInitialiser for Named {
        fn metadata(&self) -> &InitialiserMetadata {
            &self.0
        }

        async fn create_instance(
            &self,
            _metadata: AddonMetadata,
            _inputs: &[UserInputValue],
        ) -> CapabilityResult<Arc<dyn Addon>> {
            Err(CapabilityError::failed("not used"))
        }
    }

    fn named(name: &str) -> Arc<dyn AddonInitialiser> {
        Arc::new(Named(InitialiserMetadata::new(name, "")))
    }

    #[tokio::test]
    async fn test_discovers_in_registration_order() {
        let loader = StaticAddonLoader::new()
            .with_initialiser("lights", named("Lights"))
            .with_initialiser("heating", named("Heating"));

        let (modules, errors) = loader.discover_addons().await;
        assert!(errors.is_empty());
        let names: Vec<&str> = modules.iter().map(|m| m.module_name.as_str()).collect();
        assert_eq!(names, vec!["lights", "heating"]);
    }

    #[tokio::test]
    async fn test_invalid_modules_reported_not_fatal() {
        let duplicate_inputs = InitialiserMetadata::new("Broken", "").with_inputs(vec![
            UserInput::new("host", InputKind::String),
            UserInput::new("host", InputKind::Url),
        ]);

        let loader = StaticAddonLoader::new()
            .with_initialiser("", named("Nameless module"))
            .with_initialiser("unnamed", named(" "))
            .with_initialiser("broken", Arc::new(Named(duplicate_inputs)))
            .with_factory("crashing", || Err("missing driver".to_string()))
            .with_initialiser("lights", named("Lights"))
            .with_initialiser("lights", named("Lights again"));

        let (modules, errors) = loader.discover_addons().await;

        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].initialiser.metadata().name, "Lights");

        let failed: Vec<&str> = errors.iter().map(AddonLoadError::module).collect();
        assert_eq!(failed, vec!["", "unnamed", "broken", "crashing", "lights"]);
        assert!(matches!(errors[3], AddonLoadError::Factory { .. }));
    }

    #[tokio::test]
    async fn test_disabled_modules_skipped() {
        let loader = StaticAddonLoader::new()
            .with_initialiser("lights", named("Lights"))
            .with_initialiser("heating", named("Heating"))
            .with_disabled(["heating"]);

        let (modules, errors) = loader.discover_addons().await;
        assert!(errors.is_empty());
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].module_name, "lights");
    }
}
