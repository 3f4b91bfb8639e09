//! ACL filter providers.
//!
//! A provider maps an entity type to the filter scoping what the current
//! caller may see. Repositories ask on every call and never cache the answer,
//! so a provider may change its answer between calls.

use sieve_core::{EntityType, FallbackFilter, Filter, FilterError, RepositoryConfig, SieveResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolves the ACL filter for an entity type.
pub trait AclFilterProvider: Send + Sync {
    /// The filter to AND onto every query against `entity_type`.
    fn filter_for(&self, entity_type: &EntityType) -> SieveResult<Filter>;
}

impl<P: AclFilterProvider + ?Sized> AclFilterProvider for Arc<P> {
    fn filter_for(&self, entity_type: &EntityType) -> SieveResult<Filter> {
        (**self).filter_for(entity_type)
    }
}

/// Static registry of filters keyed by entity type.
///
/// Types without a registration resolve through the configured
/// [`FallbackFilter`].
#[derive(Debug, Default)]
pub struct RegistryFilterProvider {
    filters: RwLock<HashMap<EntityType, Filter>>,
    fallback: FallbackFilter,
}

impl RegistryFilterProvider {
    /// Create an empty registry with the default fallback (allow all).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with `fallback` for unregistered types.
    pub fn with_fallback(fallback: FallbackFilter) -> Self {
        Self {
            filters: RwLock::new(HashMap::new()),
            fallback,
        }
    }

    /// Create an empty registry using the fallback from `config`.
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::with_fallback(config.fallback_filter)
    }

    /// Builder-style registration.
    pub fn with_filter(self, entity_type: EntityType, filter: Filter) -> SieveResult<Self> {
        self.register(entity_type, filter)?;
        Ok(self)
    }

    /// Register or replace the filter for `entity_type`.
    ///
    /// Returns the previously registered filter, if any.
    pub fn register(&self, entity_type: EntityType, filter: Filter) -> SieveResult<Option<Filter>> {
        let mut filters = self
            .filters
            .write()
            .map_err(|_| FilterError::LockPoisoned)?;
        Ok(filters.insert(entity_type, filter))
    }

    /// Remove the filter for `entity_type`.
    pub fn unregister(&self, entity_type: &EntityType) -> SieveResult<Option<Filter>> {
        let mut filters = self
            .filters
            .write()
            .map_err(|_| FilterError::LockPoisoned)?;
        Ok(filters.remove(entity_type))
    }

    /// Entity types with an explicit registration, sorted by name.
    pub fn registered_types(&self) -> SieveResult<Vec<EntityType>> {
        let filters = self
            .filters
            .read()
            .map_err(|_| FilterError::LockPoisoned)?;
        let mut types: Vec<EntityType> = filters.keys().cloned().collect();
        types.sort();
        Ok(types)
    }

    /// The fallback applied to unregistered types.
    pub fn fallback(&self) -> FallbackFilter {
        self.fallback
    }
}

impl AclFilterProvider for RegistryFilterProvider {
    fn filter_for(&self, entity_type: &EntityType) -> SieveResult<Filter> {
        let filters = self
            .filters
            .read()
            .map_err(|_| FilterError::LockPoisoned)?;
        if let Some(filter) = filters.get(entity_type) {
            return Ok(filter.clone());
        }
        match self.fallback {
            FallbackFilter::AllowAll => Ok(Filter::MatchAll),
            FallbackFilter::DenyAll => Ok(Filter::MatchNone),
            FallbackFilter::Reject => Err(FilterError::NotRegistered {
                entity_type: entity_type.to_string(),
            }
            .into()),
        }
    }
}
