//! Entity descriptors and identifier conversion.
//!
//! An [`Entity`] is any serde record stored in a search index. Its
//! [`EntityType`] names the index; [`EntityMetadata`] carries the type plus the
//! single function that turns identifiers into their canonical string form.

use crate::error::{SieveError, SieveResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type tag identifying a kind of entity (e.g. `Order`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType {
    name: Cow<'static, str>,
}

impl EntityType {
    /// Create a type tag from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
        }
    }

    /// Create a type tag from a runtime name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
        }
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the search index holding entities of this type.
    pub fn index_name(&self) -> String {
        self.name.to_lowercase()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A record that can be stored in and retrieved from a search index.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier type. Its `Display` form is the default string id.
    type Id: fmt::Display + Clone + Send + Sync + 'static;

    /// The type tag shared by every instance.
    fn entity_type() -> EntityType;

    /// Identifier of this instance.
    fn id(&self) -> &Self::Id;
}

/// Converts an identifier to its canonical string form.
pub type IdConverter<Id> = Arc<dyn Fn(&Id) -> String + Send + Sync>;

/// Entity type plus identifier conversion for one entity kind.
pub struct EntityMetadata<E: Entity> {
    entity_type: EntityType,
    id_converter: IdConverter<E::Id>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityMetadata<E> {
    /// Metadata derived from `E`, converting ids with their `Display` form.
    pub fn new() -> Self {
        Self {
            entity_type: E::entity_type(),
            id_converter: Arc::new(|id: &E::Id| id.to_string()),
            _entity: PhantomData,
        }
    }

    /// Replace the id conversion function.
    pub fn with_id_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&E::Id) -> String + Send + Sync + 'static,
    {
        self.id_converter = Arc::new(converter);
        self
    }

    /// Override the entity type (e.g. to target an aliased index).
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = entity_type;
        self
    }

    /// The entity type this metadata describes.
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Canonical string form of a single id.
    pub fn id_string(&self, id: &E::Id) -> String {
        (self.id_converter)(id)
    }

    /// Canonical string form of an entity's own id.
    pub fn entity_id_string(&self, entity: &E) -> String {
        self.id_string(entity.id())
    }

    /// Convert every id independently, preserving input order.
    ///
    /// Fails with an invalid-argument error when `ids` is absent.
    pub fn id_strings<I>(&self, ids: Option<I>) -> SieveResult<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Borrow<E::Id>,
    {
        let ids = ids.ok_or_else(|| SieveError::invalid_argument("ids", "ids can't be null."))?;
        Ok(ids
            .into_iter()
            .map(|id| self.id_string(id.borrow()))
            .collect())
    }
}

impl<E: Entity> Default for EntityMetadata<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for EntityMetadata<E> {
    fn clone(&self) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            id_converter: Arc::clone(&self.id_converter),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for EntityMetadata<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("entity_type", &self.entity_type)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
