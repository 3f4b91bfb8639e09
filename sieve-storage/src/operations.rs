//! Search client trait.
//!
//! `SearchOperations` is the boundary to the search engine. Repositories build
//! queries; implementations execute them. Paging, sorting, scoring and
//! network I/O all happen behind this trait.

use async_trait::async_trait;
use sieve_core::{Entity, EntityType, MoreLikeThisQuery, Page, SearchQuery, SieveResult};

/// Generic query-execution primitives over a named entity type.
///
/// Implementations must be thread-safe; repositories share one client
/// across tasks through an `Arc`.
#[async_trait]
pub trait SearchOperations: Send + Sync {
    /// Execute `query` and return one page of matches.
    ///
    /// An unpaged query returns every match in a single page.
    async fn query_for_page<E: Entity>(
        &self,
        query: &SearchQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Page<E>>;

    /// Execute `query` and return the matches as a list.
    async fn query_for_list<E: Entity>(
        &self,
        query: &SearchQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Vec<E>>;

    /// Count the documents matching `query`, ignoring its paging.
    async fn count(&self, query: &SearchQuery, entity_type: &EntityType) -> SieveResult<u64>;

    /// Documents similar to the reference document named by `query`.
    async fn more_like_this<E: Entity>(
        &self,
        query: &MoreLikeThisQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Page<E>>;

    /// Fetch a single document by its string id.
    async fn get_by_id<E: Entity>(
        &self,
        id: &str,
        entity_type: &EntityType,
    ) -> SieveResult<Option<E>>;

    /// Whether a document with this string id exists.
    async fn exists(&self, id: &str, entity_type: &EntityType) -> SieveResult<bool>;
}
