//! Read-side repository interface.

use async_trait::async_trait;
use sieve_core::{Entity, Page, PageRequest, Query, SearchQuery, SieveResult, Sort};

/// Read operations over one entity type.
///
/// Callers depend on this trait rather than on a concrete repository, so an
/// ACL-filtered repository can stand in wherever an unfiltered one would.
#[async_trait]
pub trait SearchRepository<E: Entity>: Send + Sync {
    /// Fetch one entity by id.
    async fn find_by_id(&self, id: &E::Id) -> SieveResult<Option<E>>;

    /// Whether an entity with this id exists.
    async fn exists_by_id(&self, id: &E::Id) -> SieveResult<bool>;

    /// Every entity, as one list.
    ///
    /// Counts first and returns an empty list without a page query when there
    /// is nothing to fetch; otherwise reads page 0 sized to the count.
    async fn find_all(&self) -> SieveResult<Vec<E>> {
        let count = self.count().await?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let pageable = PageRequest::new(0, page_size_for(count))?;
        Ok(self.find_all_paged(pageable).await?.into_content())
    }

    /// One page of every entity.
    async fn find_all_paged(&self, pageable: PageRequest) -> SieveResult<Page<E>>;

    /// Every entity, sorted.
    async fn find_all_sorted(&self, sort: Sort) -> SieveResult<Vec<E>>;

    /// The entities with these ids. Fails with invalid-argument when `ids`
    /// is absent.
    async fn find_all_by_ids(&self, ids: Option<Vec<E::Id>>) -> SieveResult<Vec<E>>;

    /// Every entity matching `query`, unpaged.
    async fn search(&self, query: Query) -> SieveResult<Vec<E>>;

    /// One page of entities matching `query`, with facets.
    async fn search_paged(&self, query: Query, pageable: PageRequest) -> SieveResult<Page<E>>;

    /// Execute a fully built search request.
    async fn search_query(&self, query: SearchQuery) -> SieveResult<Page<E>>;

    /// Entities similar to `entity` along `fields` (all text fields when
    /// absent). Fails with invalid-argument when `entity` or `pageable` is
    /// absent.
    async fn search_similar(
        &self,
        entity: Option<&E>,
        fields: Option<&[&str]>,
        pageable: Option<PageRequest>,
    ) -> SieveResult<Page<E>>;

    /// Number of entities.
    async fn count(&self) -> SieveResult<u64>;
}

/// Page size able to hold `count` elements in one page.
pub(crate) fn page_size_for(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX).max(1)
}
