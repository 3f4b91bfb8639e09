//! Unfiltered base repository.
//!
//! `SimpleSearchRepository` turns repository calls into search requests with
//! no access control. `AclSearchRepository` composes over it and reuses its
//! id lookups and its count-then-fetch unpaged search.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sieve_core::{
    Entity, EntityMetadata, EntityType, MoreLikeThisQuery, Page, PageRequest, Query, SearchQuery,
    SieveError, SieveResult, Sort,
};

use crate::operations::SearchOperations;
use crate::repository::{page_size_for, SearchRepository};

/// Repository over one entity type, executing queries as given.
pub struct SimpleSearchRepository<E: Entity, S: SearchOperations> {
    metadata: EntityMetadata<E>,
    operations: Arc<S>,
}

impl<E: Entity, S: SearchOperations> SimpleSearchRepository<E, S> {
    /// Create a repository with explicit metadata.
    pub fn new(metadata: EntityMetadata<E>, operations: Arc<S>) -> Self {
        Self {
            metadata,
            operations,
        }
    }

    /// Create a repository with metadata derived from `E`.
    pub fn for_entity(operations: Arc<S>) -> Self {
        Self::new(EntityMetadata::new(), operations)
    }

    pub fn metadata(&self) -> &EntityMetadata<E> {
        &self.metadata
    }

    pub fn entity_type(&self) -> &EntityType {
        self.metadata.entity_type()
    }

    pub fn operations(&self) -> &S {
        &self.operations
    }

    /// Similarity request for `entity`, validating the required arguments.
    pub(crate) fn more_like_this_query(
        &self,
        entity: Option<&E>,
        fields: Option<&[&str]>,
        pageable: Option<PageRequest>,
    ) -> SieveResult<MoreLikeThisQuery> {
        let entity = entity.ok_or_else(|| {
            SieveError::invalid_argument("entity", "Cannot search similar records for 'null'.")
        })?;
        let pageable = pageable
            .ok_or_else(|| SieveError::invalid_argument("pageable", "'pageable' cannot be 'null'"))?;

        let query = MoreLikeThisQuery::new(self.metadata.entity_id_string(entity), pageable);
        Ok(match fields {
            Some(fields) => query.with_fields(fields.iter().copied()),
            None => query,
        })
    }

    /// Sorted read of every match of `query`: count, then page 0 sized to
    /// the count. Returns empty without a page query when nothing matches.
    pub(crate) async fn find_sorted(&self, query: Query, sort: Sort) -> SieveResult<Vec<E>> {
        let count = self
            .operations
            .count(&SearchQuery::of(query.clone()), self.entity_type())
            .await?;
        if count == 0 {
            tracing::debug!(entity_type = %self.entity_type(), "No matches, skipping page query");
            return Ok(Vec::new());
        }
        let search = SearchQuery::builder()
            .with_query(query)
            .with_pageable(PageRequest::with_sort(0, page_size_for(count), sort)?)
            .build();
        Ok(self
            .operations
            .query_for_page::<E>(&search, self.entity_type())
            .await?
            .into_content())
    }
}

impl<E: Entity, S: SearchOperations> Clone for SimpleSearchRepository<E, S> {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            operations: Arc::clone(&self.operations),
        }
    }
}

impl<E: Entity, S: SearchOperations> fmt::Display for SimpleSearchRepository<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimpleSearchRepository<{}>", self.entity_type())
    }
}

#[async_trait]
impl<E: Entity, S: SearchOperations> SearchRepository<E> for SimpleSearchRepository<E, S> {
    async fn find_by_id(&self, id: &E::Id) -> SieveResult<Option<E>> {
        let id = self.metadata.id_string(id);
        self.operations.get_by_id(&id, self.entity_type()).await
    }

    async fn exists_by_id(&self, id: &E::Id) -> SieveResult<bool> {
        let id = self.metadata.id_string(id);
        self.operations.exists(&id, self.entity_type()).await
    }

    async fn find_all_paged(&self, pageable: PageRequest) -> SieveResult<Page<E>> {
        let query = SearchQuery::builder()
            .with_query(Query::MatchAll)
            .with_pageable(pageable)
            .build();
        self.operations.query_for_page(&query, self.entity_type()).await
    }

    async fn find_all_sorted(&self, sort: Sort) -> SieveResult<Vec<E>> {
        self.find_sorted(Query::MatchAll, sort).await
    }

    async fn find_all_by_ids(&self, ids: Option<Vec<E::Id>>) -> SieveResult<Vec<E>> {
        let ids = self.metadata.id_strings(ids)?;
        let query = SearchQuery::of(Query::ids(ids));
        self.operations.query_for_list(&query, self.entity_type()).await
    }

    async fn search(&self, query: Query) -> SieveResult<Vec<E>> {
        self.find_sorted(query, Sort::unsorted()).await
    }

    async fn search_paged(&self, query: Query, pageable: PageRequest) -> SieveResult<Page<E>> {
        let query = SearchQuery::builder()
            .with_query(query)
            .with_pageable(pageable)
            .build();
        self.operations.query_for_page(&query, self.entity_type()).await
    }

    async fn search_query(&self, query: SearchQuery) -> SieveResult<Page<E>> {
        self.operations.query_for_page(&query, self.entity_type()).await
    }

    async fn search_similar(
        &self,
        entity: Option<&E>,
        fields: Option<&[&str]>,
        pageable: Option<PageRequest>,
    ) -> SieveResult<Page<E>> {
        let query = self.more_like_this_query(entity, fields, pageable)?;
        self.operations.more_like_this(&query, self.entity_type()).await
    }

    async fn count(&self) -> SieveResult<u64> {
        self.operations
            .count(&SearchQuery::of(Query::MatchAll), self.entity_type())
            .await
    }
}
