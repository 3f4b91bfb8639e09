//! Access-filtered search repository.
//!
//! `AclSearchRepository` wraps the unfiltered base repository and ANDs the
//! caller's ACL filter onto every listing, search and count before the request
//! reaches the search client. Callers never pass the filter themselves.
//!
//! # Unfiltered paths
//!
//! Under the default [`UnfilteredReads::Delegate`] policy, `find_by_id`,
//! `exists_by_id`, `search_query` and `search_similar` go to the search client
//! without the ACL filter. A caller who knows an id can read the record
//! regardless of its filter. Set [`UnfilteredReads::Enforce`] to filter these
//! paths as well.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sieve_core::{
    Entity, EntityMetadata, EntityType, Filter, Page, PageRequest, Query, RepositoryConfig,
    SearchQuery, SieveResult, Sort, UnfilteredReads,
};

use crate::operations::SearchOperations;
use crate::provider::AclFilterProvider;
use crate::repository::SearchRepository;
use crate::simple::SimpleSearchRepository;

/// Repository over one entity type whose reads are scoped by an ACL filter.
pub struct AclSearchRepository<E: Entity, S: SearchOperations> {
    base: SimpleSearchRepository<E, S>,
    filter_provider: Arc<dyn AclFilterProvider>,
    config: RepositoryConfig,
}

impl<E: Entity, S: SearchOperations> AclSearchRepository<E, S> {
    /// Create a repository with explicit metadata and the default config.
    pub fn new(
        metadata: EntityMetadata<E>,
        operations: Arc<S>,
        filter_provider: Arc<dyn AclFilterProvider>,
    ) -> Self {
        Self::with_config(metadata, operations, filter_provider, RepositoryConfig::default())
    }

    /// Create a repository with metadata derived from `E`.
    pub fn for_entity(operations: Arc<S>, filter_provider: Arc<dyn AclFilterProvider>) -> Self {
        Self::new(EntityMetadata::new(), operations, filter_provider)
    }

    /// Create a repository with explicit metadata and config.
    pub fn with_config(
        metadata: EntityMetadata<E>,
        operations: Arc<S>,
        filter_provider: Arc<dyn AclFilterProvider>,
        config: RepositoryConfig,
    ) -> Self {
        if config.unfiltered_reads == UnfilteredReads::Delegate {
            tracing::warn!(
                entity_type = %metadata.entity_type(),
                "ACL filter not applied to find_by_id, exists_by_id, search_query and search_similar"
            );
        }
        Self {
            base: SimpleSearchRepository::new(metadata, operations),
            filter_provider,
            config,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn metadata(&self) -> &EntityMetadata<E> {
        self.base.metadata()
    }

    pub fn entity_type(&self) -> &EntityType {
        self.base.entity_type()
    }

    /// Resolve the ACL filter for this entity type. Never cached.
    fn acl_filter(&self) -> SieveResult<Filter> {
        let filter = self.filter_provider.filter_for(self.entity_type())?;
        tracing::debug!(
            entity_type = %self.entity_type(),
            filter = %filter,
            "Using ACL filter"
        );
        Ok(filter)
    }

    /// `query AND acl_filter()`.
    fn filtered(&self, query: Query) -> SieveResult<Query> {
        Ok(Query::filtered(query, self.acl_filter()?))
    }

    fn enforces_all_reads(&self) -> bool {
        self.config.enforces_all_reads()
    }
}

impl<E: Entity, S: SearchOperations> fmt::Display for AclSearchRepository<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AclSearchRepository<{}>", self.entity_type())
    }
}

#[async_trait]
impl<E: Entity, S: SearchOperations> SearchRepository<E> for AclSearchRepository<E, S> {
    async fn find_by_id(&self, id: &E::Id) -> SieveResult<Option<E>> {
        if !self.enforces_all_reads() {
            return self.base.find_by_id(id).await;
        }
        let id = self.metadata().id_string(id);
        let query = SearchQuery::of(self.filtered(Query::ids([id]))?);
        let found = self
            .base
            .operations()
            .query_for_list::<E>(&query, self.entity_type())
            .await?;
        Ok(found.into_iter().next())
    }

    async fn exists_by_id(&self, id: &E::Id) -> SieveResult<bool> {
        if !self.enforces_all_reads() {
            return self.base.exists_by_id(id).await;
        }
        let id = self.metadata().id_string(id);
        let query = SearchQuery::of(self.filtered(Query::ids([id]))?);
        let count = self
            .base
            .operations()
            .count(&query, self.entity_type())
            .await?;
        Ok(count > 0)
    }

    async fn find_all_paged(&self, pageable: PageRequest) -> SieveResult<Page<E>> {
        let query = SearchQuery::builder()
            .with_query(self.filtered(Query::MatchAll)?)
            .with_pageable(pageable)
            .build();
        self.base
            .operations()
            .query_for_page(&query, self.entity_type())
            .await
    }

    async fn find_all_sorted(&self, sort: Sort) -> SieveResult<Vec<E>> {
        let query = self.filtered(Query::MatchAll)?;
        self.base.find_sorted(query, sort).await
    }

    async fn find_all_by_ids(&self, ids: Option<Vec<E::Id>>) -> SieveResult<Vec<E>> {
        let ids = self.metadata().id_strings(ids)?;
        let query = SearchQuery::of(self.filtered(Query::ids(ids))?);
        self.base
            .operations()
            .query_for_list(&query, self.entity_type())
            .await
    }

    async fn search(&self, query: Query) -> SieveResult<Vec<E>> {
        let query = self.filtered(query)?;
        self.base.search(query).await
    }

    async fn search_paged(&self, query: Query, pageable: PageRequest) -> SieveResult<Page<E>> {
        let query = self.filtered(query)?;
        self.base.search_paged(query, pageable).await
    }

    async fn search_query(&self, query: SearchQuery) -> SieveResult<Page<E>> {
        if !self.enforces_all_reads() {
            return self.base.search_query(query).await;
        }
        let query = query.filtered(self.acl_filter()?);
        self.base.search_query(query).await
    }

    async fn search_similar(
        &self,
        entity: Option<&E>,
        fields: Option<&[&str]>,
        pageable: Option<PageRequest>,
    ) -> SieveResult<Page<E>> {
        let query = self.base.more_like_this_query(entity, fields, pageable)?;
        let query = if self.enforces_all_reads() {
            query.with_filter(self.acl_filter()?)
        } else {
            query
        };
        self.base
            .operations()
            .more_like_this(&query, self.entity_type())
            .await
    }

    async fn count(&self) -> SieveResult<u64> {
        let query = SearchQuery::of(self.filtered(Query::MatchAll)?);
        self.base
            .operations()
            .count(&query, self.entity_type())
            .await
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Builds ACL-filtered repositories sharing one search client, one filter
/// provider and one config.
pub struct AclRepositoryFactory<S: SearchOperations> {
    operations: Arc<S>,
    filter_provider: Arc<dyn AclFilterProvider>,
    config: RepositoryConfig,
}

impl<S: SearchOperations> AclRepositoryFactory<S> {
    /// Create a factory with the default config.
    pub fn new(operations: Arc<S>, filter_provider: Arc<dyn AclFilterProvider>) -> Self {
        Self {
            operations,
            filter_provider,
            config: RepositoryConfig::default(),
        }
    }

    /// Set the config handed to every repository built afterwards.
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Repository for `E` with metadata derived from the type.
    pub fn repository<E: Entity>(&self) -> AclSearchRepository<E, S> {
        self.repository_with(EntityMetadata::new())
    }

    /// Repository for `E` with explicit metadata.
    pub fn repository_with<E: Entity>(&self, metadata: EntityMetadata<E>) -> AclSearchRepository<E, S> {
        AclSearchRepository::with_config(
            metadata,
            Arc::clone(&self.operations),
            Arc::clone(&self.filter_provider),
            self.config,
        )
    }
}

impl<S: SearchOperations> Clone for AclRepositoryFactory<S> {
    fn clone(&self) -> Self {
        Self {
            operations: Arc::clone(&self.operations),
            filter_provider: Arc::clone(&self.filter_provider),
            config: self.config,
        }
    }
}
