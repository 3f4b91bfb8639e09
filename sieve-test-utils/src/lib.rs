//! SIEVE Test Utilities
//!
//! Centralized test infrastructure for the SIEVE workspace:
//! - Sample entity types and seeded search engines
//! - A recording search client and a counting filter provider, both able to
//!   inject failures
//! - Proptest generators for filters, queries and page requests
//! - Custom assertions for SIEVE-specific validation

// Re-export the engine from its source crate
pub use sieve_storage::InMemorySearchOperations;

// Re-export core types for convenience
pub use sieve_core::{
    Direction, Entity, EntityMetadata, EntityType, Filter, FilterError, FilterOperator,
    MoreLikeThisQuery, Page, PageRequest, Query, SearchError, SearchQuery, SieveError,
    SieveResult, Sort, ValidationError,
};

use async_trait::async_trait;
use sieve_storage::{AclFilterProvider, SearchOperations};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

// ============================================================================
// RECORDING SEARCH CLIENT
// ============================================================================

/// One request received by [`RecordingSearchOperations`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCall {
    QueryForPage {
        entity_type: EntityType,
        query: SearchQuery,
    },
    QueryForList {
        entity_type: EntityType,
        query: SearchQuery,
    },
    Count {
        entity_type: EntityType,
        query: SearchQuery,
    },
    MoreLikeThis {
        entity_type: EntityType,
        query: MoreLikeThisQuery,
    },
    GetById {
        entity_type: EntityType,
        id: String,
    },
    Exists {
        entity_type: EntityType,
        id: String,
    },
}

impl SearchCall {
    /// The query of a query-carrying call.
    pub fn query(&self) -> Option<&Query> {
        match self {
            SearchCall::QueryForPage { query, .. }
            | SearchCall::QueryForList { query, .. }
            | SearchCall::Count { query, .. } => Some(&query.query),
            _ => None,
        }
    }

    /// The full search request of a query-carrying call.
    pub fn search_query(&self) -> Option<&SearchQuery> {
        match self {
            SearchCall::QueryForPage { query, .. }
            | SearchCall::QueryForList { query, .. }
            | SearchCall::Count { query, .. } => Some(query),
            _ => None,
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        match self {
            SearchCall::QueryForPage { entity_type, .. }
            | SearchCall::QueryForList { entity_type, .. }
            | SearchCall::Count { entity_type, .. }
            | SearchCall::MoreLikeThis { entity_type, .. }
            | SearchCall::GetById { entity_type, .. }
            | SearchCall::Exists { entity_type, .. } => entity_type,
        }
    }

    /// Short name of the operation (`"count"`, `"query_for_page"`, ...).
    pub fn operation(&self) -> &'static str {
        match self {
            SearchCall::QueryForPage { .. } => "query_for_page",
            SearchCall::QueryForList { .. } => "query_for_list",
            SearchCall::Count { .. } => "count",
            SearchCall::MoreLikeThis { .. } => "more_like_this",
            SearchCall::GetById { .. } => "get_by_id",
            SearchCall::Exists { .. } => "exists",
        }
    }
}

/// Search client that records every request before executing it on an
/// in-memory engine.
///
/// With a failure set, every request is still recorded and then fails with a
/// clone of that error.
#[derive(Debug, Default)]
pub struct RecordingSearchOperations {
    engine: InMemorySearchOperations,
    calls: Mutex<Vec<SearchCall>>,
    failure: Mutex<Option<SieveError>>,
}

impl RecordingSearchOperations {
    /// Create a recorder over an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder over an existing engine.
    pub fn with_engine(engine: InMemorySearchOperations) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }

    /// The wrapped engine, for indexing fixtures.
    pub fn engine(&self) -> &InMemorySearchOperations {
        &self.engine
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forget recorded requests.
    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fail every subsequent request with `error`.
    pub fn fail_with(&self, error: impl Into<SieveError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
    }

    /// Stop injecting failures.
    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn record(&self, call: SearchCall) -> SieveResult<()> {
        self.calls
            .lock()
            .map_err(|_| SearchError::LockPoisoned)?
            .push(call);
        match self
            .failure
            .lock()
            .map_err(|_| SearchError::LockPoisoned)?
            .as_ref()
        {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SearchOperations for RecordingSearchOperations {
    async fn query_for_page<E: Entity>(
        &self,
        query: &SearchQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Page<E>> {
        self.record(SearchCall::QueryForPage {
            entity_type: entity_type.clone(),
            query: query.clone(),
        })?;
        self.engine.query_for_page(query, entity_type).await
    }

    async fn query_for_list<E: Entity>(
        &self,
        query: &SearchQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Vec<E>> {
        self.record(SearchCall::QueryForList {
            entity_type: entity_type.clone(),
            query: query.clone(),
        })?;
        self.engine.query_for_list(query, entity_type).await
    }

    async fn count(&self, query: &SearchQuery, entity_type: &EntityType) -> SieveResult<u64> {
        self.record(SearchCall::Count {
            entity_type: entity_type.clone(),
            query: query.clone(),
        })?;
        self.engine.count(query, entity_type).await
    }

    async fn more_like_this<E: Entity>(
        &self,
        query: &MoreLikeThisQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Page<E>> {
        self.record(SearchCall::MoreLikeThis {
            entity_type: entity_type.clone(),
            query: query.clone(),
        })?;
        self.engine.more_like_this(query, entity_type).await
    }

    async fn get_by_id<E: Entity>(
        &self,
        id: &str,
        entity_type: &EntityType,
    ) -> SieveResult<Option<E>> {
        self.record(SearchCall::GetById {
            entity_type: entity_type.clone(),
            id: id.to_string(),
        })?;
        self.engine.get_by_id(id, entity_type).await
    }

    async fn exists(&self, id: &str, entity_type: &EntityType) -> SieveResult<bool> {
        self.record(SearchCall::Exists {
            entity_type: entity_type.clone(),
            id: id.to_string(),
        })?;
        self.engine.exists(id, entity_type).await
    }
}

// ============================================================================
// COUNTING FILTER PROVIDER
// ============================================================================

/// Filter provider returning one settable filter and counting how often it
/// is asked.
#[derive(Debug)]
pub struct CountingFilterProvider {
    filter: Mutex<Filter>,
    failure: Mutex<Option<SieveError>>,
    requested: Mutex<Vec<EntityType>>,
    calls: AtomicUsize,
}

impl CountingFilterProvider {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter: Mutex::new(filter),
            failure: Mutex::new(None),
            requested: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the filter returned from now on.
    pub fn set_filter(&self, filter: Filter) {
        *self.filter.lock().unwrap_or_else(PoisonError::into_inner) = filter;
    }

    /// Fail every subsequent resolution with `error`.
    pub fn fail_with(&self, error: impl Into<SieveError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of resolutions, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Entity types asked for, in order.
    pub fn requested_types(&self) -> Vec<EntityType> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AclFilterProvider for CountingFilterProvider {
    fn filter_for(&self, entity_type: &EntityType) -> SieveResult<Filter> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .map_err(|_| FilterError::LockPoisoned)?
            .push(entity_type.clone());
        if let Some(error) = self
            .failure
            .lock()
            .map_err(|_| FilterError::LockPoisoned)?
            .as_ref()
        {
            return Err(error.clone());
        }
        Ok(self
            .filter
            .lock()
            .map_err(|_| FilterError::LockPoisoned)?
            .clone())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Sample entity types and pre-seeded engines.

    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Lifecycle state of an [`Order`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum OrderStatus {
        Pending,
        Shipped,
        Cancelled,
    }

    /// Customer order owned by one user.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Order {
        pub id: u64,
        pub owner: String,
        pub status: OrderStatus,
        pub total: f64,
        pub description: String,
        pub placed_at: DateTime<Utc>,
    }

    impl Entity for Order {
        type Id = u64;

        fn entity_type() -> EntityType {
            EntityType::new("Order")
        }

        fn id(&self) -> &u64 {
            &self.id
        }
    }

    impl Order {
        /// Pending order placed `id` days after the epoch.
        pub fn new(id: u64, owner: &str, total: f64, description: &str) -> Self {
            Self {
                id,
                owner: owner.to_string(),
                status: OrderStatus::Pending,
                total,
                description: description.to_string(),
                placed_at: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(id as i64),
            }
        }

        pub fn with_status(mut self, status: OrderStatus) -> Self {
            self.status = status;
            self
        }
    }

    /// Invoice keyed by UUID.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Invoice {
        pub id: Uuid,
        pub order_id: u64,
        pub owner: String,
        pub amount: f64,
    }

    impl Entity for Invoice {
        type Id = Uuid;

        fn entity_type() -> EntityType {
            EntityType::new("Invoice")
        }

        fn id(&self) -> &Uuid {
            &self.id
        }
    }

    impl Invoice {
        pub fn for_order(order: &Order) -> Self {
            Self {
                id: Uuid::now_v7(),
                order_id: order.id,
                owner: order.owner.clone(),
                amount: order.total,
            }
        }
    }

    /// Five orders: three owned by alice, one each by bob and carol.
    pub fn sample_orders() -> Vec<Order> {
        vec![
            Order::new(1, "alice", 120.0, "Blue ceramic teapot"),
            Order::new(2, "bob", 35.5, "Garden hose with brass nozzle")
                .with_status(OrderStatus::Shipped),
            Order::new(3, "alice", 80.0, "Ceramic mugs set of four")
                .with_status(OrderStatus::Shipped),
            Order::new(4, "carol", 15.0, "Teapot replacement lid")
                .with_status(OrderStatus::Cancelled),
            Order::new(5, "alice", 300.0, "Standing desk frame"),
        ]
    }

    /// ACL filter scoping orders to alice.
    pub fn alice_filter() -> Filter {
        Filter::eq("owner", "alice")
    }

    /// Recording client over an engine holding [`sample_orders`].
    pub fn seeded_operations() -> SieveResult<RecordingSearchOperations> {
        let operations = RecordingSearchOperations::new();
        operations
            .engine()
            .index_all(&EntityMetadata::<Order>::new(), &sample_orders())?;
        Ok(operations)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SIEVE filters, queries and paging.

    use super::fixtures::Order;
    use super::*;
    use proptest::prelude::*;

    const OWNERS: &[&str] = &["alice", "bob", "carol"];
    const STATUSES: &[&str] = &["pending", "shipped", "cancelled"];
    const WORDS: &[&str] = &["teapot", "ceramic", "desk", "garden"];

    pub fn arb_owner() -> impl Strategy<Value = String> {
        proptest::sample::select(OWNERS).prop_map(str::to_string)
    }

    pub fn arb_entity_type() -> impl Strategy<Value = EntityType> {
        "[A-Z][a-z]{2,10}".prop_map(|name| EntityType::named(name))
    }

    /// Leaf filters over the [`Order`] fields.
    pub fn arb_leaf_filter() -> impl Strategy<Value = Filter> {
        prop_oneof![
            Just(Filter::MatchAll),
            Just(Filter::MatchNone),
            arb_owner().prop_map(|owner| Filter::eq("owner", owner)),
            arb_owner().prop_map(|owner| Filter::ne("owner", owner)),
            (0.0f64..400.0).prop_map(|total| Filter::field(
                "total",
                FilterOperator::Gt,
                serde_json::json!(total)
            )),
            proptest::sample::select(STATUSES).prop_map(|status| Filter::eq("status", status)),
            Just(Filter::exists("description")),
        ]
    }

    /// Filter trees up to three levels deep.
    pub fn arb_filter() -> impl Strategy<Value = Filter> {
        arb_leaf_filter().prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3)
                    .prop_map(|filters| Filter::And { filters }),
                prop::collection::vec(inner.clone(), 1..3)
                    .prop_map(|filters| Filter::Or { filters }),
                inner.prop_map(Filter::negate),
            ]
        })
    }

    /// Base queries over the [`Order`] fields.
    pub fn arb_query() -> impl Strategy<Value = Query> {
        prop_oneof![
            Just(Query::MatchAll),
            arb_order_ids().prop_map(|ids| Query::ids(ids.iter().map(u64::to_string))),
            arb_owner().prop_map(|owner| Query::term("owner", owner)),
            proptest::sample::select(WORDS).prop_map(|word| Query::text(word)),
        ]
    }

    pub fn arb_order_ids() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(1u64..8, 0..6)
    }

    pub fn arb_sort() -> impl Strategy<Value = Sort> {
        prop_oneof![
            Just(Sort::unsorted()),
            Just(Sort::by("total")),
            Just(Sort::by_desc("placed_at")),
            Just(Sort::by("owner").then("id", Direction::Desc)),
        ]
    }

    pub fn arb_page_request() -> impl Strategy<Value = PageRequest> {
        (0usize..4, 1usize..8, arb_sort()).prop_filter_map(
            "page size is at least one",
            |(page, size, sort)| PageRequest::with_sort(page, size, sort).ok(),
        )
    }

    pub fn arb_order() -> impl Strategy<Value = Order> {
        (1u64..1000, arb_owner(), 0.0f64..500.0, "[a-z]{3,8}( [a-z]{3,8}){0,3}").prop_map(
            |(id, owner, total, description)| Order::new(id, &owner, total, &description),
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for SIEVE results and composed queries.

    use super::*;

    /// Assert that a result is an invalid-argument error naming `parameter`.
    #[track_caller]
    pub fn assert_invalid_argument<T: std::fmt::Debug>(result: &SieveResult<T>, parameter: &str) {
        match result {
            Err(SieveError::Validation(ValidationError::InvalidArgument {
                parameter: actual,
                ..
            })) => assert_eq!(actual, parameter, "Wrong parameter in InvalidArgument error"),
            other => panic!("Expected InvalidArgument for '{}', got: {:?}", parameter, other),
        }
    }

    /// Assert that `query` is `filtered(base, filter)` and return `base`.
    #[track_caller]
    pub fn assert_filtered<'a>(query: &'a Query, filter: &Filter) -> &'a Query {
        match query {
            Query::Filtered {
                query: base,
                filter: actual,
            } => {
                assert_eq!(actual, filter, "Wrong ACL filter on composed query");
                base
            }
            other => panic!("Expected filtered query with {}, got: {}", filter, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
