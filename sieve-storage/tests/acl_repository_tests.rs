//! Integration tests for the access-filtered repository.
//!
//! Every listing, search and count must reach the search client as
//! `filtered(base, acl_filter)`, with the filter resolved fresh on each call.
//! Id lookups, raw search requests and similarity searches follow the
//! configured unfiltered-reads policy.

use proptest::prelude::*;
use sieve_core::{
    Entity, EntityMetadata, FallbackFilter, Filter, FilterError, PageRequest, Query,
    RepositoryConfig, SearchError, SearchQuery, SieveError, Sort, UnfilteredReads,
};
use sieve_storage::{
    AclFilterProvider, AclRepositoryFactory, AclSearchRepository, InMemorySearchOperations,
    RegistryFilterProvider, SearchRepository, SimpleSearchRepository,
};
use sieve_test_utils::assertions::{assert_filtered, assert_invalid_argument};
use sieve_test_utils::fixtures::{alice_filter, sample_orders, seeded_operations, Invoice, Order};
use sieve_test_utils::{generators, CountingFilterProvider, RecordingSearchOperations, SearchCall};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Runtime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

struct Harness {
    operations: Arc<RecordingSearchOperations>,
    provider: Arc<CountingFilterProvider>,
    repository: AclSearchRepository<Order, RecordingSearchOperations>,
}

fn harness_with(config: RepositoryConfig) -> Harness {
    let operations = Arc::new(seeded_operations().expect("seeding should succeed"));
    let provider = Arc::new(CountingFilterProvider::new(alice_filter()));
    let repository = AclSearchRepository::with_config(
        EntityMetadata::new(),
        Arc::clone(&operations),
        provider.clone(),
        config,
    );
    Harness {
        operations,
        provider,
        repository,
    }
}

fn harness() -> Harness {
    harness_with(RepositoryConfig::default())
}

fn enforcing_harness() -> Harness {
    harness_with(RepositoryConfig::new().with_unfiltered_reads(UnfilteredReads::Enforce))
}

fn ids(orders: &[Order]) -> Vec<u64> {
    orders.iter().map(|o| o.id).collect()
}

fn page(page: usize, size: usize) -> PageRequest {
    PageRequest::new(page, size).expect("page request should be valid")
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

/// One tracing event as seen by [`CaptureLayer`].
#[derive(Debug, Clone)]
struct CapturedEvent {
    level: Level,
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for CapturedEvent {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
}

/// Layer that keeps every event emitted while it is the default subscriber.
#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.message == message)
            .cloned()
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = CapturedEvent {
            level: *event.metadata().level(),
            message: String::new(),
            fields: BTreeMap::new(),
        };
        event.record(&mut captured);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(captured);
    }
}

// ============================================================================
// FILTERED OPERATIONS
// ============================================================================

#[tokio::test]
async fn test_find_all_paged_composes_acl_filter() {
    let h = harness();
    let result = h
        .repository
        .find_all_paged(page(0, 10))
        .await
        .expect("find_all_paged should succeed");

    assert_eq!(ids(result.content()), vec![1, 3, 5]);
    assert_eq!(result.total_elements(), 3);

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        SearchCall::QueryForPage { entity_type, query } => {
            assert_eq!(entity_type, &Order::entity_type());
            assert_eq!(query.query, Query::filtered(Query::MatchAll, alice_filter()));
            assert_eq!(query.pageable, Some(page(0, 10)));
        }
        other => panic!("Expected query_for_page, got: {:?}", other),
    }
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test]
async fn test_count_is_filtered() {
    let h = harness();
    let count = h.repository.count().await.expect("count should succeed");
    assert_eq!(count, 3);

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation(), "count");
    let base = assert_filtered(calls[0].query().expect("count carries a query"), &alice_filter());
    assert_eq!(base, &Query::MatchAll);
}

#[tokio::test]
async fn test_find_all_counts_then_reads_one_page() {
    let h = harness();
    let all = h.repository.find_all().await.expect("find_all should succeed");
    assert_eq!(ids(&all), vec![1, 3, 5]);

    let calls = h.operations.calls();
    let operations: Vec<&str> = calls.iter().map(SearchCall::operation).collect();
    assert_eq!(operations, vec!["count", "query_for_page"]);
    assert_eq!(
        calls[1].search_query().and_then(|q| q.pageable.clone()),
        Some(page(0, 3))
    );
    assert_filtered(calls[1].query().expect("page carries a query"), &alice_filter());
}

#[tokio::test]
async fn test_find_all_sorted_uses_count_as_page_size() {
    let h = harness();
    let sorted = h
        .repository
        .find_all_sorted(Sort::by_desc("total"))
        .await
        .expect("find_all_sorted should succeed");
    assert_eq!(ids(&sorted), vec![5, 1, 3]);

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].operation(), "count");
    assert_eq!(
        calls[1].search_query().and_then(|q| q.pageable.clone()),
        Some(
            PageRequest::with_sort(0, 3, Sort::by_desc("total"))
                .expect("page request should be valid")
        )
    );
    for call in &calls {
        assert_filtered(call.query().expect("call carries a query"), &alice_filter());
    }
}

#[tokio::test]
async fn test_find_all_sorted_with_no_matches_only_counts() {
    let h = harness();
    h.provider.set_filter(Filter::MatchNone);

    let sorted = h
        .repository
        .find_all_sorted(Sort::by("total"))
        .await
        .expect("find_all_sorted should succeed");
    assert!(sorted.is_empty());

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation(), "count");
}

#[tokio::test]
async fn test_find_all_with_no_matches_only_counts() {
    let h = harness();
    h.provider.set_filter(Filter::MatchNone);

    let all = h.repository.find_all().await.expect("find_all should succeed");
    assert!(all.is_empty());

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation(), "count");
    let base = assert_filtered(calls[0].query().expect("count carries a query"), &Filter::MatchNone);
    assert_eq!(base, &Query::MatchAll);
}

#[tokio::test]
async fn test_find_all_by_ids_keeps_id_order_in_query() {
    let h = harness();
    let found = h
        .repository
        .find_all_by_ids(Some(vec![3, 1, 2]))
        .await
        .expect("find_all_by_ids should succeed");

    let mut found_ids = ids(&found);
    found_ids.sort_unstable();
    assert_eq!(found_ids, vec![1, 3]);

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation(), "query_for_list");
    let base = assert_filtered(calls[0].query().expect("list carries a query"), &alice_filter());
    assert_eq!(base, &Query::ids(["3", "1", "2"]));
}

#[tokio::test]
async fn test_find_all_by_ids_absent_is_invalid_argument() {
    let h = harness();
    let result = h.repository.find_all_by_ids(None).await;
    assert_invalid_argument(&result, "ids");
    assert_eq!(h.operations.call_count(), 0);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_search_filters_base_query() {
    let h = harness();
    let found = h
        .repository
        .search(Query::text("teapot"))
        .await
        .expect("search should succeed");
    assert_eq!(ids(&found), vec![1]);

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        let base = assert_filtered(call.query().expect("call carries a query"), &alice_filter());
        assert_eq!(base, &Query::text("teapot"));
    }
}

#[tokio::test]
async fn test_search_paged_filters_base_query() {
    let h = harness();
    let result = h
        .repository
        .search_paged(Query::term("status", "shipped"), page(0, 10))
        .await
        .expect("search_paged should succeed");
    assert_eq!(ids(result.content()), vec![3]);
    assert_eq!(result.total_elements(), 1);

    let calls = h.operations.calls();
    assert_eq!(calls.len(), 1);
    let base = assert_filtered(calls[0].query().expect("page carries a query"), &alice_filter());
    assert_eq!(base, &Query::term("status", "shipped"));
}

#[tokio::test]
async fn test_one_debug_event_per_filtered_operation() {
    let capture = CaptureLayer::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));
    let h = harness();

    h.repository.count().await.expect("count should succeed");
    assert_eq!(capture.with_message("Using ACL filter").len(), 1);

    h.repository
        .find_all_paged(page(0, 2))
        .await
        .expect("find_all_paged should succeed");
    let events = capture.with_message("Using ACL filter");
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.level, Level::DEBUG);
        assert_eq!(event.fields.get("entity_type").map(String::as_str), Some("Order"));
        assert_eq!(event.fields.get("filter"), Some(&alice_filter().to_string()));
    }
}

#[tokio::test]
async fn test_filter_resolved_on_every_call() {
    let h = harness();
    assert_eq!(h.repository.count().await, Ok(3));

    h.provider.set_filter(Filter::eq("owner", "bob"));
    assert_eq!(h.repository.count().await, Ok(1));
    assert_eq!(h.provider.call_count(), 2);
    assert_eq!(
        h.provider.requested_types(),
        vec![Order::entity_type(), Order::entity_type()]
    );
}

// ============================================================================
// UNFILTERED READS
// ============================================================================

#[tokio::test]
async fn test_find_by_id_delegates_without_filter() {
    let h = harness();
    let found = h
        .repository
        .find_by_id(&2)
        .await
        .expect("find_by_id should succeed");
    assert_eq!(found.map(|o| o.owner), Some("bob".to_string()));
    assert!(h
        .repository
        .exists_by_id(&4)
        .await
        .expect("exists_by_id should succeed"));
    assert!(!h
        .repository
        .exists_by_id(&42)
        .await
        .expect("exists_by_id should succeed"));

    let operations: Vec<&str> = h.operations.calls().iter().map(SearchCall::operation).collect();
    assert_eq!(operations, vec!["get_by_id", "exists", "exists"]);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_search_query_passes_request_through() {
    let h = harness();
    let request = SearchQuery::builder()
        .with_query(Query::term("owner", "bob"))
        .with_pageable(page(0, 5))
        .with_facet("status")
        .build();
    let result = h
        .repository
        .search_query(request.clone())
        .await
        .expect("search_query should succeed");
    assert_eq!(ids(result.content()), vec![2]);
    assert_eq!(result.facets()["status"]["shipped"], 1);

    let calls = h.operations.calls();
    assert_eq!(calls[0].search_query(), Some(&request));
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_search_similar_requires_entity_and_pageable() {
    let h = harness();
    let orders = sample_orders();

    let result = h
        .repository
        .search_similar(None, Some(&["description"][..]), Some(page(0, 10)))
        .await;
    assert_invalid_argument(&result, "entity");

    let result = h.repository.search_similar(Some(&orders[0]), None, None).await;
    assert_invalid_argument(&result, "pageable");

    assert_eq!(h.operations.call_count(), 0);
}

#[tokio::test]
async fn test_search_similar_delegates_without_filter() {
    let h = harness();
    let orders = sample_orders();
    let result = h
        .repository
        .search_similar(Some(&orders[0]), Some(&["description"][..]), Some(page(0, 10)))
        .await
        .expect("search_similar should succeed");
    assert_eq!(ids(result.content()), vec![3, 4]);

    match &h.operations.calls()[0] {
        SearchCall::MoreLikeThis { query, .. } => {
            assert_eq!(query.id, "1");
            assert_eq!(query.fields, vec!["description".to_string()]);
            assert_eq!(query.filter, None);
        }
        other => panic!("Expected more_like_this, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_enforce_policy_filters_every_read() {
    let h = enforcing_harness();
    let orders = sample_orders();

    assert_eq!(h.repository.find_by_id(&2).await, Ok(None));
    assert_eq!(
        h.repository.find_by_id(&5).await.map(|o| o.map(|o| o.id)),
        Ok(Some(5))
    );
    assert_eq!(h.repository.exists_by_id(&4).await, Ok(false));

    let result = h
        .repository
        .search_query(SearchQuery::of(Query::term("owner", "bob")))
        .await
        .expect("search_query should succeed");
    assert!(result.is_empty());

    let similar = h
        .repository
        .search_similar(Some(&orders[0]), Some(&["description"][..]), Some(page(0, 10)))
        .await
        .expect("search_similar should succeed");
    assert_eq!(ids(similar.content()), vec![3]);

    assert_eq!(h.provider.call_count(), 5);
    assert!(h
        .operations
        .calls()
        .iter()
        .all(|call| !matches!(call, SearchCall::GetById { .. } | SearchCall::Exists { .. })));
}

// ============================================================================
// ERROR PROPAGATION
// ============================================================================

#[tokio::test]
async fn test_provider_error_propagates_unchanged() {
    let h = harness();
    let error = FilterError::ResolutionFailed {
        entity_type: "Order".to_string(),
        reason: "no authenticated caller".to_string(),
    };
    h.provider.fail_with(error.clone());

    assert_eq!(h.repository.count().await, Err(SieveError::Filter(error.clone())));
    assert_eq!(
        h.repository.search(Query::MatchAll).await,
        Err(SieveError::Filter(error))
    );
    assert_eq!(h.operations.call_count(), 0);
}

#[tokio::test]
async fn test_search_error_propagates_unchanged() {
    let h = harness();
    let error = SearchError::Unavailable {
        reason: "cluster red".to_string(),
    };
    h.operations.fail_with(error.clone());

    let result = h.repository.find_all_paged(page(0, 10)).await;
    assert_eq!(result, Err(SieveError::Search(error)));
    assert_eq!(h.operations.call_count(), 1);
}

// ============================================================================
// FACTORY
// ============================================================================

#[tokio::test]
async fn test_factory_builds_repositories_sharing_collaborators() {
    let operations = Arc::new(seeded_operations().expect("seeding should succeed"));
    let invoices: Vec<Invoice> = sample_orders().iter().map(Invoice::for_order).collect();
    operations
        .engine()
        .index_all(&EntityMetadata::<Invoice>::new(), &invoices)
        .expect("indexing should succeed");

    let registry = RegistryFilterProvider::with_fallback(FallbackFilter::Reject)
        .with_filter(Order::entity_type(), alice_filter())
        .expect("register should succeed");
    let provider: Arc<dyn AclFilterProvider> = Arc::new(registry);
    let factory = AclRepositoryFactory::new(Arc::clone(&operations), provider);

    let orders = factory.repository::<Order>();
    assert_eq!(orders.to_string(), "AclSearchRepository<Order>");
    assert_eq!(orders.count().await, Ok(3));

    let invoice_repository = factory.repository::<Invoice>();
    assert_eq!(
        invoice_repository.count().await,
        Err(SieveError::Filter(FilterError::NotRegistered {
            entity_type: "Invoice".to_string()
        }))
    );
    assert_eq!(operations.call_count(), 1);
}

#[tokio::test]
async fn test_factory_repository_with_custom_id_conversion() {
    let prefixed = || EntityMetadata::<Order>::new().with_id_converter(|id: &u64| format!("O-{id}"));
    let operations = Arc::new(RecordingSearchOperations::new());
    operations
        .engine()
        .index_all(&prefixed(), &sample_orders())
        .expect("indexing should succeed");
    let provider: Arc<dyn AclFilterProvider> = Arc::new(CountingFilterProvider::new(alice_filter()));
    let repository = AclRepositoryFactory::new(Arc::clone(&operations), provider).repository_with(prefixed());

    let found = repository
        .find_all_by_ids(Some(vec![3, 2]))
        .await
        .expect("find_all_by_ids should succeed");
    assert_eq!(ids(&found), vec![3]);

    let orders = sample_orders();
    let similar = repository
        .search_similar(Some(&orders[0]), Some(&["description"][..]), Some(page(0, 10)))
        .await
        .expect("search_similar should succeed");
    assert_eq!(ids(similar.content()), vec![3, 4]);

    let calls = operations.calls();
    let base = assert_filtered(calls[0].query().expect("list carries a query"), &alice_filter());
    assert_eq!(base, &Query::ids(["O-3", "O-2"]));
    match &calls[1] {
        SearchCall::MoreLikeThis { query, .. } => assert_eq!(query.id, "O-1"),
        other => panic!("Expected more_like_this, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_for_entity_derives_metadata_from_type() {
    let operations = Arc::new(seeded_operations().expect("seeding should succeed"));
    let repository: AclSearchRepository<Order, _> = AclSearchRepository::for_entity(
        Arc::clone(&operations),
        Arc::new(CountingFilterProvider::new(alice_filter())),
    );
    assert_eq!(repository.to_string(), "AclSearchRepository<Order>");
    assert_eq!(repository.count().await, Ok(3));
    assert_eq!(operations.calls()[0].entity_type(), &Order::entity_type());
}

#[tokio::test]
async fn test_simple_repository_executes_queries_unfiltered() {
    let operations = Arc::new(seeded_operations().expect("seeding should succeed"));
    let repository = SimpleSearchRepository::<Order, _>::for_entity(Arc::clone(&operations));
    assert_eq!(repository.to_string(), "SimpleSearchRepository<Order>");
    assert_eq!(repository.count().await, Ok(5));

    let found = repository
        .search(Query::text("teapot"))
        .await
        .expect("search should succeed");
    assert_eq!(ids(&found), vec![1, 4]);

    let calls = operations.calls();
    assert_eq!(calls[0].query(), Some(&Query::MatchAll));
    assert_eq!(calls[1].query(), Some(&Query::text("teapot")));
}

#[test]
fn test_zero_size_page_request_rejected_when_decoding() {
    let request = |size: usize| {
        serde_json::json!({
            "query": {"type": "match_all"},
            "pageable": {"page": 0, "size": size},
        })
    };
    let decoded: SearchQuery = serde_json::from_value(request(1)).expect("size 1 is valid");
    assert_eq!(decoded.pageable, Some(page(0, 1)));
    assert!(serde_json::from_value::<SearchQuery>(request(0)).is_err());
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every paged search reaches the client as exactly `filtered(q, F)`, and
    /// every returned order passes the filter.
    #[test]
    fn prop_search_paged_composes_filter(
        query in generators::arb_query(),
        filter in generators::arb_filter(),
        pageable in generators::arb_page_request(),
    ) {
        let rt = test_runtime()?;
        let h = harness();
        h.provider.set_filter(filter.clone());

        let result = rt.block_on(h.repository.search_paged(query.clone(), pageable.clone()));
        let result = result.map_err(|e| TestCaseError::fail(format!("search_paged failed: {}", e)))?;

        let calls = h.operations.calls();
        prop_assert_eq!(calls.len(), 1);
        prop_assert_eq!(calls[0].query(), Some(&Query::filtered(query.clone(), filter.clone())));
        prop_assert!(result.len() <= pageable.size());

        let everything = rt.block_on(
            h.repository.search_paged(query, PageRequest::new(0, 100).expect("valid page")),
        );
        let everything = everything.map_err(|e| TestCaseError::fail(format!("search_paged failed: {}", e)))?;
        prop_assert_eq!(everything.total_elements(), result.total_elements());
    }

    /// The filtered count never exceeds the unfiltered one.
    #[test]
    fn prop_filtered_count_bounded(filter in generators::arb_filter()) {
        let rt = test_runtime()?;
        let h = harness();
        h.provider.set_filter(filter);

        let filtered = rt
            .block_on(h.repository.count())
            .map_err(|e| TestCaseError::fail(format!("count failed: {}", e)))?;
        prop_assert!(filtered <= sample_orders().len() as u64);
    }

    /// Counting under an owner filter agrees with the indexed orders, where a
    /// repeated id keeps the last order indexed.
    #[test]
    fn prop_owner_filter_counts_indexed_orders(
        orders in prop::collection::vec(generators::arb_order(), 0..20),
        owner in generators::arb_owner(),
    ) {
        let rt = test_runtime()?;
        let engine = InMemorySearchOperations::new();
        engine
            .index_all(&EntityMetadata::<Order>::new(), &orders)
            .map_err(|e| TestCaseError::fail(format!("indexing failed: {}", e)))?;
        let repository: AclSearchRepository<Order, _> = AclSearchRepository::for_entity(
            Arc::new(RecordingSearchOperations::with_engine(engine)),
            Arc::new(CountingFilterProvider::new(Filter::eq("owner", owner.clone()))),
        );

        let latest: BTreeMap<u64, &Order> = orders.iter().map(|order| (order.id, order)).collect();
        let expected = latest.values().filter(|order| order.owner == owner).count() as u64;
        let count = rt
            .block_on(repository.count())
            .map_err(|e| TestCaseError::fail(format!("count failed: {}", e)))?;
        prop_assert_eq!(count, expected);
    }
}
