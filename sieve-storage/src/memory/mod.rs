//! In-memory search engine.
//!
//! `InMemorySearchOperations` keeps one map of JSON documents per index and
//! evaluates queries by scanning it. It implements the whole
//! [`SearchOperations`] contract, so repositories can be exercised end to end
//! without a search cluster.

mod matcher;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use sieve_core::{
    Direction, Entity, EntityMetadata, EntityType, Facets, MoreLikeThisQuery, Page, PageRequest,
    Query, SearchError, SearchQuery, SieveResult, Sort,
};

use crate::operations::SearchOperations;
use matcher::{json_cmp, lookup, matches_filter, matches_query, text_tokens, Patterns};

/// Documents of one index keyed by string id.
type Documents = BTreeMap<String, Value>;

/// Scanning search engine over in-process document maps.
#[derive(Debug, Default)]
pub struct InMemorySearchOperations {
    indices: RwLock<HashMap<String, Documents>>,
}

impl InMemorySearchOperations {
    /// Create an engine with no indices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `entity`, replacing any document with the same id.
    pub fn index<E: Entity>(&self, metadata: &EntityMetadata<E>, entity: &E) -> SieveResult<()> {
        let doc = encode(metadata.entity_type(), entity)?;
        self.index_document(metadata.entity_type(), metadata.entity_id_string(entity), doc)
    }

    /// Index every entity in `entities`.
    pub fn index_all<E: Entity>(
        &self,
        metadata: &EntityMetadata<E>,
        entities: &[E],
    ) -> SieveResult<()> {
        let docs = entities
            .iter()
            .map(|entity| {
                Ok((
                    metadata.entity_id_string(entity),
                    encode(metadata.entity_type(), entity)?,
                ))
            })
            .collect::<SieveResult<Vec<_>>>()?;

        let mut indices = self.indices.write().map_err(|_| SearchError::LockPoisoned)?;
        let index = indices.entry(metadata.entity_type().index_name()).or_default();
        index.extend(docs);
        tracing::debug!(
            entity_type = %metadata.entity_type(),
            count = entities.len(),
            "Indexed documents"
        );
        Ok(())
    }

    /// Index a raw JSON document under `id`.
    pub fn index_document(
        &self,
        entity_type: &EntityType,
        id: impl Into<String>,
        doc: Value,
    ) -> SieveResult<()> {
        let mut indices = self.indices.write().map_err(|_| SearchError::LockPoisoned)?;
        indices
            .entry(entity_type.index_name())
            .or_default()
            .insert(id.into(), doc);
        Ok(())
    }

    /// Remove the document `id`. Returns whether it was present.
    pub fn remove(&self, entity_type: &EntityType, id: &str) -> SieveResult<bool> {
        let mut indices = self.indices.write().map_err(|_| SearchError::LockPoisoned)?;
        Ok(indices
            .get_mut(&entity_type.index_name())
            .is_some_and(|index| index.remove(id).is_some()))
    }

    /// Drop every index.
    pub fn clear(&self) -> SieveResult<()> {
        self.indices
            .write()
            .map_err(|_| SearchError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Number of documents indexed for `entity_type`.
    pub fn document_count(&self, entity_type: &EntityType) -> SieveResult<usize> {
        let indices = self.indices.read().map_err(|_| SearchError::LockPoisoned)?;
        Ok(indices
            .get(&entity_type.index_name())
            .map_or(0, BTreeMap::len))
    }

    /// Documents of `entity_type` matching `query`, in id order.
    fn matching(&self, entity_type: &EntityType, query: &Query) -> SieveResult<Vec<(String, Value)>> {
        let index_name = entity_type.index_name();
        let indices = self.indices.read().map_err(|_| SearchError::LockPoisoned)?;
        let Some(index) = indices.get(&index_name) else {
            return Ok(Vec::new());
        };

        let query_failed = |e: regex::Error| SearchError::QueryFailed {
            index: index_name.clone(),
            reason: e.to_string(),
        };
        let patterns = Patterns::for_query(query).map_err(query_failed)?;

        let mut matched = Vec::new();
        for (id, doc) in index {
            let hit = matches_query(id, doc, query, &patterns).map_err(query_failed)?;
            if hit {
                matched.push((id.clone(), doc.clone()));
            }
        }
        tracing::trace!(index = %index_name, query = %query, matched = matched.len(), "Executed query");
        Ok(matched)
    }
}

#[async_trait]
impl SearchOperations for InMemorySearchOperations {
    async fn query_for_page<E: Entity>(
        &self,
        query: &SearchQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Page<E>> {
        let mut matched = self.matching(entity_type, &query.query)?;
        let total = matched.len() as u64;
        let facets = facet_counts(&matched, &query.facets);

        let page = match &query.pageable {
            Some(pageable) => {
                sort_documents(&mut matched, pageable.sort());
                let content = decode_all(entity_type, page_slice(&matched, pageable))?;
                Page::new(content, Some(pageable.clone()), total)
            }
            None => Page::unpaged(decode_all(entity_type, &matched)?),
        };
        Ok(page.with_facets(facets))
    }

    async fn query_for_list<E: Entity>(
        &self,
        query: &SearchQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Vec<E>> {
        Ok(self
            .query_for_page::<E>(query, entity_type)
            .await?
            .into_content())
    }

    async fn count(&self, query: &SearchQuery, entity_type: &EntityType) -> SieveResult<u64> {
        Ok(self.matching(entity_type, &query.query)?.len() as u64)
    }

    async fn more_like_this<E: Entity>(
        &self,
        query: &MoreLikeThisQuery,
        entity_type: &EntityType,
    ) -> SieveResult<Page<E>> {
        let index_name = entity_type.index_name();
        let mut scored = {
            let indices = self.indices.read().map_err(|_| SearchError::LockPoisoned)?;
            let Some(index) = indices.get(&index_name) else {
                return Ok(Page::new(Vec::new(), Some(query.pageable.clone()), 0));
            };
            let Some(reference) = index.get(&query.id) else {
                tracing::debug!(index = %index_name, id = %query.id, "Reference document not found");
                return Ok(Page::new(Vec::new(), Some(query.pageable.clone()), 0));
            };

            let query_failed = |e: regex::Error| SearchError::QueryFailed {
                index: index_name.clone(),
                reason: e.to_string(),
            };
            let patterns = match &query.filter {
                Some(filter) => Patterns::for_filter(filter).map_err(query_failed)?,
                None => Patterns::default(),
            };

            let wanted = text_tokens(reference, &query.fields);
            let mut scored = Vec::new();
            for (id, doc) in index.iter().filter(|(id, _)| **id != query.id) {
                if let Some(filter) = &query.filter {
                    let allowed = matches_filter(doc, filter, &patterns).map_err(query_failed)?;
                    if !allowed {
                        continue;
                    }
                }
                let score = text_tokens(doc, &query.fields)
                    .intersection(&wanted)
                    .count();
                if score > 0 {
                    scored.push((score, id.clone(), doc.clone()));
                }
            }
            scored
        };

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        tracing::trace!(index = %index_name, id = %query.id, matched = scored.len(), "Executed more-like-this");

        let total = scored.len() as u64;
        let ranked: Vec<(String, Value)> = scored.into_iter().map(|(_, id, doc)| (id, doc)).collect();
        let content = decode_all(entity_type, page_slice(&ranked, &query.pageable))?;
        Ok(Page::new(content, Some(query.pageable.clone()), total))
    }

    async fn get_by_id<E: Entity>(
        &self,
        id: &str,
        entity_type: &EntityType,
    ) -> SieveResult<Option<E>> {
        let indices = self.indices.read().map_err(|_| SearchError::LockPoisoned)?;
        indices
            .get(&entity_type.index_name())
            .and_then(|index| index.get(id))
            .map(|doc| decode(entity_type, doc))
            .transpose()
    }

    async fn exists(&self, id: &str, entity_type: &EntityType) -> SieveResult<bool> {
        let indices = self.indices.read().map_err(|_| SearchError::LockPoisoned)?;
        Ok(indices
            .get(&entity_type.index_name())
            .is_some_and(|index| index.contains_key(id)))
    }
}

fn encode<E: Entity>(entity_type: &EntityType, entity: &E) -> SieveResult<Value> {
    serde_json::to_value(entity).map_err(|e| {
        SearchError::Serialization {
            entity_type: entity_type.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode<E: Entity>(entity_type: &EntityType, doc: &Value) -> SieveResult<E> {
    serde_json::from_value(doc.clone()).map_err(|e| {
        SearchError::Serialization {
            entity_type: entity_type.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode_all<E: Entity>(entity_type: &EntityType, docs: &[(String, Value)]) -> SieveResult<Vec<E>> {
    docs.iter().map(|(_, doc)| decode(entity_type, doc)).collect()
}

fn page_slice<'a>(docs: &'a [(String, Value)], pageable: &PageRequest) -> &'a [(String, Value)] {
    let start = pageable.offset().min(docs.len());
    let end = start.saturating_add(pageable.size()).min(docs.len());
    &docs[start..end]
}

/// Stable sort by `sort`, missing values last in either direction, ties by id.
fn sort_documents(docs: &mut [(String, Value)], sort: &Sort) {
    docs.sort_by(|(a_id, a), (b_id, b)| {
        sort.orders()
            .iter()
            .map(|order| {
                let a = lookup(a, &order.field).filter(|v| !v.is_null());
                let b = lookup(b, &order.field).filter(|v| !v.is_null());
                match (a, b) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(a), Some(b)) => {
                        let ordering = json_cmp(a, b).unwrap_or(Ordering::Equal);
                        match order.direction {
                            Direction::Asc => ordering,
                            Direction::Desc => ordering.reverse(),
                        }
                    }
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a_id.cmp(b_id))
    });
}

/// Term counts of the string forms of each faceted field across `docs`.
fn facet_counts(docs: &[(String, Value)], fields: &[String]) -> Facets {
    let mut facets = Facets::new();
    for field in fields {
        let counts = facets.entry(field.clone()).or_default();
        for (_, doc) in docs {
            match lookup(doc, field) {
                Some(Value::Array(items)) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        *counts.entry(term_string(item)).or_default() += 1;
                    }
                }
                Some(Value::Null) | None => {}
                Some(value) => *counts.entry(term_string(value)).or_default() += 1,
            }
        }
    }
    facets
}

fn term_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
