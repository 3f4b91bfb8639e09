//! Base queries and search requests.
//!
//! [`Query::filtered`] is the single composition primitive: every ACL-scoped
//! read ANDs its base query with the resolved [`Filter`] through it.

use crate::filter::Filter;
use crate::page::PageRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base predicate of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// Every document.
    MatchAll,
    /// Documents whose id is in `values`.
    Ids { values: Vec<String> },
    /// Documents whose `field` equals `value`.
    Term {
        field: String,
        value: serde_json::Value,
    },
    /// Free-text match on `fields` (every text field when empty).
    Text {
        #[serde(default)]
        fields: Vec<String>,
        text: String,
    },
    /// Structured conjunction.
    Bool {
        #[serde(default)]
        must: Vec<Query>,
        #[serde(default)]
        must_not: Vec<Query>,
    },
    /// `query AND filter`.
    Filtered { query: Box<Query>, filter: Filter },
}

impl Query {
    /// Id-membership query.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Ids {
            values: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact term query.
    pub fn term(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Free-text query over every text field.
    pub fn text(text: impl Into<String>) -> Self {
        Query::Text {
            fields: Vec::new(),
            text: text.into(),
        }
    }

    /// Free-text query restricted to `fields`.
    pub fn text_in<I, S>(text: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Text {
            fields: fields.into_iter().map(Into::into).collect(),
            text: text.into(),
        }
    }

    /// Logical AND of `query` and `filter`.
    pub fn filtered(query: Query, filter: Filter) -> Self {
        Query::Filtered {
            query: Box::new(query),
            filter,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MatchAll => f.write_str("match_all"),
            Query::Ids { values } => write!(f, "ids{:?}", values),
            Query::Term { field, value } => write!(f, "{}:{}", field, value),
            Query::Text { fields, text } if fields.is_empty() => write!(f, "text({:?})", text),
            Query::Text { fields, text } => write!(f, "text({:?} in {})", text, fields.join(",")),
            Query::Bool { must, must_not } => {
                f.write_str("bool(")?;
                for (i, q) in must.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write!(f, "{}", q)?;
                }
                for q in must_not {
                    write!(f, " NOT {}", q)?;
                }
                f.write_str(")")
            }
            Query::Filtered { query, filter } => write!(f, "filtered({}, {})", query, filter),
        }
    }
}

/// A query plus paging and facet requests, ready for a search client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: Query,
    #[serde(default)]
    pub pageable: Option<PageRequest>,
    #[serde(default)]
    pub facets: Vec<String>,
}

impl SearchQuery {
    /// Start building a search query (defaults to match-all, unpaged).
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder::default()
    }

    /// Unpaged search for `query`.
    pub fn of(query: Query) -> Self {
        Self::builder().with_query(query).build()
    }

    /// The same request with `filter` ANDed onto its query.
    pub fn filtered(self, filter: Filter) -> Self {
        Self {
            query: Query::filtered(self.query, filter),
            ..self
        }
    }
}

/// Builder for [`SearchQuery`].
#[derive(Debug, Clone, Default)]
pub struct SearchQueryBuilder {
    query: Option<Query>,
    pageable: Option<PageRequest>,
    facets: Vec<String>,
}

impl SearchQueryBuilder {
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_pageable(mut self, pageable: PageRequest) -> Self {
        self.pageable = Some(pageable);
        self
    }

    /// Request term counts for `field`.
    pub fn with_facet(mut self, field: impl Into<String>) -> Self {
        self.facets.push(field.into());
        self
    }

    pub fn build(self) -> SearchQuery {
        SearchQuery {
            query: self.query.unwrap_or(Query::MatchAll),
            pageable: self.pageable,
            facets: self.facets,
        }
    }
}

/// Similarity search seeded by a reference document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoreLikeThisQuery {
    /// String id of the reference document.
    pub id: String,
    /// Fields compared for similarity (every text field when empty).
    #[serde(default)]
    pub fields: Vec<String>,
    pub pageable: PageRequest,
    /// Optional restriction applied to candidates.
    #[serde(default)]
    pub filter: Option<Filter>,
}

impl MoreLikeThisQuery {
    pub fn new(id: impl Into<String>, pageable: PageRequest) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
            pageable,
            filter: None,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}
