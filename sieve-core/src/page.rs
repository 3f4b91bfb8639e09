//! Paging, sorting and paged results.

use crate::error::{SieveError, SieveResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Sort on one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: String,
    pub direction: Direction,
}

/// Ordered list of sort orders. Earlier orders take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sort {
    orders: Vec<SortOrder>,
}

impl Sort {
    /// No ordering.
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Ascending on `field`.
    pub fn by(field: impl Into<String>) -> Self {
        Self::unsorted().then(field, Direction::Asc)
    }

    /// Descending on `field`.
    pub fn by_desc(field: impl Into<String>) -> Self {
        Self::unsorted().then(field, Direction::Desc)
    }

    /// Append a secondary order.
    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(SortOrder {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn orders(&self) -> &[SortOrder] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }
}

/// A zero-based page index, a page size and an optional sort.
///
/// Deserialization goes through [`PageRequest::with_sort`], so a decoded
/// request never carries a zero size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPageRequest")]
pub struct PageRequest {
    page: usize,
    size: usize,
    #[serde(default)]
    sort: Sort,
}

/// Wire form of [`PageRequest`] before validation.
#[derive(Deserialize)]
struct RawPageRequest {
    page: usize,
    size: usize,
    #[serde(default)]
    sort: Sort,
}

impl TryFrom<RawPageRequest> for PageRequest {
    type Error = SieveError;

    fn try_from(raw: RawPageRequest) -> SieveResult<Self> {
        Self::with_sort(raw.page, raw.size, raw.sort)
    }
}

impl PageRequest {
    /// Create a page request. `size` must be at least one.
    pub fn new(page: usize, size: usize) -> SieveResult<Self> {
        Self::with_sort(page, size, Sort::unsorted())
    }

    /// Create a sorted page request. `size` must be at least one.
    pub fn with_sort(page: usize, size: usize, sort: Sort) -> SieveResult<Self> {
        if size == 0 {
            return Err(ValidationError::InvalidValue {
                field: "size".to_string(),
                reason: "page size must not be less than one".to_string(),
            }
            .into());
        }
        Ok(Self { page, size, sort })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Index of the first element of this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// Term counts per faceted field: field → value → count.
pub type Facets = BTreeMap<String, BTreeMap<String, u64>>;

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    content: Vec<T>,
    page_request: Option<PageRequest>,
    total_elements: u64,
    #[serde(default)]
    facets: Facets,
}

impl<T> Page<T> {
    /// A page answering `page_request`.
    pub fn new(content: Vec<T>, page_request: Option<PageRequest>, total_elements: u64) -> Self {
        Self {
            content,
            page_request,
            total_elements,
            facets: Facets::new(),
        }
    }

    /// An unpaged result holding every element.
    pub fn unpaged(content: Vec<T>) -> Self {
        let total = content.len() as u64;
        Self::new(content, None, total)
    }

    /// An empty, unpaged result.
    pub fn empty() -> Self {
        Self::new(Vec::new(), None, 0)
    }

    /// Attach facet counts.
    pub fn with_facets(mut self, facets: Facets) -> Self {
        self.facets = facets;
        self
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn page_request(&self) -> Option<&PageRequest> {
        self.page_request.as_ref()
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn facets(&self) -> &Facets {
        &self.facets
    }

    /// Zero-based page index (0 for unpaged results).
    pub fn number(&self) -> usize {
        self.page_request.as_ref().map_or(0, PageRequest::page)
    }

    /// Number of pages needed for `total_elements` at this page size.
    pub fn total_pages(&self) -> u64 {
        match &self.page_request {
            Some(request) if request.size() == 0 => 0,
            Some(request) => self.total_elements.div_ceil(request.size() as u64),
            None if self.total_elements == 0 => 0,
            None => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.content.iter()
    }

    /// Map the content, keeping paging metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page_request: self.page_request,
            total_elements: self.total_elements,
            facets: self.facets,
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.into_iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================
