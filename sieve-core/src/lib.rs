//! SIEVE Core - Entity, Query and Paging Types
//!
//! Pure data structures shared by every SIEVE crate: entity descriptors,
//! filter and query trees, search requests, paged results, errors and
//! repository configuration. No I/O lives here.

pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod page;
pub mod query;

pub use config::{FallbackFilter, RepositoryConfig, UnfilteredReads};
pub use entity::{Entity, EntityMetadata, EntityType, IdConverter};
pub use error::{
    ConfigError, FilterError, SearchError, SieveError, SieveResult, ValidationError,
};
pub use filter::{Filter, FilterExpr, FilterOperator};
pub use page::{Direction, Facets, Page, PageRequest, Sort, SortOrder};
pub use query::{MoreLikeThisQuery, Query, SearchQuery, SearchQueryBuilder};
