//! SIEVE Storage - Search Repositories and ACL Filtering
//!
//! Defines the search client boundary (`SearchOperations`), the filter
//! provider boundary (`AclFilterProvider`) and the repositories built on them.
//! `AclSearchRepository` scopes every listing, search and count to the ACL
//! filter of the current caller. An in-memory engine implements the search
//! client for tests and embedded use.

pub mod acl;
pub mod memory;
pub mod operations;
pub mod provider;
pub mod repository;
pub mod simple;

pub use acl::{AclRepositoryFactory, AclSearchRepository};
pub use memory::InMemorySearchOperations;
pub use operations::SearchOperations;
pub use provider::{AclFilterProvider, RegistryFilterProvider};
pub use repository::SearchRepository;
pub use simple::SimpleSearchRepository;
