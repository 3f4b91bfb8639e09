//! Repository configuration.
//!
//! Loaded from environment variables with defaults that keep the historical
//! behavior of the filtered repository.

use crate::error::{ConfigError, SieveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable selecting [`UnfilteredReads`].
pub const ENV_UNFILTERED_READS: &str = "SIEVE_UNFILTERED_READS";
/// Environment variable selecting [`FallbackFilter`].
pub const ENV_FALLBACK_FILTER: &str = "SIEVE_FALLBACK_FILTER";

/// What to do on the read paths that historically skipped the ACL filter:
/// get-by-id, exists-by-id, raw pre-built search and similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfilteredReads {
    /// Delegate unfiltered to the search client.
    #[default]
    Delegate,
    /// Apply the ACL filter on these paths too.
    Enforce,
}

impl FromStr for UnfilteredReads {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delegate" => Ok(UnfilteredReads::Delegate),
            "enforce" => Ok(UnfilteredReads::Enforce),
            _ => Err(ConfigError::InvalidValue {
                field: ENV_UNFILTERED_READS.to_string(),
                value: s.to_string(),
                reason: "expected delegate or enforce".to_string(),
            }),
        }
    }
}

impl fmt::Display for UnfilteredReads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnfilteredReads::Delegate => f.write_str("delegate"),
            UnfilteredReads::Enforce => f.write_str("enforce"),
        }
    }
}

/// Filter used by the registry provider for entity types with no registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackFilter {
    /// Unregistered types are unrestricted.
    #[default]
    AllowAll,
    /// Unregistered types return nothing.
    DenyAll,
    /// Unregistered types fail filter resolution.
    Reject,
}

impl FromStr for FallbackFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow_all" => Ok(FallbackFilter::AllowAll),
            "deny_all" => Ok(FallbackFilter::DenyAll),
            "reject" => Ok(FallbackFilter::Reject),
            _ => Err(ConfigError::InvalidValue {
                field: ENV_FALLBACK_FILTER.to_string(),
                value: s.to_string(),
                reason: "expected allow_all, deny_all or reject".to_string(),
            }),
        }
    }
}

/// Configuration shared by the repositories built from one factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Behavior of the historically unfiltered read paths.
    #[serde(default)]
    pub unfiltered_reads: UnfilteredReads,
    /// Fallback for entity types without a registered filter.
    #[serde(default)]
    pub fallback_filter: FallbackFilter,
}

impl RepositoryConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unfiltered-read policy.
    pub fn with_unfiltered_reads(mut self, policy: UnfilteredReads) -> Self {
        self.unfiltered_reads = policy;
        self
    }

    /// Set the fallback filter policy.
    pub fn with_fallback_filter(mut self, fallback: FallbackFilter) -> Self {
        self.fallback_filter = fallback;
        self
    }

    /// Whether every read path applies the ACL filter.
    pub fn enforces_all_reads(&self) -> bool {
        self.unfiltered_reads == UnfilteredReads::Enforce
    }

    /// Create a config from environment variables.
    ///
    /// Environment variables:
    /// - `SIEVE_UNFILTERED_READS`: "delegate" or "enforce" (default: delegate)
    /// - `SIEVE_FALLBACK_FILTER`: "allow_all", "deny_all" or "reject" (default: allow_all)
    pub fn from_env() -> SieveResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> SieveResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let unfiltered_reads = lookup(ENV_UNFILTERED_READS)
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<UnfilteredReads>())
            .transpose()?
            .unwrap_or_default();

        let fallback_filter = lookup(ENV_FALLBACK_FILTER)
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<FallbackFilter>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            unfiltered_reads,
            fallback_filter,
        })
    }
}
