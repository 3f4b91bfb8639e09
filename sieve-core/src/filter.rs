//! Filter expressions composed into search queries.
//!
//! A [`Filter`] is the boolean predicate an ACL filter provider hands back for
//! an entity type. It is a plain value: building one has no side effects and
//! it can be logged, serialized for an engine adapter, or evaluated in memory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to.
    ///
    /// Like every other field operator, `Ne` only matches documents where the
    /// field is present and not null, so a missing field fails `ne`. An
    /// engine's `must_not` term also admits documents lacking the field; for
    /// that behavior use `Filter::ne(f, v).or(Filter::exists(f).negate())`.
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (strings) or element (arrays)
    Contains,
    /// In list of values
    In,
    /// Field is present and not null
    Exists,
    /// Matches regular expression
    Regex,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::Contains => "contains",
            FilterOperator::In => "in",
            FilterOperator::Exists => "exists",
            FilterOperator::Regex => "=~",
        };
        f.write_str(symbol)
    }
}

/// A single comparison on one document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on (dotted paths address nested objects)
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilterExpr {
    /// Create a new filter expression.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            FilterOperator::Exists => write!(f, "{} exists", self.field),
            op => write!(f, "{} {} {}", self.field, op, self.value),
        }
    }
}

/// Boolean filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Every document passes.
    MatchAll,
    /// No document passes.
    MatchNone,
    /// A single field comparison.
    Field(FilterExpr),
    /// All children must pass.
    And { filters: Vec<Filter> },
    /// At least one child must pass.
    Or { filters: Vec<Filter> },
    /// The child must not pass.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Field comparison shorthand.
    pub fn field(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Filter::Field(FilterExpr::new(field, operator, value))
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::field(field, FilterOperator::Eq, value.into())
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::field(field, FilterOperator::Ne, value.into())
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::field(field, FilterOperator::Contains, value.into())
    }

    /// Create a membership filter.
    pub fn one_of<V>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<serde_json::Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::field(field, FilterOperator::In, serde_json::Value::Array(values))
    }

    /// Create an existence filter.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::field(field, FilterOperator::Exists, serde_json::Value::Null)
    }

    /// Conjunction of `self` and `other`, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And { mut filters }, Filter::And { filters: rest }) => {
                filters.extend(rest);
                Filter::And { filters }
            }
            (Filter::And { mut filters }, other) => {
                filters.push(other);
                Filter::And { filters }
            }
            (first, second) => Filter::And {
                filters: vec![first, second],
            },
        }
    }

    /// Disjunction of `self` and `other`.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or { mut filters } => {
                filters.push(other);
                Filter::Or { filters }
            }
            first => Filter::Or {
                filters: vec![first, other],
            },
        }
    }

    /// Negation of `self`.
    pub fn negate(self) -> Self {
        Filter::Not {
            filter: Box::new(self),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::MatchAll => f.write_str("match_all"),
            Filter::MatchNone => f.write_str("match_none"),
            Filter::Field(expr) => write!(f, "{}", expr),
            Filter::And { filters } => write_joined(f, filters, " AND "),
            Filter::Or { filters } => write_joined(f, filters, " OR "),
            Filter::Not { filter } => write!(f, "NOT {}", filter),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, filters: &[Filter], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", filter)?;
    }
    f.write_str(")")
}
