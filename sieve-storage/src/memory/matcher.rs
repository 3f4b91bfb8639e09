//! Query and filter evaluation against JSON documents.
//!
//! Field comparisons follow the usual search-engine conventions: a missing or
//! null field fails every condition, numbers compare as f64, and a condition
//! on an array field passes when any element passes.

use regex::Regex;
use serde_json::Value;
use sieve_core::{Filter, FilterExpr, FilterOperator, Query};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Evaluation result; the only failure is an invalid regex pattern.
pub(crate) type EvalResult = Result<bool, regex::Error>;

/// Regex conditions of one query, compiled once before documents are scanned.
#[derive(Debug, Default)]
pub(crate) struct Patterns {
    compiled: HashMap<String, Regex>,
}

impl Patterns {
    /// Compile every regex condition reachable from `query`.
    pub(crate) fn for_query(query: &Query) -> Result<Self, regex::Error> {
        let mut patterns = Self::default();
        patterns.collect_query(query)?;
        Ok(patterns)
    }

    /// Compile every regex condition in `filter`.
    pub(crate) fn for_filter(filter: &Filter) -> Result<Self, regex::Error> {
        let mut patterns = Self::default();
        patterns.collect_filter(filter)?;
        Ok(patterns)
    }

    fn collect_query(&mut self, query: &Query) -> Result<(), regex::Error> {
        match query {
            Query::Bool { must, must_not } => {
                for q in must.iter().chain(must_not) {
                    self.collect_query(q)?;
                }
            }
            Query::Filtered { query, filter } => {
                self.collect_query(query)?;
                self.collect_filter(filter)?;
            }
            Query::MatchAll | Query::Ids { .. } | Query::Term { .. } | Query::Text { .. } => {}
        }
        Ok(())
    }

    fn collect_filter(&mut self, filter: &Filter) -> Result<(), regex::Error> {
        match filter {
            Filter::Field(expr) if expr.operator == FilterOperator::Regex => {
                if let Some(pattern) = expr.value.as_str() {
                    if !self.compiled.contains_key(pattern) {
                        self.compiled.insert(pattern.to_string(), Regex::new(pattern)?);
                    }
                }
            }
            Filter::And { filters } | Filter::Or { filters } => {
                for f in filters {
                    self.collect_filter(f)?;
                }
            }
            Filter::Not { filter } => self.collect_filter(filter)?,
            Filter::MatchAll | Filter::MatchNone | Filter::Field(_) => {}
        }
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.compiled.len()
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

/// Resolve a dotted field path inside a document.
pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| current.get(key))
}

/// Check whether the document `doc` with id `id` matches `query`.
pub(crate) fn matches_query(
    id: &str,
    doc: &Value,
    query: &Query,
    patterns: &Patterns,
) -> EvalResult {
    let matched = match query {
        Query::MatchAll => true,
        Query::Ids { values } => values.iter().any(|v| v == id),
        Query::Term { field, value } => lookup(doc, field).is_some_and(|v| matches_eq(v, value)),
        Query::Text { fields, text } => {
            let wanted: Vec<String> = tokenize(text).collect();
            if wanted.is_empty() {
                false
            } else {
                let have = text_tokens(doc, fields);
                wanted.iter().any(|token| have.contains(token))
            }
        }
        Query::Bool { must, must_not } => {
            for q in must {
                if !matches_query(id, doc, q, patterns)? {
                    return Ok(false);
                }
            }
            for q in must_not {
                if matches_query(id, doc, q, patterns)? {
                    return Ok(false);
                }
            }
            true
        }
        Query::Filtered { query, filter } => {
            matches_query(id, doc, query, patterns)? && matches_filter(doc, filter, patterns)?
        }
    };
    Ok(matched)
}

/// Check whether `doc` passes `filter`.
pub(crate) fn matches_filter(doc: &Value, filter: &Filter, patterns: &Patterns) -> EvalResult {
    let matched = match filter {
        Filter::MatchAll => true,
        Filter::MatchNone => false,
        Filter::Field(expr) => evaluate_condition(doc, expr, patterns)?,
        Filter::And { filters } => {
            for f in filters {
                if !matches_filter(doc, f, patterns)? {
                    return Ok(false);
                }
            }
            true
        }
        Filter::Or { filters } => {
            for f in filters {
                if matches_filter(doc, f, patterns)? {
                    return Ok(true);
                }
            }
            false
        }
        Filter::Not { filter } => !matches_filter(doc, filter, patterns)?,
    };
    Ok(matched)
}

fn evaluate_condition(doc: &Value, expr: &FilterExpr, patterns: &Patterns) -> EvalResult {
    let field_value = match lookup(doc, &expr.field) {
        Some(Value::Null) | None => return Ok(false),
        Some(v) => v,
    };
    let target = &expr.value;

    let matched = match expr.operator {
        FilterOperator::Eq => matches_eq(field_value, target),
        FilterOperator::Ne => !matches_eq(field_value, target),
        FilterOperator::Gt => any_element(field_value, |v| {
            json_cmp(v, target).is_some_and(|o| o == Ordering::Greater)
        }),
        FilterOperator::Lt => any_element(field_value, |v| {
            json_cmp(v, target).is_some_and(|o| o == Ordering::Less)
        }),
        FilterOperator::Gte => any_element(field_value, |v| {
            json_cmp(v, target).is_some_and(|o| o != Ordering::Less)
        }),
        FilterOperator::Lte => any_element(field_value, |v| {
            json_cmp(v, target).is_some_and(|o| o != Ordering::Greater)
        }),
        FilterOperator::Contains => match (field_value, target) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| json_eq(item, needle)),
            _ => false,
        },
        FilterOperator::In => match target {
            Value::Array(candidates) => candidates.iter().any(|c| matches_eq(field_value, c)),
            single => matches_eq(field_value, single),
        },
        FilterOperator::Exists => true,
        FilterOperator::Regex => {
            let Some(source) = target.as_str() else {
                return Ok(false);
            };
            let uncached;
            let pattern = match patterns.compiled.get(source) {
                Some(pattern) => pattern,
                None => {
                    uncached = Regex::new(source)?;
                    &uncached
                }
            };
            any_element(field_value, |v| v.as_str().is_some_and(|s| pattern.is_match(s)))
        }
    };
    Ok(matched)
}

/// Equality with array-field semantics: an array matches when it equals the
/// target or any element does.
fn matches_eq(field_value: &Value, target: &Value) -> bool {
    json_eq(field_value, target)
        || matches!(field_value, Value::Array(items) if items.iter().any(|v| json_eq(v, target)))
}

fn any_element(value: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(pred),
        other => pred(other),
    }
}

/// Equality where numbers compare by value (`10 == 10.0`).
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Ordering between two numbers or two strings; `None` otherwise.
pub(crate) fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Lowercase, split on non-alphanumeric, drop stop words and single characters.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

/// Every token of the string values under `fields` (the whole document when
/// `fields` is empty).
pub(crate) fn text_tokens(doc: &Value, fields: &[String]) -> HashSet<String> {
    let mut strings = Vec::new();
    if fields.is_empty() {
        collect_strings(doc, &mut strings);
    } else {
        for field in fields {
            if let Some(value) = lookup(doc, field) {
                collect_strings(value, &mut strings);
            }
        }
    }
    strings.into_iter().flat_map(tokenize).collect()
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
