//! Record predicates shared by the local and remote stores.
//!
//! A [`Filter`] is a conjunction of simple clauses over a record's
//! serialized field names. The `SQLite` store turns it into a `WHERE` clause
//! (after checking every field against the table's columns); remote adapters
//! send it as query parameters and evaluate it over JSON documents.

use serde::Serialize;
use serde_json::Value;

use crate::models::RecordId;

/// Right-hand side of an equality clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl FilterValue {
    fn matches_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text(expected), Value::String(actual)) => expected == actual,
            (Self::Integer(expected), Value::Number(actual)) => actual.as_i64() == Some(*expected),
            (Self::Bool(expected), Value::Bool(actual)) => expected == actual,
            (Self::Bool(expected), Value::Number(actual)) => {
                actual.as_i64() == Some(i64::from(*expected))
            }
            _ => false,
        }
    }

    /// Text form used in query strings
    pub fn to_query_value(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(number) => number.to_string(),
            Self::Bool(flag) => flag.to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&RecordId> for FilterValue {
    fn from(value: &RecordId) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Eq(String, FilterValue),
    IsNull(String),
    NotNull(String),
}

impl Clause {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq(field, _) | Self::IsNull(field) | Self::NotNull(field) => field,
        }
    }

    fn matches_json(&self, document: &Value) -> bool {
        let value = document.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, expected) => expected.matches_json(value),
            Self::IsNull(_) => value.is_null(),
            Self::NotNull(_) => !value.is_null(),
        }
    }
}

/// Conjunction of clauses; the empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub const fn all() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    pub fn by_id(id: &RecordId) -> Self {
        Self::all().field_eq("id", id)
    }

    /// Records that are not soft-deleted
    pub fn live() -> Self {
        Self::all().field_null("stashed_at")
    }

    /// Records holding a write the remote has not confirmed
    pub fn staged() -> Self {
        Self::all().field_not_null("stained_at")
    }

    #[must_use]
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.clauses.push(Clause::Eq(field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn field_null(mut self, field: impl Into<String>) -> Self {
        self.clauses.push(Clause::IsNull(field.into()));
        self
    }

    #[must_use]
    pub fn field_not_null(mut self, field: impl Into<String>) -> Self {
        self.clauses.push(Clause::NotNull(field.into()));
        self
    }

    /// Both filters must match
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        for clause in other.clauses {
            if !self.clauses.contains(&clause) {
                self.clauses.push(clause);
            }
        }
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches_json(&self, document: &Value) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.matches_json(document))
    }

    /// Evaluate against a record's serialized form.
    pub fn matches<T: Serialize>(&self, record: &T) -> bool {
        if self.is_empty() {
            return true;
        }
        serde_json::to_value(record).is_ok_and(|document| self.matches_json(&document))
    }

    /// `field=value` pairs; null checks are encoded as `field__isnull=true|false`.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.clauses
            .iter()
            .map(|clause| match clause {
                Clause::Eq(field, value) => (field.clone(), value.to_query_value()),
                Clause::IsNull(field) => (format!("{field}__isnull"), "true".to_string()),
                Clause::NotNull(field) => (format!("{field}__isnull"), "false".to_string()),
            })
            .collect()
    }
}
