use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{TableRef, WriteKind, WritebackRequest};
use crate::session::{Value, ValueKind};
use crate::{DashlinkError, Result};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

/// A single constraint on one field of a form record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Present and not null
    Required,
    /// Value kind must match when present; integers satisfy `Real`
    Kind(ValueKind),
    /// Numeric bounds, both inclusive
    Range { min: Option<f64>, max: Option<f64> },
    /// Minimum character count for text
    MinLength(usize),
    Email,
}

/// Field-level rules applied before a record becomes a [`WritebackRequest`]
#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    rules: Vec<(String, FieldRule)>,
}

impl RecordValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.rules.push((name.into(), rule));
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Check every rule and collect all violations, or build the request
    pub fn validate(&self, table: TableRef, kind: WriteKind, values: BTreeMap<String, Value>) -> Result<WritebackRequest> {
        let errors: Vec<String> = self
            .rules
            .iter()
            .filter_map(|(field, rule)| check_rule(field, rule, values.get(field)))
            .collect();

        if errors.is_empty() {
            Ok(WritebackRequest::new(table, kind, values))
        } else {
            Err(DashlinkError::Validation(errors))
        }
    }
}

fn check_rule(field: &str, rule: &FieldRule, value: Option<&Value>) -> Option<String> {
    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => {
            return match rule {
                FieldRule::Required => Some(format!("{field} is required")),
                _ => None,
            };
        }
    };

    match rule {
        FieldRule::Required => None,
        FieldRule::Kind(expected) => {
            let actual = value.kind();
            let compatible = actual == *expected || (*expected == ValueKind::Real && actual == ValueKind::Integer);
            (!compatible).then(|| format!("{field} must be {expected}, got {actual}"))
        }
        FieldRule::Range { min, max } => match value.as_f64() {
            None => Some(format!("{field} must be numeric")),
            Some(n) => {
                if min.is_some_and(|m| n < m) {
                    min.map(|m| format!("{field} must be at least {m}"))
                } else if max.is_some_and(|m| n > m) {
                    max.map(|m| format!("{field} must be at most {m}"))
                } else {
                    None
                }
            }
        },
        FieldRule::MinLength(len) => match value.as_str() {
            Some(s) if s.trim().chars().count() >= *len => None,
            Some(_) => Some(format!("{field} must be at least {len} characters")),
            None => Some(format!("{field} must be text")),
        },
        FieldRule::Email => {
            let valid = value.as_str().is_some_and(|s| EMAIL_RE.is_match(s));
            (!valid).then(|| format!("{field} must be a valid email address"))
        }
    }
}
