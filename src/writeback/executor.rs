use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{WriteKind, WritebackOutcome, WritebackRequest};
use crate::context::ExecutionContext;
use crate::session::{Lifetime, Scoped, Statement, Value};
use crate::{DashlinkError, Result};

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap());

/// Turns validated requests into single parameterized statements
pub struct WritebackExecutor {
    context: Arc<ExecutionContext>,
}

impl Scoped for WritebackExecutor {
    const LIFETIME: Lifetime = Lifetime::Process;
}

impl WritebackExecutor {
    pub fn new(context: Arc<ExecutionContext>) -> Self {
        Self { context }
    }

    /// Check the request's shape, then issue exactly one statement.
    ///
    /// Nothing reaches the warehouse unless every check passes. Failures from
    /// the warehouse are returned as they are, without retry.
    pub async fn submit(&self, request: WritebackRequest) -> Result<WritebackOutcome> {
        check_structure(&request)?;
        let statement = build_statement(&request);
        debug!("Writeback {}: {}", statement.id, statement.sql);

        let rows_affected = self.context.session().execute(&statement).await?;
        info!(
            "{} on {} affected {} row(s)",
            request.kind().label(),
            request.table(),
            rows_affected
        );

        Ok(WritebackOutcome {
            statement_id: statement.id,
            kind: request.kind().label(),
            table: request.table().clone(),
            rows_affected,
        })
    }
}

fn check_structure(request: &WritebackRequest) -> Result<()> {
    let mut errors = Vec::new();

    if request.table().name.trim().is_empty() {
        errors.push("table name is empty".to_string());
    }
    for part in request.table().parts() {
        if !part.is_empty() && !IDENTIFIER_RE.is_match(part) {
            errors.push(format!("invalid identifier '{part}' in table reference"));
        }
    }

    if request.columns().is_empty() {
        errors.push("no columns to write".to_string());
    }
    let mut names: Vec<&String> = request.columns().keys().collect();
    if let WriteKind::Update { key } = request.kind() {
        if key.is_empty() {
            errors.push("update requires at least one key column".to_string());
        }
        names.extend(key.keys());
    }
    for name in names {
        if !IDENTIFIER_RE.is_match(name) {
            errors.push(format!("invalid column name '{name}'"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DashlinkError::Validation(errors))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn build_statement(request: &WritebackRequest) -> Statement {
    let table = request
        .table()
        .parts()
        .into_iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(".");
    let columns = request.columns();
    let mut params: Vec<Value> = columns.values().cloned().collect();

    let sql = match request.kind() {
        WriteKind::Insert => {
            let names = columns.keys().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!("INSERT INTO {table} ({names}) VALUES ({placeholders})")
        }
        WriteKind::Update { key } => {
            let assignments = columns
                .keys()
                .map(|c| format!("{} = ?", quote(c)))
                .collect::<Vec<_>>()
                .join(", ");
            let predicate = key
                .keys()
                .map(|c| format!("{} = ?", quote(c)))
                .collect::<Vec<_>>()
                .join(" AND ");
            params.extend(key.values().cloned());
            format!("UPDATE {table} SET {assignments} WHERE {predicate}")
        }
    };

    Statement::new(sql, params)
}
