pub mod executor;
pub mod validator;

pub use executor::WritebackExecutor;
pub use validator::{FieldRule, RecordValidator};

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::session::Value;
use crate::{DashlinkError, Result};

/// Fully or partially qualified table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Parse `table`, `schema.table` or `database.schema.table`
    pub fn parse(qualified: &str) -> Result<Self> {
        let parts: Vec<&str> = qualified.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(DashlinkError::validation(format!("invalid table reference '{qualified}'")));
        }
        match parts.as_slice() {
            [name] => Ok(Self::new(*name)),
            [schema, name] => Ok(Self::new(*name).with_schema(*schema)),
            [database, schema, name] => Ok(Self::new(*name).with_schema(*schema).with_database(*database)),
            _ => Err(DashlinkError::validation(format!(
                "table reference '{qualified}' has too many parts"
            ))),
        }
    }

    /// Name parts in order, outermost first
    pub fn parts(&self) -> Vec<&str> {
        self.database
            .iter()
            .chain(self.schema.iter())
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
            .collect()
    }

    pub fn qualified(&self) -> String {
        self.parts().join(".")
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    Insert,
    /// Update rows matching every key column
    Update { key: BTreeMap<String, Value> },
}

impl WriteKind {
    pub fn label(&self) -> &'static str {
        match self {
            WriteKind::Insert => "INSERT",
            WriteKind::Update { .. } => "UPDATE",
        }
    }
}

/// A validated mutation, ready for [`WritebackExecutor::submit`]
#[derive(Debug, Clone, PartialEq)]
pub struct WritebackRequest {
    table: TableRef,
    kind: WriteKind,
    columns: BTreeMap<String, Value>,
}

impl WritebackRequest {
    pub(crate) fn new(table: TableRef, kind: WriteKind, columns: BTreeMap<String, Value>) -> Self {
        Self { table, kind, columns }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn kind(&self) -> &WriteKind {
        &self.kind
    }

    pub fn columns(&self) -> &BTreeMap<String, Value> {
        &self.columns
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritebackOutcome {
    pub statement_id: Uuid,
    pub table: TableRef,
    pub kind: &'static str,
    pub rows_affected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_ref() {
        let t = TableRef::parse("analytics.public.orders").unwrap();
        assert_eq!(t.database.as_deref(), Some("analytics"));
        assert_eq!(t.schema.as_deref(), Some("public"));
        assert_eq!(t.name, "orders");
        assert_eq!(t.to_string(), "analytics.public.orders");

        assert_eq!(TableRef::parse("main.orders").unwrap().parts(), vec!["main", "orders"]);
        assert_eq!(TableRef::parse("orders").unwrap(), TableRef::new("orders"));
    }

    #[test]
    fn test_parse_rejects_bad_refs() {
        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse("a..b").is_err());
        assert!(TableRef::parse("a.b.c.d").is_err());
    }
}
