//! Error types shared by the registry loader and the conversion pipeline.

use std::path::PathBuf;

use sqlparser::parser::ParserError;
use thiserror::Error;

/// Failures while loading the schema-mapping registry. These are startup
/// errors; a process that cannot load its registry cannot convert anything.
#[derive(Debug, Error)]
pub enum SchemaLoadError {
    #[error("failed to read schema source '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema source is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("table record #{index} has an empty '{key}'")]
    MissingValue { index: usize, key: &'static str },
    #[error("table '{0}' is defined more than once")]
    DuplicateTable(String),
    #[error("field id '{field_id}' is used twice in template '{template}'")]
    DuplicateFieldId { template: String, field_id: String },
    #[error("schema source contains no table definitions")]
    Empty,
}

/// Fatal conversion failures. Anything that can be degraded instead (unmapped
/// fields under the drop policy, unsupported expression nodes) is reported
/// through [`crate::Omission`] and never surfaces here.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to parse SQL: {0}")]
    Parse(ParserError),
    #[error("expected exactly one statement, found {0}")]
    StatementCount(usize),
    #[error("only SELECT statements can be converted")]
    NotASelect,
    #[error("query does not select from a table")]
    MissingTable,
    #[error("joins and multi-table FROM clauses are not supported (found {0} relations)")]
    MultipleTables(usize),
    #[error("unsupported FROM source: {0}")]
    UnsupportedTableSource(String),
    #[error("no table mapping found for '{0}'")]
    TableMappingNotFound(String),
    #[error("no mapping found for fields: {}", .0.join(", "))]
    UnmappedFields(Vec<String>),
    #[error("rewritten query failed to parse: {0}")]
    Reparse(ParserError),
}

#[derive(Debug, Error)]
#[error("unknown unmapped-field policy '{0}', expected 'drop' or 'reject'")]
pub struct UnknownPolicy(pub String);
