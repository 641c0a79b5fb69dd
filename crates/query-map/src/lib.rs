//! Logical-to-storage SQL query mapping.
//!
//! Callers write SELECT queries against logical table and field names. This
//! crate resolves those names through a schema-mapping [`Registry`], rewrites
//! the query text so it addresses storage identifiers (backtick quoted), and
//! normalizes the rewritten query into a [`QueryNode`] tree that downstream
//! consumers can inspect without a SQL parser of their own.
//!
//! ```no_run
//! use std::sync::Arc;
//! use query_map::{Converter, JsonFileSource, Registry, DEFAULT_BASE_TEMPLATE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::load(&JsonFileSource::default(), DEFAULT_BASE_TEMPLATE)?;
//! let converter = Converter::new(Arc::new(registry));
//! let conversion = converter.convert("SELECT id, status FROM lead WHERE status = 'open'")?;
//! println!("{}", conversion.rewritten);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod converter;
pub mod error;
pub mod model;
pub mod normalizer;
pub mod registry;
pub mod resolver;
pub mod rewriter;

pub use converter::{Conversion, Converter, ConverterConfig, UnmappedFieldPolicy};
pub use error::{ConversionError, SchemaLoadError, UnknownPolicy};
pub use model::{AggregationKind, Omission, QueryNode, Select};
pub use registry::{
    FieldType, JsonFileSource, JsonStrSource, Registry, SchemaSource, TableDefinition,
    DEFAULT_BASE_TEMPLATE, DEFAULT_SCHEMA_PATH,
};
pub use resolver::{ResolvedField, Resolver};
pub use rewriter::{RewriteReport, RewrittenQuery};
