//! Two-phase conversion: analyze and resolve the raw query, rewrite its text,
//! then re-parse the rewritten text and normalize it.

use std::{collections::HashSet, fmt, str::FromStr, sync::Arc};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    analysis::{analyze, parse_single},
    error::{ConversionError, UnknownPolicy},
    model::{Omission, QueryNode},
    normalizer::{Normalized, Normalizer},
    registry::Registry,
    resolver::Resolver,
    rewriter::{
        rewrite_with_report, FieldSubstitution, RewriteReport, RewrittenQuery, TableSubstitution,
    },
};

/// What to do with field tokens the registry cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmappedFieldPolicy {
    /// Leave the token as written and record an omission.
    #[default]
    Drop,
    /// Fail the conversion with [`ConversionError::UnmappedFields`].
    Reject,
}

impl UnmappedFieldPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmappedFieldPolicy::Drop => "drop",
            UnmappedFieldPolicy::Reject => "reject",
        }
    }
}

impl FromStr for UnmappedFieldPolicy {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(UnmappedFieldPolicy::Drop),
            "reject" => Ok(UnmappedFieldPolicy::Reject),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for UnmappedFieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConverterConfig {
    pub unmapped_fields: UnmappedFieldPolicy,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub rewritten: RewrittenQuery,
    pub model: QueryNode,
    /// Storage id of the primary table.
    pub table: String,
    pub omissions: Vec<Omission>,
}

impl Conversion {
    /// True when nothing was dropped along the way.
    pub fn is_complete(&self) -> bool {
        self.omissions.is_empty()
    }
}

/// Converts logical queries against a shared, read-only [`Registry`].
#[derive(Debug, Clone)]
pub struct Converter {
    registry: Arc<Registry>,
    config: ConverterConfig,
}

impl Converter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, ConverterConfig::default())
    }

    pub fn with_config(registry: Arc<Registry>, config: ConverterConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    #[instrument(skip(self, sql), fields(sql_len = sql.len()))]
    pub fn convert(&self, sql: &str) -> Result<Conversion, ConversionError> {
        let (_, analysis) = analyze(sql)?;

        let tables = analysis
            .tables
            .iter()
            .map(|name| {
                self.registry
                    .table(name)
                    .map(|mapping| TableSubstitution {
                        logical: mapping.logical_name.clone(),
                        mapped: mapping.mapped_id.clone(),
                    })
                    .ok_or_else(|| ConversionError::TableMappingNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let table = tables
            .iter()
            .find(|substitution| substitution.logical == analysis.primary_table)
            .map(|substitution| substitution.mapped.clone())
            .ok_or(ConversionError::MissingTable)?;

        let resolver = Resolver::new(&self.registry);
        let mut fields = Vec::with_capacity(analysis.field_tokens.len());
        let mut known_columns = HashSet::new();
        let mut unmapped = Vec::new();
        for token in &analysis.field_tokens {
            match resolver.resolve(token) {
                Some(resolved) => {
                    debug!(token = %token, mapped = %resolved.mapped_id, "field resolved");
                    known_columns.insert(resolved.mapped_id.clone());
                    fields.push(FieldSubstitution {
                        token: token.clone(),
                        mapped: resolved.mapped_id,
                    });
                }
                None if analysis.is_alias(token) => {}
                None => unmapped.push(token.clone()),
            }
        }

        if !unmapped.is_empty() {
            match self.config.unmapped_fields {
                UnmappedFieldPolicy::Reject => {
                    return Err(ConversionError::UnmappedFields(unmapped));
                }
                UnmappedFieldPolicy::Drop => {
                    warn!(fields = ?unmapped, "no mapping for fields; leaving them as written");
                }
            }
        }

        let RewriteReport {
            query: rewritten,
            unmatched_fields,
        } = rewrite_with_report(sql, &tables, &fields);
        let unrewritten: Vec<Omission> = fields
            .iter()
            .filter(|field| unmatched_fields.contains(&field.token))
            .map(|field| Omission::UnrewrittenField {
                token: field.token.clone(),
                mapped: field.mapped.clone(),
            })
            .collect();
        if !unrewritten.is_empty() {
            warn!(fields = ?unmatched_fields, "resolved fields not found in query text");
        }

        let statement = parse_single(rewritten.as_str(), ConversionError::Reparse)?;
        let Normalized {
            model,
            omissions: unsupported,
        } = Normalizer::with_known_columns(&known_columns).normalize(&statement);

        let mut omissions: Vec<Omission> = unmapped
            .into_iter()
            .map(|token| Omission::UnmappedField { token })
            .collect();
        omissions.extend(unrewritten);
        omissions.extend(unsupported);

        info!(
            table = %table,
            mapped_fields = fields.len(),
            omissions = omissions.len(),
            "query converted"
        );

        Ok(Conversion {
            rewritten,
            model,
            table,
            omissions,
        })
    }
}
