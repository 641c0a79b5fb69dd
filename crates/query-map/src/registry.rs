//! Schema-mapping registry.
//!
//! The registry is built once from a list of table records and is read-only
//! afterwards. Every table record contributes a table mapping (logical table
//! name to storage table id) and a template of the same name holding the
//! table's field definitions. One template is distinguished as the base
//! template; its fields resolve without a template prefix.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::SchemaLoadError;

/// Template whose fields are addressable without a `template.` prefix.
pub const DEFAULT_BASE_TEMPLATE: &str = "lead";

/// Schema file read by [`JsonFileSource::default`].
pub const DEFAULT_SCHEMA_PATH: &str = "tables.json";

/// One table record of the schema export.
///
/// Both the canonical keys and the legacy export keys (`Table Name`,
/// `sales_template_id`, ...) are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDefinition {
    #[serde(alias = "Table Name")]
    pub table_name: String,
    #[serde(alias = "big_query_table_name")]
    pub mapped_table_id: String,
    #[serde(alias = "sales_template_id")]
    pub template_id: String,
    #[serde(default, alias = "sales_template_type")]
    pub template_type: String,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
}

/// Field entry of a [`TableDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldRecord {
    pub field_name: String,
    #[serde(alias = "bigquery_column_name")]
    pub field_id: String,
    pub field_type: FieldType,
}

/// Declared type of a mapped field. Unknown tags are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Number,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Email,
    Phone,
    Picklist,
    MultiPicklist,
    Url,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Picklist => "picklist",
            FieldType::MultiPicklist => "multi_picklist",
            FieldType::Url => "url",
            FieldType::Other(tag) => tag,
        }
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "text" | "string" => FieldType::Text,
            "number" | "integer" => FieldType::Number,
            "decimal" | "float" => FieldType::Decimal,
            "boolean" | "bool" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" | "timestamp" => FieldType::DateTime,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "picklist" => FieldType::Picklist,
            "multi_picklist" | "multipicklist" => FieldType::MultiPicklist,
            "url" => FieldType::Url,
            _ => FieldType::Other(tag),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract for anything that can supply table records to the registry.
pub trait SchemaSource {
    fn table_definitions(&self) -> Result<Vec<TableDefinition>, SchemaLoadError>;
}

/// Reads a JSON array of table records from disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileSource {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_PATH)
    }
}

impl SchemaSource for JsonFileSource {
    fn table_definitions(&self) -> Result<Vec<TableDefinition>, SchemaLoadError> {
        let raw = fs::read(&self.path).map_err(|source| SchemaLoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// In-memory JSON document, mostly useful for embedding and tests.
#[derive(Debug, Clone, Copy)]
pub struct JsonStrSource<'a>(pub &'a str);

impl SchemaSource for JsonStrSource<'_> {
    fn table_definitions(&self) -> Result<Vec<TableDefinition>, SchemaLoadError> {
        Ok(serde_json::from_str(self.0)?)
    }
}

impl SchemaSource for [TableDefinition] {
    fn table_definitions(&self) -> Result<Vec<TableDefinition>, SchemaLoadError> {
        Ok(self.to_vec())
    }
}

impl SchemaSource for Vec<TableDefinition> {
    fn table_definitions(&self) -> Result<Vec<TableDefinition>, SchemaLoadError> {
        Ok(self.clone())
    }
}

/// Logical table name bound to its storage table id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub logical_name: String,
    pub mapped_id: String,
}

/// A mapped field owned by a [`TemplateMapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub logical_name: String,
    pub mapped_id: String,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMapping {
    pub name: String,
    pub id: String,
    pub template_type: String,
    fields: HashMap<String, FieldDefinition>,
}

impl TemplateMapping {
    pub fn field(&self, logical_name: &str) -> Option<&FieldDefinition> {
        self.fields.get(logical_name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Immutable lookup structures for identifier resolution.
#[derive(Debug, Clone)]
pub struct Registry {
    tables: HashMap<String, TableMapping>,
    templates: Vec<TemplateMapping>,
    template_index: HashMap<String, usize>,
    base_template: Option<usize>,
    base_template_name: String,
    fingerprint: String,
}

impl Registry {
    /// Loads the registry from `source`, treating `base_template` as the
    /// template whose fields need no prefix.
    pub fn load<S>(source: &S, base_template: &str) -> Result<Self, SchemaLoadError>
    where
        S: SchemaSource + ?Sized,
    {
        let definitions = source.table_definitions()?;
        Self::from_definitions(definitions, base_template)
    }

    pub fn from_definitions(
        definitions: Vec<TableDefinition>,
        base_template: &str,
    ) -> Result<Self, SchemaLoadError> {
        if definitions.is_empty() {
            return Err(SchemaLoadError::Empty);
        }

        let fingerprint = format!("{:x}", Sha256::digest(serde_json::to_vec(&definitions)?));

        let mut tables = HashMap::with_capacity(definitions.len());
        let mut templates = Vec::with_capacity(definitions.len());
        let mut template_index = HashMap::with_capacity(definitions.len());

        for (index, definition) in definitions.into_iter().enumerate() {
            validate_definition(index, &definition)?;

            let fields = build_fields(&definition)?;
            let TableDefinition {
                table_name,
                mapped_table_id,
                template_id,
                template_type,
                ..
            } = definition;

            match tables.entry(table_name.clone()) {
                Entry::Occupied(_) => return Err(SchemaLoadError::DuplicateTable(table_name)),
                Entry::Vacant(slot) => {
                    slot.insert(TableMapping {
                        logical_name: table_name.clone(),
                        mapped_id: mapped_table_id,
                    });
                }
            }

            template_index.insert(table_name.clone(), templates.len());
            templates.push(TemplateMapping {
                name: table_name,
                id: template_id,
                template_type,
                fields,
            });
        }

        let base = template_index.get(base_template).copied();
        if base.is_none() {
            warn!(
                base_template,
                "base template not present in schema; unprefixed fields will not resolve"
            );
        }

        info!(
            tables = tables.len(),
            templates = templates.len(),
            base_template,
            %fingerprint,
            "schema registry loaded"
        );

        Ok(Self {
            tables,
            templates,
            template_index,
            base_template: base,
            base_template_name: base_template.to_owned(),
            fingerprint,
        })
    }

    /// Exact-match table lookup.
    pub fn table(&self, logical_name: &str) -> Option<&TableMapping> {
        self.tables.get(logical_name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMapping> {
        self.tables.values()
    }

    pub fn template(&self, name: &str) -> Option<&TemplateMapping> {
        self.template_index
            .get(name)
            .map(|&index| &self.templates[index])
    }

    /// Templates in load order.
    pub fn templates(&self) -> &[TemplateMapping] {
        &self.templates
    }

    pub fn base_template(&self) -> Option<&TemplateMapping> {
        self.base_template.map(|index| &self.templates[index])
    }

    pub fn base_template_name(&self) -> &str {
        &self.base_template_name
    }

    /// SHA-256 over the canonical JSON form of the loaded records, so the
    /// legacy and canonical spellings of one schema share a fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn validate_definition(index: usize, definition: &TableDefinition) -> Result<(), SchemaLoadError> {
    let required = [
        ("table_name", &definition.table_name),
        ("mapped_table_id", &definition.mapped_table_id),
        ("template_id", &definition.template_id),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(SchemaLoadError::MissingValue { index, key });
        }
    }

    for field in &definition.fields {
        if field.field_name.trim().is_empty() {
            return Err(SchemaLoadError::MissingValue {
                index,
                key: "fields[].field_name",
            });
        }
        if field.field_id.trim().is_empty() {
            return Err(SchemaLoadError::MissingValue {
                index,
                key: "fields[].field_id",
            });
        }
        if field.field_type.as_str().trim().is_empty() {
            return Err(SchemaLoadError::MissingValue {
                index,
                key: "fields[].field_type",
            });
        }
    }
    Ok(())
}

fn build_fields(
    definition: &TableDefinition,
) -> Result<HashMap<String, FieldDefinition>, SchemaLoadError> {
    let mut seen_ids = HashSet::with_capacity(definition.fields.len());
    let mut fields = HashMap::with_capacity(definition.fields.len());

    for record in &definition.fields {
        if !seen_ids.insert(record.field_id.as_str()) {
            return Err(SchemaLoadError::DuplicateFieldId {
                template: definition.table_name.clone(),
                field_id: record.field_id.clone(),
            });
        }
        fields.insert(
            record.field_name.clone(),
            FieldDefinition {
                logical_name: record.field_name.clone(),
                mapped_id: record.field_id.clone(),
                field_type: record.field_type.clone(),
            },
        );
    }
    Ok(fields)
}
