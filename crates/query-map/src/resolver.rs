//! Field token resolution against the registry.

use crate::registry::{FieldType, Registry};

/// Separator between a template prefix and a field name in a token.
pub const TEMPLATE_DELIMITER: char = '.';

/// Quote character of the target store's identifiers.
pub const IDENTIFIER_QUOTE: char = '`';

/// A field token that resolved to a storage identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// Raw storage id: `<templateId>.<fieldId>` for prefixed tokens,
    /// `<fieldId>` for base-template fields.
    pub mapped_id: String,
    pub field_type: FieldType,
    /// Template the field was found in.
    pub template: String,
    pub qualified: bool,
}

impl ResolvedField {
    /// The id as written into rewritten query text.
    pub fn render(&self) -> String {
        quote_identifier(&self.mapped_id)
    }
}

pub fn quote_identifier(id: &str) -> String {
    format!("{IDENTIFIER_QUOTE}{id}{IDENTIFIER_QUOTE}")
}

/// Read-only view over a [`Registry`] that maps raw field tokens.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    registry: &'r Registry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Resolves `token`, which is either `<template>.<field>` or a bare base
    /// template field. Returns `None` when the token is unmapped.
    pub fn resolve(&self, token: &str) -> Option<ResolvedField> {
        if let Some(resolved) = self.resolve_prefixed(token) {
            return Some(resolved);
        }

        let base = self.registry.base_template()?;
        base.field(token).map(|field| ResolvedField {
            mapped_id: field.mapped_id.clone(),
            field_type: field.field_type.clone(),
            template: base.name.clone(),
            qualified: false,
        })
    }

    fn resolve_prefixed(&self, token: &str) -> Option<ResolvedField> {
        let template = self
            .registry
            .templates()
            .iter()
            .filter(|template| has_template_prefix(token, &template.name))
            .max_by_key(|template| template.name.len())?;

        let remainder = &token[template.name.len() + TEMPLATE_DELIMITER.len_utf8()..];
        let field = template.field(remainder)?;

        Some(ResolvedField {
            mapped_id: format!("{}{TEMPLATE_DELIMITER}{}", template.id, field.mapped_id),
            field_type: field.field_type.clone(),
            template: template.name.clone(),
            qualified: true,
        })
    }
}

fn has_template_prefix(token: &str, template: &str) -> bool {
    token
        .strip_prefix(template)
        .and_then(|rest| rest.strip_prefix(TEMPLATE_DELIMITER))
        .is_some_and(|field| !field.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FieldRecord, TableDefinition};

    fn table(name: &str, template_id: &str, fields: &[(&str, &str)]) -> TableDefinition {
        TableDefinition {
            table_name: name.into(),
            mapped_table_id: format!("{name}_tbl"),
            template_id: template_id.into(),
            template_type: String::new(),
            fields: fields
                .iter()
                .map(|(field_name, field_id)| FieldRecord {
                    field_name: (*field_name).into(),
                    field_id: (*field_id).into(),
                    field_type: FieldType::Text,
                })
                .collect(),
        }
    }

    fn registry() -> Registry {
        Registry::from_definitions(
            vec![
                table("lead", "tpl_lead", &[("id", "f1"), ("status", "f2")]),
                table("session", "tpl_s", &[("status", "s1"), ("detail_status", "s2")]),
                table("session_detail", "tpl_sd", &[("status", "sd1")]),
            ],
            "lead",
        )
        .unwrap()
    }

    #[test]
    fn bare_tokens_resolve_against_base_template() {
        let registry = registry();
        let resolved = Resolver::new(&registry).resolve("status").unwrap();
        assert_eq!(resolved.mapped_id, "f2");
        assert!(!resolved.qualified);
        assert_eq!(resolved.render(), "`f2`");
    }

    #[test]
    fn longest_template_prefix_wins() {
        let registry = registry();
        let resolver = Resolver::new(&registry);

        let resolved = resolver.resolve("session_detail.status").unwrap();
        assert_eq!(resolved.mapped_id, "tpl_sd.sd1");
        assert_eq!(resolved.template, "session_detail");
        assert_eq!(resolved.render(), "`tpl_sd.sd1`");

        let resolved = resolver.resolve("session.status").unwrap();
        assert_eq!(resolved.mapped_id, "tpl_s.s1");
    }

    #[test]
    fn prefix_must_end_at_delimiter() {
        let registry = registry();
        let resolver = Resolver::new(&registry);
        assert!(resolver.resolve("sessionx.status").is_none());
        assert!(resolver.resolve("session.").is_none());
        assert!(resolver.resolve("session_status").is_none());
    }

    #[test]
    fn unknown_remainder_falls_back_to_base_then_unmapped() {
        let registry = registry();
        let resolver = Resolver::new(&registry);
        assert!(resolver.resolve("session.ghost").is_none());
        assert!(resolver.resolve("ghost_field").is_none());

        let resolved = resolver.resolve("lead.id").unwrap();
        assert_eq!(resolved.mapped_id, "tpl_lead.f1");
    }
}
