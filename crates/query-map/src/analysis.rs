//! First pass over the raw query: statement shape, referenced tables and the
//! field tokens that need resolving before the text is rewritten.

use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, Ident, ObjectName, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins, Visit, Visitor,
};
use sqlparser::dialect::{Dialect, GenericDialect};
use sqlparser::parser::{Parser, ParserError};

use crate::error::ConversionError;

/// Functions whose bare keyword arguments name a date part, not a column.
const DATE_PART_FUNCTIONS: [&str; 5] = ["DATE_TRUNC", "DATEADD", "DATE_ADD", "DATE_SUB", "DATEDIFF"];

const DATE_PARTS: [&str; 14] = [
    "MICROSECOND",
    "MILLISECOND",
    "SECOND",
    "MINUTE",
    "HOUR",
    "DAY",
    "DAYOFWEEK",
    "DAYOFYEAR",
    "WEEK",
    "ISOWEEK",
    "MONTH",
    "QUARTER",
    "YEAR",
    "ISOYEAR",
];

/// Generic SQL that also accepts backtick-quoted identifiers, so the same
/// dialect reads both the logical query and its rewritten form.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryDialect;

impl Dialect for QueryDialect {
    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '"' || ch == '`'
    }

    fn is_identifier_start(&self, ch: char) -> bool {
        GenericDialect.is_identifier_start(ch)
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        GenericDialect.is_identifier_part(ch)
    }

    fn supports_group_by_expr(&self) -> bool {
        true
    }
}

/// What the converter needs to know about a raw query before rewriting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAnalysis {
    /// Table of the leftmost top-level select.
    pub primary_table: String,
    /// Every table referenced by the query, in visit order, without repeats.
    pub tables: Vec<String>,
    /// Column references in first-seen order, excluding `@` variables.
    /// Compound references are joined with `.`. References to projection
    /// aliases are included; see [`QueryAnalysis::is_alias`].
    pub field_tokens: Vec<String>,
    pub aliases: HashSet<String>,
}

/// Parses `sql` and requires exactly one statement. `on_error` picks the
/// error variant so the same helper serves both parses of a conversion.
pub fn parse_single(
    sql: &str,
    on_error: fn(ParserError) -> ConversionError,
) -> Result<Statement, ConversionError> {
    let mut statements = Parser::parse_sql(&QueryDialect, sql).map_err(on_error)?;
    if statements.len() != 1 {
        return Err(ConversionError::StatementCount(statements.len()));
    }
    Ok(statements.remove(0))
}

pub fn analyze(sql: &str) -> Result<(Statement, QueryAnalysis), ConversionError> {
    let statement = parse_single(sql, ConversionError::Parse)?;
    let Statement::Query(query) = &statement else {
        return Err(ConversionError::NotASelect);
    };
    if !matches!(
        query.body.as_ref(),
        SetExpr::Select(_) | SetExpr::Query(_) | SetExpr::SetOperation { .. }
    ) {
        return Err(ConversionError::NotASelect);
    }

    let mut collector = Collector::default();
    if let ControlFlow::Break(err) = collector.collect_set_expr(&query.body) {
        return Err(err);
    }
    if let ControlFlow::Break(err) = statement.visit(&mut collector) {
        return Err(err);
    }

    let Collector {
        tables,
        aliases,
        tokens,
        ..
    } = collector;
    let primary_table = tables.first().cloned().ok_or(ConversionError::MissingTable)?;

    let analysis = QueryAnalysis {
        primary_table,
        tables,
        field_tokens: tokens,
        aliases,
    };
    Ok((statement, analysis))
}

impl QueryAnalysis {
    /// Whether `token` names a projection alias, e.g. `ct` in
    /// `ORDER BY ct`.
    pub fn is_alias(&self, token: &str) -> bool {
        self.aliases.contains(token)
    }
}

pub(crate) fn join_idents(parts: &[Ident]) -> String {
    parts
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) fn object_name(name: &ObjectName) -> String {
    join_idents(&name.0)
}

/// The date part named by `arg` when it is a bare keyword argument of a
/// date function, e.g. `MONTH` in `DATE_TRUNC(created, MONTH)`.
pub(crate) fn date_part<'e>(function: &Function, arg: &'e Expr) -> Option<&'e str> {
    let name = function.name.0.last()?.value.to_ascii_uppercase();
    if !DATE_PART_FUNCTIONS.contains(&name.as_str()) {
        return None;
    }
    match arg {
        Expr::Identifier(ident)
            if ident.quote_style.is_none()
                && DATE_PARTS.contains(&ident.value.to_ascii_uppercase().as_str()) =>
        {
            Some(ident.value.as_str())
        }
        _ => None,
    }
}

pub(crate) fn argument_exprs(function: &Function) -> impl Iterator<Item = &Expr> {
    function.args.iter().filter_map(|arg| match arg {
        FunctionArg::Named {
            arg: FunctionArgExpr::Expr(expr),
            ..
        }
        | FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Some(expr),
        _ => None,
    })
}

#[derive(Debug, Default)]
struct Collector {
    tables: Vec<String>,
    aliases: HashSet<String>,
    tokens: Vec<String>,
    seen: HashSet<String>,
    /// Date-part arguments found so far, by node address in the tree being
    /// visited.
    date_parts: HashSet<*const Expr>,
}

impl Collector {
    fn collect_set_expr(&mut self, body: &SetExpr) -> ControlFlow<ConversionError> {
        match body {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    if let SelectItem::ExprWithAlias { alias, .. } = item {
                        self.aliases.insert(alias.value.clone());
                    }
                }
                self.collect_from(&select.from)
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_set_expr(left)?;
                self.collect_set_expr(right)
            }
            SetExpr::Query(query) => self.collect_set_expr(&query.body),
            _ => ControlFlow::Continue(()),
        }
    }

    fn collect_from(&mut self, from: &[TableWithJoins]) -> ControlFlow<ConversionError> {
        let relations: usize = from.iter().map(|table| 1 + table.joins.len()).sum();
        if relations > 1 {
            return ControlFlow::Break(ConversionError::MultipleTables(relations));
        }

        if let Some(table) = from.first() {
            match &table.relation {
                TableFactor::Table { name, .. } => {
                    let name = object_name(name);
                    if !self.tables.contains(&name) {
                        self.tables.push(name);
                    }
                }
                other => {
                    return ControlFlow::Break(ConversionError::UnsupportedTableSource(
                        other.to_string(),
                    ))
                }
            }
        }
        ControlFlow::Continue(())
    }
}

impl Visitor for Collector {
    type Break = ConversionError;

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        let token = match expr {
            Expr::Subquery(query)
            | Expr::InSubquery {
                subquery: query, ..
            }
            | Expr::Exists {
                subquery: query, ..
            } => return self.collect_set_expr(&query.body),
            Expr::Function(function) => {
                for arg in argument_exprs(function) {
                    if date_part(function, arg).is_some() {
                        self.date_parts.insert(arg as *const Expr);
                    }
                }
                return ControlFlow::Continue(());
            }
            Expr::Identifier(_) if self.date_parts.contains(&(expr as *const Expr)) => {
                return ControlFlow::Continue(());
            }
            Expr::Identifier(ident) => ident.value.clone(),
            Expr::CompoundIdentifier(parts) => join_idents(parts),
            _ => return ControlFlow::Continue(()),
        };
        if !token.starts_with('@') && self.seen.insert(token.clone()) {
            self.tokens.push(token);
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(sql: &str) -> QueryAnalysis {
        analyze(sql).unwrap().1
    }

    #[test]
    fn collects_tables_and_tokens_in_order() {
        let analysis = analysis(
            "SELECT id, status AS s FROM lead WHERE s = 1 AND session_detail.status = 'x' AND id > 2",
        );
        assert_eq!(analysis.primary_table, "lead");
        assert_eq!(analysis.tables, vec!["lead"]);
        assert_eq!(
            analysis.field_tokens,
            vec!["id", "status", "s", "session_detail.status"]
        );
        assert!(analysis.is_alias("s"));
        assert!(!analysis.is_alias("status"));
    }

    #[test]
    fn quoted_table_names_are_unquoted() {
        assert_eq!(analysis("SELECT id FROM \"lead\"").primary_table, "lead");
        assert_eq!(analysis("SELECT id FROM `lead`").primary_table, "lead");
    }

    #[test]
    fn subquery_and_union_tables_are_collected() {
        let analysis = analysis(
            "SELECT id FROM lead WHERE id IN (SELECT lead_id FROM session) \
             UNION SELECT id FROM contact",
        );
        assert_eq!(analysis.primary_table, "lead");
        assert_eq!(analysis.tables, vec!["lead", "contact", "session"]);
    }

    #[test]
    fn rewritten_text_parses_with_backticks() {
        let analysis = analysis("SELECT `tpl_s.s1`, \"f2\" FROM `leads_tbl` WHERE `f1` = 1");
        assert_eq!(analysis.primary_table, "leads_tbl");
        assert_eq!(analysis.field_tokens, vec!["tpl_s.s1", "f2", "f1"]);
    }

    #[test]
    fn nested_and_exists_subqueries_are_collected() {
        let analysis = analysis(
            "SELECT id FROM lead WHERE EXISTS (SELECT 1 FROM session WHERE ref = \
             (SELECT MAX(id) FROM contact)) AND id IN ((SELECT id FROM account))",
        );
        assert_eq!(analysis.tables, vec!["lead", "session", "contact", "account"]);
    }

    #[test]
    fn date_parts_are_not_field_tokens() {
        let analysis = analysis(
            "SELECT DATE_TRUNC(created, MONTH) AS m, DATEADD(day, 1, created) AS d, \
             day FROM lead",
        );
        assert_eq!(analysis.field_tokens, vec!["created", "day"]);

        let analysis = self::analysis("SELECT MONTH(created) FROM lead WHERE `day` = 1");
        assert_eq!(analysis.field_tokens, vec!["created", "day"]);
    }

    #[test]
    fn placeholders_are_not_field_tokens() {
        let analysis = analysis("SELECT id FROM lead WHERE created > ? AND id < $2");
        assert_eq!(analysis.field_tokens, vec!["id", "created"]);
    }

    #[test]
    fn joins_are_rejected() {
        let err = analyze("SELECT a.id FROM lead a JOIN session b ON a.id = b.lead_id").unwrap_err();
        assert!(matches!(err, ConversionError::MultipleTables(2)));

        let err = analyze("SELECT id FROM lead, session").unwrap_err();
        assert!(matches!(err, ConversionError::MultipleTables(2)));
    }

    #[test]
    fn derived_tables_are_rejected() {
        let err = analyze("SELECT id FROM (SELECT id FROM lead) AS t").unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedTableSource(_)));
    }

    #[test]
    fn statement_shape_is_checked() {
        assert!(matches!(
            analyze("DELETE FROM lead").unwrap_err(),
            ConversionError::NotASelect
        ));
        assert!(matches!(
            analyze("SELECT 1; SELECT 2").unwrap_err(),
            ConversionError::StatementCount(2)
        ));
        assert!(matches!(
            analyze("SELECT 1").unwrap_err(),
            ConversionError::MissingTable
        ));
        assert!(matches!(
            analyze("SELECT id FROM lead WHERE").unwrap_err(),
            ConversionError::Parse(_)
        ));
    }
}
