//! Walks the parse tree of a rewritten query into the canonical [`QueryNode`]
//! model.
//!
//! Expressions are first classified into a closed [`NodeKind`] and then
//! lowered; the lowering match has no wildcard arm, so a new kind cannot be
//! added without deciding how it normalizes. Constructs that cannot be
//! expressed become [`QueryNode::Unsupported`] plus an [`Omission`], and
//! normalization carries on with the rest of the tree.

use std::collections::HashSet;

use sqlparser::ast::{
    BinaryOperator, Expr, Function, FunctionArg, FunctionArgExpr, OrderByExpr, Query,
    Select as SqlSelect, SelectItem, SetExpr, SetOperator, SetQuantifier, Statement, TableFactor,
    UnaryOperator, Value,
};
use tracing::debug;

use crate::analysis::{date_part, join_idents, object_name};
use crate::model::{
    Aggregation, AggregationEntry, AggregationKind, CaseBranch, ComparisonOp, GroupBy, Literal,
    MethodCall, Omission, OrderBy, OrderedField, QueryNode, Select,
};

/// Name of the method that current-date calls normalize to.
pub const CURRENT_DATE_METHOD: &str = "CURDATE";

/// Output of one normalization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub model: QueryNode,
    pub omissions: Vec<Omission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Expression shapes the normalizer knows how to lower.
enum NodeKind<'e> {
    Column(String),
    Variable(String),
    Literal(&'e Value),
    Comparison(ComparisonOp, &'e Expr, &'e Expr),
    And,
    Or,
    Not(&'e Expr),
    Negate(&'e Expr),
    Arithmetic(ArithmeticOp, &'e Expr, &'e Expr),
    Between {
        expr: &'e Expr,
        low: &'e Expr,
        high: &'e Expr,
        negated: bool,
    },
    InList {
        expr: &'e Expr,
        list: &'e [Expr],
        negated: bool,
    },
    InSubquery {
        expr: &'e Expr,
        subquery: &'e Query,
        negated: bool,
    },
    Like {
        expr: &'e Expr,
        pattern: &'e Expr,
        negated: bool,
        case_insensitive: bool,
    },
    IsNull {
        expr: &'e Expr,
        is_null: bool,
    },
    Nested(&'e Expr),
    Function(&'e Function),
    Case {
        operand: Option<&'e Expr>,
        conditions: &'e [Expr],
        results: &'e [Expr],
        else_result: Option<&'e Expr>,
    },
    Subquery(&'e Query),
    Interval,
    Unsupported(&'static str),
}

impl<'e> NodeKind<'e> {
    fn classify(expr: &'e Expr) -> Self {
        match expr {
            Expr::Identifier(ident) if ident.quote_style.is_none() && ident.value.starts_with('@') => {
                NodeKind::Variable(ident.value.clone())
            }
            Expr::Identifier(ident) => NodeKind::Column(ident.value.clone()),
            Expr::CompoundIdentifier(parts) => NodeKind::Column(join_idents(parts)),
            Expr::Value(value) => NodeKind::Literal(value),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::Eq => NodeKind::Comparison(ComparisonOp::Eq, left, right),
                BinaryOperator::NotEq => NodeKind::Comparison(ComparisonOp::Neq, left, right),
                BinaryOperator::Gt => NodeKind::Comparison(ComparisonOp::Gt, left, right),
                BinaryOperator::Lt => NodeKind::Comparison(ComparisonOp::Lt, left, right),
                BinaryOperator::GtEq => NodeKind::Comparison(ComparisonOp::Gte, left, right),
                BinaryOperator::LtEq => NodeKind::Comparison(ComparisonOp::Lte, left, right),
                BinaryOperator::And => NodeKind::And,
                BinaryOperator::Or => NodeKind::Or,
                BinaryOperator::Plus => NodeKind::Arithmetic(ArithmeticOp::Add, left, right),
                BinaryOperator::Minus => NodeKind::Arithmetic(ArithmeticOp::Subtract, left, right),
                BinaryOperator::Multiply => {
                    NodeKind::Arithmetic(ArithmeticOp::Multiply, left, right)
                }
                BinaryOperator::Divide => NodeKind::Arithmetic(ArithmeticOp::Divide, left, right),
                _ => NodeKind::Unsupported("binary operator"),
            },
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => NodeKind::Not(expr),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => NodeKind::Negate(expr),
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => NodeKind::classify(expr),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => NodeKind::Between {
                expr,
                low,
                high,
                negated: *negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => NodeKind::InList {
                expr,
                list,
                negated: *negated,
            },
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => NodeKind::InSubquery {
                expr,
                subquery,
                negated: *negated,
            },
            Expr::Like {
                negated,
                expr,
                pattern,
                ..
            } => NodeKind::Like {
                expr,
                pattern,
                negated: *negated,
                case_insensitive: false,
            },
            Expr::ILike {
                negated,
                expr,
                pattern,
                ..
            } => NodeKind::Like {
                expr,
                pattern,
                negated: *negated,
                case_insensitive: true,
            },
            Expr::IsNull(expr) => NodeKind::IsNull {
                expr,
                is_null: true,
            },
            Expr::IsNotNull(expr) => NodeKind::IsNull {
                expr,
                is_null: false,
            },
            Expr::Nested(inner) => NodeKind::Nested(inner),
            Expr::Function(function) => NodeKind::Function(function),
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => NodeKind::Case {
                operand: operand.as_deref(),
                conditions,
                results,
                else_result: else_result.as_deref(),
            },
            Expr::Subquery(query) => NodeKind::Subquery(query),
            Expr::Interval { .. } => NodeKind::Interval,
            Expr::Exists { .. } => NodeKind::Unsupported("EXISTS"),
            Expr::Cast { .. } => NodeKind::Unsupported("CAST"),
            _ => NodeKind::Unsupported("expression"),
        }
    }
}

/// Functions with a dedicated node, keyed by upper-cased name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Aggregate(AggregationKind),
    DateTrunc,
    DateAdd,
    DateSub,
    CurrentDate,
    If,
    Anonymous,
}

impl FunctionKind {
    fn of(function: &Function) -> Self {
        let name = function
            .name
            .0
            .last()
            .map(|ident| ident.value.to_ascii_uppercase())
            .unwrap_or_default();
        match name.as_str() {
            "COUNT" => FunctionKind::Aggregate(AggregationKind::Count),
            "SUM" => FunctionKind::Aggregate(AggregationKind::Sum),
            "AVG" => FunctionKind::Aggregate(AggregationKind::Avg),
            "MONTH" => FunctionKind::Aggregate(AggregationKind::Month),
            "WEEK" => FunctionKind::Aggregate(AggregationKind::Week),
            "YEAR" => FunctionKind::Aggregate(AggregationKind::Year),
            "WEEKDAY" => FunctionKind::Aggregate(AggregationKind::Weekday),
            "DATE" => FunctionKind::Aggregate(AggregationKind::Date),
            "DATE_TRUNC" => FunctionKind::DateTrunc,
            "DATEADD" | "DATE_ADD" => FunctionKind::DateAdd,
            "DATE_SUB" => FunctionKind::DateSub,
            "CURRENT_DATE" | "GETDATE" | "CURDATE" if function.args.is_empty() => {
                FunctionKind::CurrentDate
            }
            "IF" => FunctionKind::If,
            _ => FunctionKind::Anonymous,
        }
    }
}

/// Lowers one statement. `known_columns`, when set, restricts each select's
/// `columns` to those names; the converter passes the mapped field ids so
/// unmapped tokens never surface as columns.
#[derive(Debug, Default)]
pub struct Normalizer<'k> {
    known_columns: Option<&'k HashSet<String>>,
    omissions: Vec<Omission>,
}

impl<'k> Normalizer<'k> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_columns(known_columns: &'k HashSet<String>) -> Self {
        Self {
            known_columns: Some(known_columns),
            omissions: Vec::new(),
        }
    }

    pub fn normalize(mut self, statement: &Statement) -> Normalized {
        let model = match statement {
            Statement::Query(query) => self.query(query),
            other => self.unsupported("statement", other.to_string()),
        };
        Normalized {
            model,
            omissions: self.omissions,
        }
    }

    fn unsupported(&mut self, node: &str, reason: impl Into<String>) -> QueryNode {
        let reason = reason.into();
        debug!(node, reason = %reason, "unsupported node");
        self.omissions.push(Omission::UnsupportedNode {
            node: node.to_string(),
            reason,
        });
        QueryNode::unsupported(node)
    }

    fn keep_column(&self, field: &str) -> bool {
        self.known_columns
            .map_or(true, |known| known.contains(field))
    }

    fn query(&mut self, query: &Query) -> QueryNode {
        if let Some(with) = &query.with {
            self.unsupported("with", with.to_string());
        }
        if let Some(offset) = &query.offset {
            self.unsupported("offset", offset.to_string());
        }
        if let Some(fetch) = &query.fetch {
            self.unsupported("fetch", fetch.to_string());
        }

        match query.body.as_ref() {
            SetExpr::Select(select) => {
                let select = self.select(select, &query.order_by, query.limit.as_ref());
                QueryNode::Select(Box::new(select))
            }
            body => {
                if !query.order_by.is_empty() || query.limit.is_some() {
                    self.unsupported(
                        "order_by",
                        "ORDER BY and LIMIT are only kept on a plain SELECT",
                    );
                }
                self.set_expr(body)
            }
        }
    }

    fn set_expr(&mut self, body: &SetExpr) -> QueryNode {
        match body {
            SetExpr::Select(select) => QueryNode::Select(Box::new(self.select(select, &[], None))),
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => self.union(set_quantifier, left, right),
            SetExpr::SetOperation { op, .. } => self.unsupported("set_operation", op.to_string()),
            other => self.unsupported("query_body", other.to_string()),
        }
    }

    /// Flattens a left-deep chain of unions with the same quantifier.
    fn union(&mut self, quantifier: &SetQuantifier, left: &SetExpr, right: &SetExpr) -> QueryNode {
        let all = matches!(quantifier, SetQuantifier::All);
        let mut rights = vec![self.set_expr(right)];
        let mut current = left;
        while let SetExpr::SetOperation {
            op: SetOperator::Union,
            set_quantifier,
            left,
            right,
        } = current
        {
            if matches!(set_quantifier, SetQuantifier::All) != all {
                break;
            }
            rights.push(self.set_expr(right));
            current = left;
        }
        rights.reverse();

        QueryNode::Union {
            all,
            left: Box::new(self.set_expr(current)),
            rights,
        }
    }

    fn select(
        &mut self,
        select: &SqlSelect,
        order_by: &[OrderByExpr],
        limit: Option<&Expr>,
    ) -> Select {
        let mut out = Select {
            table: self.table(select),
            distinct: select.distinct.is_some(),
            ..Select::default()
        };

        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    let node = self.expr(expr);
                    self.project(node, &mut out);
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let node = self.expr(expr);
                    self.project_alias(alias.value.clone(), node, &mut out);
                }
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                    push_unique(&mut out.columns, "*");
                }
            }
        }

        out.conditions = select.selection.as_ref().map(|expr| self.expr(expr));

        if !select.group_by.is_empty() {
            let fields = select
                .group_by
                .iter()
                .map(|expr| self.expr(expr))
                .filter(|node| !node.is_unsupported())
                .collect();
            out.group_by = Some(GroupBy { fields });
        }

        if let Some(having) = &select.having {
            self.unsupported("having", having.to_string());
        }

        if !order_by.is_empty() {
            out.order_by = Some(self.order_by(order_by));
        }

        out.limit = limit.and_then(|expr| self.limit(expr));
        out
    }

    fn table(&mut self, select: &SqlSelect) -> Option<String> {
        match select.from.as_slice() {
            [] => None,
            [only] if only.joins.is_empty() => match &only.relation {
                TableFactor::Table { name, .. } => Some(object_name(name)),
                other => {
                    self.unsupported("table", other.to_string());
                    None
                }
            },
            _ => {
                self.unsupported("table", "joins and multi-table FROM clauses");
                None
            }
        }
    }

    fn project(&mut self, node: QueryNode, out: &mut Select) {
        if let QueryNode::Column { field } = &node {
            if self.keep_column(field) {
                push_unique(&mut out.columns, field);
            }
            return;
        }
        if node.is_unsupported() {
            return;
        }
        match node.aggregation_kind() {
            Some(kind) => out.aggregations.push(AggregationEntry {
                alias: None,
                kind,
                expression: node,
            }),
            None => {
                self.unsupported("select_item", "unaliased expression in projection");
            }
        }
    }

    fn project_alias(&mut self, alias: String, node: QueryNode, out: &mut Select) {
        match node {
            QueryNode::Column { field } => {
                // Bindings to unmapped fields are dropped with the field.
                if self.keep_column(&field) {
                    push_unique(&mut out.columns, &field);
                    out.aliases.push(QueryNode::AliasColumn { alias, field });
                }
            }
            QueryNode::Unsupported { .. } => {}
            node => {
                let kind = node.aggregation_kind();
                if let Some(kind) = kind {
                    out.aggregations.push(AggregationEntry {
                        alias: Some(alias.clone()),
                        kind,
                        expression: node.clone(),
                    });
                }
                out.aliases.push(QueryNode::AliasAggregation {
                    alias,
                    aggregation_type: kind,
                    aggregation: Box::new(node),
                });
            }
        }
    }

    fn order_by(&mut self, items: &[OrderByExpr]) -> OrderBy {
        let mut fields = Vec::with_capacity(items.len());
        for item in items {
            match self.expr(&item.expr) {
                QueryNode::Column { field } => fields.push(OrderedField {
                    field,
                    descending: item.asc == Some(false),
                }),
                QueryNode::Unsupported { .. } => {}
                _ => {
                    self.unsupported("order_by", item.to_string());
                }
            }
        }
        OrderBy { fields }
    }

    fn limit(&mut self, expr: &Expr) -> Option<u64> {
        if let Expr::Value(Value::Number(raw, _)) = expr {
            if let Ok(limit) = raw.parse() {
                return Some(limit);
            }
        }
        self.unsupported("limit", expr.to_string());
        None
    }

    fn expr(&mut self, expr: &Expr) -> QueryNode {
        match NodeKind::classify(expr) {
            NodeKind::Column(field) => QueryNode::Column { field },
            NodeKind::Variable(name) => QueryNode::Variable { name },
            NodeKind::Literal(value) => literal(value),
            NodeKind::Comparison(op, left, right) => {
                let field = self.expr(left);
                if field.is_unsupported() {
                    return field;
                }
                QueryNode::Comparison {
                    op,
                    field: Box::new(field),
                    value: Box::new(self.expr(right)),
                }
            }
            NodeKind::And => QueryNode::And {
                items: self.connective(expr, &BinaryOperator::And),
            },
            NodeKind::Or => QueryNode::Or {
                items: self.connective(expr, &BinaryOperator::Or),
            },
            NodeKind::Not(inner) => self.not(inner),
            NodeKind::Negate(inner) => QueryNode::Negate {
                value: Box::new(self.expr(inner)),
            },
            NodeKind::Arithmetic(op, left, right) => {
                let left = self.expr(left);
                let right = self.expr(right);
                match op {
                    ArithmeticOp::Add => QueryNode::Add {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    ArithmeticOp::Subtract => QueryNode::Subtract {
                        left: Box::new(left),
                        right: Box::new(right),
                        function: None,
                    },
                    ArithmeticOp::Multiply => QueryNode::Aggregation(Aggregation::new(
                        AggregationKind::Multiply,
                        vec![left, right],
                    )),
                    ArithmeticOp::Divide => QueryNode::Aggregation(Aggregation::new(
                        AggregationKind::Division,
                        vec![left, right],
                    )),
                }
            }
            NodeKind::Between {
                expr: target,
                low,
                high,
                negated,
            } => {
                let Some(field) = self.field_operand("between", target) else {
                    return QueryNode::unsupported("between");
                };
                let node = QueryNode::Between {
                    field,
                    low: Box::new(self.expr(low)),
                    high: Box::new(self.expr(high)),
                };
                negate_if(node, negated)
            }
            NodeKind::InList {
                expr: target,
                list,
                negated,
            } => {
                let Some(field) = self.field_operand("in", target) else {
                    return QueryNode::unsupported("in");
                };
                let values = list.iter().map(|item| self.expr(item)).collect();
                negate_if(QueryNode::In { field, values }, negated)
            }
            NodeKind::InSubquery {
                expr: target,
                subquery,
                negated,
            } => {
                let Some(field) = self.field_operand("in", target) else {
                    return QueryNode::unsupported("in");
                };
                let inner = self.query(subquery);
                let values = vec![QueryNode::Subquery {
                    inner: Box::new(inner),
                }];
                negate_if(QueryNode::In { field, values }, negated)
            }
            NodeKind::Like {
                expr: target,
                pattern,
                negated,
                case_insensitive,
            } => {
                let Some(field) = self.field_operand("like", target) else {
                    return QueryNode::unsupported("like");
                };
                let pattern = match pattern {
                    Expr::Value(Value::SingleQuotedString(text))
                    | Expr::Value(Value::DoubleQuotedString(text)) => text.clone(),
                    other => {
                        return self.unsupported("like", format!("pattern {other} is not a string"))
                    }
                };
                let node = QueryNode::Like {
                    field,
                    pattern,
                    case_insensitive,
                };
                negate_if(node, negated)
            }
            NodeKind::IsNull {
                expr: target,
                is_null,
            } => match self.field_operand("is_null", target) {
                Some(field) => QueryNode::IsNull { field, is_null },
                None => QueryNode::unsupported("is_null"),
            },
            NodeKind::Nested(inner) => {
                let inner = self.expr(inner);
                if inner.is_unsupported() {
                    return inner;
                }
                QueryNode::Aggregation(Aggregation::new(AggregationKind::Parenthesis, vec![inner]))
            }
            NodeKind::Function(function) => self.function(function),
            NodeKind::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let operand = operand.map(|operand| Box::new(self.expr(operand)));
                let branches = conditions
                    .iter()
                    .zip(results)
                    .map(|(condition, result)| CaseBranch {
                        condition: self.expr(condition),
                        result: self.expr(result),
                    })
                    .collect();
                let default = else_result.map(|result| Box::new(self.expr(result)));
                QueryNode::Case {
                    operand,
                    branches,
                    default,
                }
            }
            NodeKind::Subquery(query) => QueryNode::Subquery {
                inner: Box::new(self.query(query)),
            },
            NodeKind::Interval => QueryNode::Interval {
                text: expr.to_string(),
            },
            NodeKind::Unsupported(node) => self.unsupported(node, expr.to_string()),
        }
    }

    /// Left operand of BETWEEN, IN, LIKE and IS NULL, which must be a column.
    fn field_operand(&mut self, node: &str, expr: &Expr) -> Option<String> {
        match self.expr(expr) {
            QueryNode::Column { field } => Some(field),
            QueryNode::Unsupported { .. } => None,
            _ => {
                self.unsupported(node, format!("left operand {expr} is not a column"));
                None
            }
        }
    }

    fn not(&mut self, inner: &Expr) -> QueryNode {
        match self.expr(inner) {
            QueryNode::IsNull { field, is_null } => QueryNode::IsNull {
                field,
                is_null: !is_null,
            },
            QueryNode::Aggregation(Aggregation {
                kind: AggregationKind::Parenthesis,
                mut arguments,
                ..
            }) if matches!(arguments.as_slice(), [QueryNode::IsNull { .. }]) => {
                match arguments.pop() {
                    Some(QueryNode::IsNull { field, is_null }) => QueryNode::IsNull {
                        field,
                        is_null: !is_null,
                    },
                    _ => QueryNode::unsupported("not"),
                }
            }
            node if node.is_unsupported() => node,
            node => QueryNode::Not {
                inner: Box::new(node),
            },
        }
    }

    /// Flattens `a AND b AND c` (or OR) into one item list. Unsupported items
    /// are dropped; their omissions are already recorded.
    fn connective(&mut self, expr: &Expr, connective: &BinaryOperator) -> Vec<QueryNode> {
        let mut operands = Vec::new();
        collect_operands(expr, connective, &mut operands);
        operands
            .into_iter()
            .map(|operand| self.expr(operand))
            .filter(|node| !node.is_unsupported())
            .collect()
    }

    fn function(&mut self, function: &Function) -> QueryNode {
        let distinct = function.distinct;
        let args: Vec<QueryNode> = function
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Named { arg, .. } | FunctionArg::Unnamed(arg) => arg,
            })
            .map(|arg| match arg {
                FunctionArgExpr::Expr(expr) => match date_part(function, expr) {
                    Some(part) => QueryNode::Literal {
                        value: Literal::DatePart(part.to_ascii_uppercase()),
                    },
                    None => self.expr(expr),
                },
                FunctionArgExpr::Wildcard | FunctionArgExpr::QualifiedWildcard(_) => {
                    QueryNode::Star
                }
            })
            .collect();

        match FunctionKind::of(function) {
            FunctionKind::Aggregate(kind) => {
                let Some(field) = args.into_iter().next() else {
                    return self.unsupported("aggregation", format!("{function} has no argument"));
                };
                if field.is_unsupported() {
                    return field;
                }
                QueryNode::Aggregation(Aggregation {
                    kind,
                    arguments: vec![field],
                    distinct,
                })
            }
            FunctionKind::DateTrunc => {
                QueryNode::Aggregation(Aggregation::new(AggregationKind::DateTrunc, args))
            }
            FunctionKind::DateAdd => QueryNode::DateAdd { params: args },
            FunctionKind::DateSub => {
                let mut args = args.into_iter();
                match (args.next(), args.next()) {
                    (Some(left), Some(right)) => QueryNode::Subtract {
                        left: Box::new(left),
                        right: Box::new(right),
                        function: Some("DATE_SUB".to_string()),
                    },
                    _ => self.unsupported("date_sub", function.to_string()),
                }
            }
            FunctionKind::CurrentDate => QueryNode::Method(MethodCall {
                name: CURRENT_DATE_METHOD.to_string(),
                params: Vec::new(),
            }),
            FunctionKind::If => {
                let mut args = args.into_iter();
                match (args.next(), args.next(), args.next(), args.next()) {
                    (Some(condition), Some(then_value), else_value, None) => QueryNode::If {
                        condition: Box::new(condition),
                        then_value: Box::new(then_value),
                        else_value: else_value.map(Box::new),
                    },
                    _ => self.unsupported("if", function.to_string()),
                }
            }
            FunctionKind::Anonymous => QueryNode::Method(MethodCall {
                name: function.name.to_string(),
                params: args
                    .into_iter()
                    .filter(|param| !param.is_unsupported())
                    .collect(),
            }),
        }
    }
}

fn collect_operands<'e>(expr: &'e Expr, connective: &BinaryOperator, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp { left, op, right } if op == connective => {
            collect_operands(left, connective, out);
            collect_operands(right, connective, out);
        }
        other => out.push(other),
    }
}

fn literal(value: &Value) -> QueryNode {
    let value = match value {
        Value::Number(raw, _) => Literal::Number(raw.clone()),
        Value::SingleQuotedString(text) | Value::DoubleQuotedString(text) => {
            Literal::String(text.clone())
        }
        Value::Boolean(flag) => Literal::Boolean(*flag),
        Value::Null => Literal::Null,
        Value::Placeholder(name) => return QueryNode::Variable { name: name.clone() },
        other => Literal::String(other.to_string()),
    };
    QueryNode::Literal { value }
}

fn negate_if(node: QueryNode, negated: bool) -> QueryNode {
    if negated {
        QueryNode::Not {
            inner: Box::new(node),
        }
    } else {
        node
    }
}

fn push_unique(columns: &mut Vec<String>, field: &str) {
    if !columns.iter().any(|column| column == field) {
        columns.push(field.to_string());
    }
}
