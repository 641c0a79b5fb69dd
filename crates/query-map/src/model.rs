//! Canonical query model produced by the normalizer.
//!
//! Every node is built bottom-up from the parse tree of the rewritten query
//! and is immutable afterwards. The JSON form (`"type"` tagged, snake_case) is
//! what the daemon returns as `query_data`.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryNode {
    Column {
        field: String,
    },
    Literal {
        value: Literal,
    },
    /// Placeholder such as `@start` or `$1`.
    Variable {
        name: String,
    },
    Star,
    Comparison {
        op: ComparisonOp,
        field: Box<QueryNode>,
        value: Box<QueryNode>,
    },
    And {
        items: Vec<QueryNode>,
    },
    Or {
        items: Vec<QueryNode>,
    },
    Not {
        inner: Box<QueryNode>,
    },
    Between {
        field: String,
        low: Box<QueryNode>,
        high: Box<QueryNode>,
    },
    In {
        field: String,
        values: Vec<QueryNode>,
    },
    Like {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    IsNull {
        field: String,
        is_null: bool,
    },
    Negate {
        value: Box<QueryNode>,
    },
    Add {
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
    Subtract {
        left: Box<QueryNode>,
        right: Box<QueryNode>,
        /// Set when the subtraction came from a date function (`DATE_SUB`).
        #[serde(skip_serializing_if = "Option::is_none")]
        function: Option<String>,
    },
    /// Interval literal kept in its SQL spelling, e.g. `INTERVAL 7 DAY`.
    Interval {
        text: String,
    },
    AliasColumn {
        alias: String,
        field: String,
    },
    AliasAggregation {
        alias: String,
        aggregation_type: Option<AggregationKind>,
        aggregation: Box<QueryNode>,
    },
    Aggregation(Aggregation),
    Method(MethodCall),
    DateAdd {
        params: Vec<QueryNode>,
    },
    Case {
        #[serde(skip_serializing_if = "Option::is_none")]
        operand: Option<Box<QueryNode>>,
        branches: Vec<CaseBranch>,
        default: Option<Box<QueryNode>>,
    },
    If {
        condition: Box<QueryNode>,
        then_value: Box<QueryNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        else_value: Option<Box<QueryNode>>,
    },
    Subquery {
        inner: Box<QueryNode>,
    },
    Union {
        all: bool,
        left: Box<QueryNode>,
        rights: Vec<QueryNode>,
    },
    Select(Box<Select>),
    /// A construct that was recognised but could not be normalized. The
    /// matching [`crate::Omission`] carries the reason.
    Unsupported {
        node: String,
    },
}

impl QueryNode {
    pub fn column(field: impl Into<String>) -> Self {
        QueryNode::Column {
            field: field.into(),
        }
    }

    pub fn unsupported(node: impl Into<String>) -> Self {
        QueryNode::Unsupported { node: node.into() }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, QueryNode::Unsupported { .. })
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            QueryNode::Column { field } => Some(field),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&Select> {
        match self {
            QueryNode::Select(select) => Some(&**select),
            _ => None,
        }
    }

    /// Tag used when this node is aliased or hoisted into a select's
    /// aggregation list. `None` for nodes that are not aggregations.
    pub fn aggregation_kind(&self) -> Option<AggregationKind> {
        match self {
            QueryNode::Aggregation(aggregation) => Some(aggregation.kind),
            QueryNode::Method(_) | QueryNode::DateAdd { .. } => Some(AggregationKind::Method),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    /// Numbers keep their source spelling.
    Number(String),
    String(String),
    Boolean(bool),
    Null,
    /// Unit keyword of a date function, upper-cased: `MONTH` in
    /// `DATE_TRUNC(created, MONTH)`.
    DatePart(String),
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Literal::String(value.into())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(raw) => f.write_str(raw),
            Literal::String(value) => write!(f, "'{value}'"),
            Literal::Boolean(value) => write!(f, "{value}"),
            Literal::Null => f.write_str("NULL"),
            Literal::DatePart(part) => f.write_str(part),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Month,
    Week,
    Year,
    Weekday,
    Date,
    DateTrunc,
    Parenthesis,
    Multiply,
    Division,
    Method,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Count => "COUNT",
            AggregationKind::Sum => "SUM",
            AggregationKind::Avg => "AVG",
            AggregationKind::Month => "MONTH",
            AggregationKind::Week => "WEEK",
            AggregationKind::Year => "YEAR",
            AggregationKind::Weekday => "WEEKDAY",
            AggregationKind::Date => "DATE",
            AggregationKind::DateTrunc => "DATE_TRUNC",
            AggregationKind::Parenthesis => "PARENTHESIS",
            AggregationKind::Multiply => "MULTIPLY",
            AggregationKind::Division => "DIVISION",
            AggregationKind::Method => "METHOD",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate, date or grouping function.
///
/// `arguments` holds the operands in source order: the field for the unary
/// kinds, `[field, unit]` for `DATE_TRUNC`, `[left, right]` for `MULTIPLY` and
/// `DIVISION`, and the wrapped expression for `PARENTHESIS`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub arguments: Vec<QueryNode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub distinct: bool,
}

impl Aggregation {
    pub fn new(kind: AggregationKind, arguments: Vec<QueryNode>) -> Self {
        Self {
            kind,
            arguments,
            distinct: false,
        }
    }

    /// First operand, the aggregated field for the unary kinds.
    pub fn field(&self) -> Option<&QueryNode> {
        self.arguments.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodCall {
    pub name: String,
    pub params: Vec<QueryNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseBranch {
    pub condition: QueryNode,
    pub result: QueryNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedField {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OrderBy {
    pub fields: Vec<OrderedField>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GroupBy {
    pub fields: Vec<QueryNode>,
}

/// Entry of a select's hoisted aggregation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationEntry {
    pub alias: Option<String>,
    pub kind: AggregationKind,
    pub expression: QueryNode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Select {
    pub table: Option<String>,
    pub distinct: bool,
    pub columns: Vec<String>,
    /// `alias_column` and `alias_aggregation` nodes in projection order.
    pub aliases: Vec<QueryNode>,
    pub aggregations: Vec<AggregationEntry>,
    pub conditions: Option<QueryNode>,
    pub group_by: Option<GroupBy>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn alias(&self, name: &str) -> Option<&QueryNode> {
        self.aliases.iter().find(|node| match node {
            QueryNode::AliasColumn { alias, .. } | QueryNode::AliasAggregation { alias, .. } => {
                alias == name
            }
            _ => false,
        })
    }
}

/// Something the conversion dropped or could not express. A conversion with
/// omissions still succeeds; callers decide whether that is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Omission {
    /// A field token with no registry mapping; left as written in the text
    /// and left out of `columns`.
    UnmappedField { token: String },
    /// A field token that resolved but never matched as a whole token in the
    /// text, e.g. split by whitespace around `.`; its id is not in `columns`.
    UnrewrittenField { token: String, mapped: String },
    /// A construct the normalizer could not express.
    UnsupportedNode { node: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comparison_serializes_with_type_tag() {
        let node = QueryNode::Comparison {
            op: ComparisonOp::Eq,
            field: Box::new(QueryNode::column("f2")),
            value: Box::new(QueryNode::Literal {
                value: Literal::string("open"),
            }),
        };
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "type": "comparison",
                "op": "eq",
                "field": { "type": "column", "field": "f2" },
                "value": { "type": "literal", "value": { "kind": "string", "value": "open" } }
            })
        );
    }

    #[test]
    fn aggregation_node_flattens_into_tagged_object() {
        let node = QueryNode::AliasAggregation {
            alias: "ct".into(),
            aggregation_type: Some(AggregationKind::Count),
            aggregation: Box::new(QueryNode::Aggregation(Aggregation::new(
                AggregationKind::Count,
                vec![QueryNode::Star],
            ))),
        };
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "type": "alias_aggregation",
                "alias": "ct",
                "aggregation_type": "COUNT",
                "aggregation": {
                    "type": "aggregation",
                    "kind": "COUNT",
                    "arguments": [{ "type": "star" }]
                }
            })
        );
    }

    #[test]
    fn aggregation_kind_of_nodes() {
        let method = QueryNode::Method(MethodCall {
            name: "CURDATE".into(),
            params: Vec::new(),
        });
        assert_eq!(method.aggregation_kind(), Some(AggregationKind::Method));
        assert_eq!(QueryNode::column("x").aggregation_kind(), None);
        assert_eq!(AggregationKind::DateTrunc.to_string(), "DATE_TRUNC");
    }

    #[test]
    fn select_alias_lookup() {
        let select = Select {
            aliases: vec![QueryNode::AliasColumn {
                alias: "s".into(),
                field: "f2".into(),
            }],
            ..Select::default()
        };
        assert!(select.alias("s").is_some());
        assert!(select.alias("t").is_none());
    }
}
