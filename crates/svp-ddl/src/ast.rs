//! Formula AST input and the mirrored DDL output node.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RefType
// ---------------------------------------------------------------------------

/// How a cell reference was written in the source formula. Carried through
/// for round-tripping; the emitters treat all variants alike.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Relative,
    Absolute,
    Mixed,
    /// Not applicable or unknown; serialized as the empty string.
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

// ---------------------------------------------------------------------------
// Ast
// ---------------------------------------------------------------------------

/// A spreadsheet formula node as delivered by the external parser.
///
/// Closed sum type; the `type` tag on the wire uses the parser's kebab-case
/// kind names. Leaves carry values, interior nodes own their children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Ast {
    Number {
        value: f64,
    },
    Text {
        value: String,
    },
    Logical {
        value: bool,
    },
    Cell {
        /// Cell coordinate, e.g. `A1` or `$B$2`.
        key: String,
        #[serde(default, rename = "refType")]
        ref_type: RefType,
    },
    CellRange {
        start: Box<Ast>,
        end: Box<Ast>,
    },
    ReferenceNode {
        sheet_name: String,
        key: String,
        #[serde(default, rename = "refType")]
        ref_type: RefType,
    },
    Function {
        name: String,
        arguments: Vec<Ast>,
    },
    BinaryExpression {
        operator: String,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    UnaryExpression {
        operator: String,
        operand: Box<Ast>,
    },
}

// ---------------------------------------------------------------------------
// DdlNode
// ---------------------------------------------------------------------------

/// Output of the per-node emitters: the AST shape with resolved column
/// names, the emitted SQL fragment, and a per-node error where resolution
/// failed. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DdlNode {
    Number {
        value: f64,
        sql: String,
    },
    Text {
        value: String,
        sql: String,
    },
    Logical {
        value: bool,
        sql: String,
    },
    Cell {
        cell: String,
        #[serde(rename = "refType")]
        ref_type: RefType,
        /// Mapped column name; empty when unresolved.
        column: String,
        error: Option<String>,
        sql: String,
    },
    CellRange {
        start: String,
        end: String,
        cells: Vec<String>,
        columns: Vec<String>,
        error: Option<String>,
    },
    ReferenceNode {
        sheet_name: String,
        cell: String,
        column: String,
        error: Option<String>,
        sql: String,
    },
    Function {
        name: String,
        arguments: Vec<DdlNode>,
        sql: String,
        error: Option<String>,
    },
    BinaryExpression {
        operator: String,
        left: Box<DdlNode>,
        right: Box<DdlNode>,
        sql: String,
        error: Option<String>,
    },
    UnaryExpression {
        operator: String,
        operand: Box<DdlNode>,
        sql: String,
        error: Option<String>,
    },
}

impl DdlNode {
    /// The emitted SQL fragment. Ranges have no standalone rendering; they
    /// are consumed by the enclosing function template.
    pub fn sql(&self) -> &str {
        match self {
            DdlNode::Number { sql, .. }
            | DdlNode::Text { sql, .. }
            | DdlNode::Logical { sql, .. }
            | DdlNode::Cell { sql, .. }
            | DdlNode::ReferenceNode { sql, .. }
            | DdlNode::Function { sql, .. }
            | DdlNode::BinaryExpression { sql, .. }
            | DdlNode::UnaryExpression { sql, .. } => sql,
            DdlNode::CellRange { .. } => "",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DdlNode::Number { .. } | DdlNode::Text { .. } | DdlNode::Logical { .. } => None,
            DdlNode::Cell { error, .. }
            | DdlNode::CellRange { error, .. }
            | DdlNode::ReferenceNode { error, .. }
            | DdlNode::Function { error, .. }
            | DdlNode::BinaryExpression { error, .. }
            | DdlNode::UnaryExpression { error, .. } => error.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnSpec
// ---------------------------------------------------------------------------

/// Declared SQL type for one output column.
///
/// `extra` carries trailing column constraints verbatim (`NOT NULL`,
/// `PRIMARY KEY`, ...); the builder only inspects it for a primary-key
/// declaration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default)]
    pub extra: String,
}

impl ColumnSpec {
    pub fn new(sql_type: impl Into<String>) -> Self {
        Self {
            sql_type: sql_type.into(),
            extra: String::new(),
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    pub fn declares_primary_key(&self) -> bool {
        self.extra.to_lowercase().contains("primary key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ast_wire_tags_match_the_parser_kind_names() {
        let wire = json!({
            "type": "binary-expression",
            "operator": ">",
            "left": {"type": "cell", "key": "A1", "refType": "relative"},
            "right": {"type": "number", "value": 18.0}
        });
        let ast: Ast = serde_json::from_value(wire).unwrap();
        match ast {
            Ast::BinaryExpression { operator, left, .. } => {
                assert_eq!(operator, ">");
                assert_eq!(
                    *left,
                    Ast::Cell {
                        key: "A1".into(),
                        ref_type: RefType::Relative
                    }
                );
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn ref_type_defaults_to_unspecified() {
        let ast: Ast = serde_json::from_value(json!({"type": "cell", "key": "B2"})).unwrap();
        assert_eq!(
            ast,
            Ast::Cell {
                key: "B2".into(),
                ref_type: RefType::Unspecified
            }
        );
    }

    #[test]
    fn primary_key_detection_is_case_insensitive() {
        assert!(ColumnSpec::new("INTEGER")
            .with_extra("Primary Key")
            .declares_primary_key());
        assert!(!ColumnSpec::new("INTEGER")
            .with_extra("NOT NULL")
            .declares_primary_key());
    }
}
