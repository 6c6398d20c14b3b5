//! Per-node SQL emission.
//!
//! Each AST kind has exactly one emitter; `emit` is the exhaustive dispatch.
//! Resolution failures (a cell key with no mapped column) produce a node
//! with an empty `sql` and a non-empty `error` instead of failing the whole
//! compilation; errors propagate upward through composite nodes.

use std::collections::BTreeMap;

use crate::ast::{Ast, DdlNode, RefType};

/// Cell-letter → column-name mapping for one sheet (`"A"` → `"col1"`).
pub type ColumnMapping = BTreeMap<String, String>;

/// Emit the DDL node for `ast`, resolving cell references via `columns`.
pub fn emit(ast: &Ast, columns: &ColumnMapping) -> DdlNode {
    match ast {
        Ast::Number { value } => emit_number(*value),
        Ast::Text { value } => emit_text(value),
        Ast::Logical { value } => emit_logical(*value),
        Ast::Cell { key, ref_type } => emit_cell(key, *ref_type, columns),
        Ast::CellRange { start, end } => emit_cell_range(start, end, columns),
        Ast::ReferenceNode {
            sheet_name,
            key,
            ref_type,
        } => emit_reference(sheet_name, key, *ref_type, columns),
        Ast::Function { name, arguments } => emit_function(name, arguments, columns),
        Ast::BinaryExpression {
            operator,
            left,
            right,
        } => emit_binary(operator, left, right, columns),
        Ast::UnaryExpression { operator, operand } => emit_unary(operator, operand, columns),
    }
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

/// Integral values render without a fractional part (`18.0` → `18`).
pub(crate) fn number_literal(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn emit_number(value: f64) -> DdlNode {
    DdlNode::Number {
        value,
        sql: number_literal(value),
    }
}

fn emit_text(value: &str) -> DdlNode {
    DdlNode::Text {
        value: value.to_string(),
        sql: format!("'{}'", value.replace('\'', "''")),
    }
}

fn emit_logical(value: bool) -> DdlNode {
    DdlNode::Logical {
        value,
        sql: if value { "TRUE" } else { "FALSE" }.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Cell references
// ---------------------------------------------------------------------------

/// Leading letters of a coordinate, `$` markers stripped (`$B$2` → `B`).
fn column_letters(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '$')
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Trailing row digits of a coordinate (`B12` → 12).
fn row_number(key: &str) -> Option<u32> {
    let digits: String = key.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// `A` → 1, `Z` → 26, `AA` → 27.
fn letters_to_index(letters: &str) -> u32 {
    letters
        .chars()
        .fold(0, |acc, c| acc * 26 + (c as u32 - 'A' as u32 + 1))
}

fn index_to_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn resolve(key: &str, columns: &ColumnMapping) -> Result<String, String> {
    let letters = column_letters(key);
    columns
        .get(&letters)
        .cloned()
        .ok_or_else(|| format!("Cell '{key}' does not map to a known column"))
}

fn emit_cell(key: &str, ref_type: RefType, columns: &ColumnMapping) -> DdlNode {
    match resolve(key, columns) {
        Ok(column) => DdlNode::Cell {
            cell: key.to_string(),
            ref_type,
            sql: column.clone(),
            column,
            error: None,
        },
        Err(error) => DdlNode::Cell {
            cell: key.to_string(),
            ref_type,
            column: String::new(),
            error: Some(error),
            sql: String::new(),
        },
    }
}

fn emit_reference(
    sheet_name: &str,
    key: &str,
    _ref_type: RefType,
    columns: &ColumnMapping,
) -> DdlNode {
    match resolve(key, columns) {
        Ok(column) => DdlNode::ReferenceNode {
            sheet_name: sheet_name.to_string(),
            cell: key.to_string(),
            sql: format!("{sheet_name}.{column}"),
            column,
            error: None,
        },
        Err(error) => DdlNode::ReferenceNode {
            sheet_name: sheet_name.to_string(),
            cell: key.to_string(),
            column: String::new(),
            error: Some(error),
            sql: String::new(),
        },
    }
}

/// Enumerate the coordinates between two corners of a single-row or
/// single-column range, inclusive.
fn range_cells(start: &str, end: &str) -> Result<Vec<String>, String> {
    let (start_col, end_col) = (column_letters(start), column_letters(end));
    let (start_row, end_row) = match (row_number(start), row_number(end)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(format!("Range '{start}:{end}' has a malformed coordinate")),
    };

    if start_row == end_row {
        let (lo, hi) = {
            let a = letters_to_index(&start_col);
            let b = letters_to_index(&end_col);
            (a.min(b), a.max(b))
        };
        return Ok((lo..=hi)
            .map(|i| format!("{}{}", index_to_letters(i), start_row))
            .collect());
    }

    if start_col == end_col {
        let (lo, hi) = (start_row.min(end_row), start_row.max(end_row));
        return Ok((lo..=hi).map(|r| format!("{start_col}{r}")).collect());
    }

    Err(format!(
        "Range '{start}:{end}' must span a single row or a single column"
    ))
}

fn emit_cell_range(start: &Ast, end: &Ast, columns: &ColumnMapping) -> DdlNode {
    let (start_key, end_key) = match (start, end) {
        (Ast::Cell { key: s, .. }, Ast::Cell { key: e, .. }) => (s.clone(), e.clone()),
        _ => {
            return DdlNode::CellRange {
                start: String::new(),
                end: String::new(),
                cells: Vec::new(),
                columns: Vec::new(),
                error: Some("Range endpoints must be cell references".to_string()),
            }
        }
    };

    let cells = match range_cells(&start_key, &end_key) {
        Ok(cells) => cells,
        Err(error) => {
            return DdlNode::CellRange {
                start: start_key,
                end: end_key,
                cells: Vec::new(),
                columns: Vec::new(),
                error: Some(error),
            }
        }
    };

    let mut mapped = Vec::with_capacity(cells.len());
    let mut error = None;
    for cell in &cells {
        match resolve(cell, columns) {
            Ok(column) => {
                if !mapped.contains(&column) {
                    mapped.push(column);
                }
            }
            Err(message) => {
                error.get_or_insert(message);
            }
        }
    }

    DdlNode::CellRange {
        start: start_key,
        end: end_key,
        cells,
        columns: mapped,
        error,
    }
}

// ---------------------------------------------------------------------------
// Composite nodes
// ---------------------------------------------------------------------------

fn first_error(nodes: &[&DdlNode]) -> Option<String> {
    nodes
        .iter()
        .find_map(|node| node.error().map(str::to_string))
}

fn emit_binary(operator: &str, left: &Ast, right: &Ast, columns: &ColumnMapping) -> DdlNode {
    let left = emit(left, columns);
    let right = emit(right, columns);
    let sql = format!("({}) {} ({})", left.sql(), operator, right.sql());
    let error = first_error(&[&left, &right]);

    DdlNode::BinaryExpression {
        operator: operator.to_string(),
        left: Box::new(left),
        right: Box::new(right),
        sql,
        error,
    }
}

fn emit_unary(operator: &str, operand: &Ast, columns: &ColumnMapping) -> DdlNode {
    let operand = emit(operand, columns);
    let sql = format!("{}({})", operator, operand.sql());
    let error = operand.error().map(str::to_string);

    DdlNode::UnaryExpression {
        operator: operator.to_string(),
        operand: Box::new(operand),
        sql,
        error,
    }
}

/// Either the columns a range argument expands to, or the argument's own
/// SQL, for templates that sum or list their inputs.
fn argument_terms(node: &DdlNode) -> Vec<String> {
    match node {
        DdlNode::CellRange { columns, .. } => columns.clone(),
        other => vec![other.sql().to_string()],
    }
}

fn emit_function(name: &str, arguments: &[Ast], columns: &ColumnMapping) -> DdlNode {
    let emitted: Vec<DdlNode> = arguments.iter().map(|arg| emit(arg, columns)).collect();
    let refs: Vec<&DdlNode> = emitted.iter().collect();
    let error = first_error(&refs);

    let sql = match name.to_ascii_uppercase().as_str() {
        "SUM" => emitted
            .iter()
            .flat_map(argument_terms)
            .collect::<Vec<_>>()
            .join(" + "),
        "IF" if emitted.len() == 3 => format!(
            "CASE WHEN {} THEN {} ELSE {} END",
            emitted[0].sql(),
            emitted[1].sql(),
            emitted[2].sql()
        ),
        // Unknown functions pass through verbatim so new spreadsheet
        // functions degrade to a named SQL call instead of an error.
        _ => format!(
            "{}({})",
            name,
            emitted
                .iter()
                .map(|arg| arg.sql().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };

    DdlNode::Function {
        name: name.to_string(),
        arguments: emitted,
        sql,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> ColumnMapping {
        [("A", "col1"), ("B", "col2"), ("C", "col3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn cell(key: &str) -> Ast {
        Ast::Cell {
            key: key.into(),
            ref_type: RefType::Relative,
        }
    }

    #[test]
    fn binary_add_wraps_both_operands() {
        let ast = Ast::BinaryExpression {
            operator: "+".into(),
            left: Box::new(cell("A1")),
            right: Box::new(Ast::Number { value: 5.0 }),
        };
        assert_eq!(emit(&ast, &columns()).sql(), "(col1) + (5)");
    }

    #[test]
    fn sum_over_range_joins_mapped_columns() {
        let ast = Ast::Function {
            name: "SUM".into(),
            arguments: vec![Ast::CellRange {
                start: Box::new(cell("A1")),
                end: Box::new(cell("B1")),
            }],
        };
        assert_eq!(emit(&ast, &columns()).sql(), "col1 + col2");
    }

    #[test]
    fn row_range_expands_in_column_order() {
        let ast = Ast::CellRange {
            start: Box::new(cell("A1")),
            end: Box::new(cell("C1")),
        };
        match emit(&ast, &columns()) {
            DdlNode::CellRange {
                cells,
                columns,
                error,
                ..
            } => {
                assert_eq!(cells, vec!["A1", "B1", "C1"]);
                assert_eq!(columns, vec!["col1", "col2", "col3"]);
                assert!(error.is_none());
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn column_range_expands_rows() {
        let ast = Ast::CellRange {
            start: Box::new(cell("A1")),
            end: Box::new(cell("A3")),
        };
        match emit(&ast, &columns()) {
            DdlNode::CellRange { cells, columns, .. } => {
                assert_eq!(cells, vec!["A1", "A2", "A3"]);
                // One sheet column maps every cell of a vertical range.
                assert_eq!(columns, vec!["col1"]);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn mapped_cell_emits_its_column() {
        let node = emit(&cell("A1"), &columns());
        assert_eq!(node.sql(), "col1");
        assert!(node.error().is_none());
    }

    #[test]
    fn unmapped_cell_yields_empty_sql_and_error() {
        let node = emit(&cell("Z1"), &columns());
        assert_eq!(node.sql(), "");
        assert!(node.error().is_some());
    }

    #[test]
    fn number_literals_drop_integral_fraction() {
        assert_eq!(emit(&Ast::Number { value: 42.5 }, &columns()).sql(), "42.5");
        assert_eq!(emit(&Ast::Number { value: 18.0 }, &columns()).sql(), "18");
    }

    #[test]
    fn logicals_render_uppercase() {
        assert_eq!(emit(&Ast::Logical { value: true }, &columns()).sql(), "TRUE");
        assert_eq!(
            emit(&Ast::Logical { value: false }, &columns()).sql(),
            "FALSE"
        );
    }

    #[test]
    fn text_is_single_quoted_and_escaped() {
        let node = emit(
            &Ast::Text {
                value: "it's".into(),
            },
            &columns(),
        );
        assert_eq!(node.sql(), "'it''s'");
    }

    #[test]
    fn unary_wraps_operand() {
        let ast = Ast::UnaryExpression {
            operator: "-".into(),
            operand: Box::new(Ast::Number { value: 5.0 }),
        };
        assert_eq!(emit(&ast, &columns()).sql(), "-(5)");
    }

    #[test]
    fn sheet_reference_prefixes_sheet_name() {
        let found = Ast::ReferenceNode {
            sheet_name: "Sheet2".into(),
            key: "A1".into(),
            ref_type: RefType::Relative,
        };
        assert_eq!(emit(&found, &columns()).sql(), "Sheet2.col1");

        let missing = Ast::ReferenceNode {
            sheet_name: "Sheet2".into(),
            key: "Z1".into(),
            ref_type: RefType::Relative,
        };
        let node = emit(&missing, &columns());
        assert_eq!(node.sql(), "");
        assert!(node.error().is_some());
    }

    #[test]
    fn if_template_renders_case_expression() {
        let ast = Ast::Function {
            name: "IF".into(),
            arguments: vec![
                Ast::BinaryExpression {
                    operator: ">".into(),
                    left: Box::new(cell("A1")),
                    right: Box::new(Ast::Number { value: 18.0 }),
                },
                Ast::Text {
                    value: "Adult".into(),
                },
                Ast::Text {
                    value: "Minor".into(),
                },
            ],
        };
        assert_eq!(
            emit(&ast, &columns()).sql(),
            "CASE WHEN (col1) > (18) THEN 'Adult' ELSE 'Minor' END"
        );
    }

    #[test]
    fn unknown_function_passes_through_without_error() {
        let ast = Ast::Function {
            name: "COALESCE".into(),
            arguments: vec![cell("A1"), Ast::Number { value: 0.0 }],
        };
        let node = emit(&ast, &columns());
        assert_eq!(node.sql(), "COALESCE(col1, 0)");
        assert!(node.error().is_none());
    }

    #[test]
    fn child_errors_propagate_through_composites() {
        let ast = Ast::BinaryExpression {
            operator: "+".into(),
            left: Box::new(cell("Z1")),
            right: Box::new(Ast::Number { value: 1.0 }),
        };
        assert!(emit(&ast, &columns()).error().is_some());
    }
}
