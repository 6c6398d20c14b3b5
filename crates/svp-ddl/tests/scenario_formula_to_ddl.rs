//! End-to-end compilation from wire-form ASTs to level-ordered DDL.

use std::collections::BTreeMap;

use serde_json::json;
use svp_ddl::{build_sql_tables, Ast, ColumnSpec};

fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn wire_asts_compile_to_generated_columns() {
    // The ASTs arrive as JSON from the formula parser service.
    let cols: BTreeMap<String, Ast> = serde_json::from_value(json!({
        "total": {
            "type": "function",
            "name": "SUM",
            "arguments": [{
                "type": "cell-range",
                "start": {"type": "cell", "key": "A1", "refType": "relative"},
                "end": {"type": "cell", "key": "B1", "refType": "relative"}
            }]
        },
        "price": {"type": "number", "value": 9.5},
        "qty": {"type": "number", "value": 0.0}
    }))
    .unwrap();

    let columns = mapping(&[("A", "price"), ("B", "qty")]);
    let dtypes = BTreeMap::from([
        ("total".to_string(), ColumnSpec::new("NUMERIC")),
        ("price".to_string(), ColumnSpec::new("NUMERIC")),
        ("qty".to_string(), ColumnSpec::new("INTEGER")),
    ]);

    let response = build_sql_tables(&cols, &columns, &dtypes, "orders");
    assert!(response.error.is_none());

    let create = &response.content[&0][0];
    assert_eq!(
        create.sql,
        "CREATE TABLE IF NOT EXISTS orders \
         (id SERIAL PRIMARY KEY, price NUMERIC, qty INTEGER);"
    );

    // `total` references both level-0 columns, so the sum rule puts it at
    // level 2.
    let alter = &response.content[&2][0];
    assert_eq!(
        alter.sql,
        "ALTER TABLE orders ADD COLUMN total NUMERIC \
         GENERATED ALWAYS AS (price + qty) STORED;"
    );
    assert_eq!(alter.columns, vec!["total"]);
}

#[test]
fn self_reference_is_rejected_as_cyclic() {
    let cols: BTreeMap<String, Ast> = serde_json::from_value(json!({
        "a": {"type": "cell", "key": "A1", "refType": "relative"},
        "b": {"type": "cell", "key": "A1", "refType": "relative"}
    }))
    .unwrap();

    // "a" maps to itself: a one-node cycle.
    let columns = mapping(&[("A", "a")]);
    let dtypes = BTreeMap::from([
        ("a".to_string(), ColumnSpec::new("INTEGER")),
        ("b".to_string(), ColumnSpec::new("INTEGER")),
    ]);

    let response = build_sql_tables(&cols, &columns, &dtypes, "t");
    assert!(response.content.is_empty());
    assert!(response
        .error
        .unwrap()
        .contains("cyclic dependencies"));
}
