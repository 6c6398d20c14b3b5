//! Level-ordered DDL emission.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::{Ast, ColumnSpec};
use crate::emit::{emit, ColumnMapping};
use crate::graph::{dependency_graph, has_cyclic_dependencies, priority_levels};

/// One emitted statement and the columns it introduces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub sql: String,
    pub columns: Vec<String>,
}

/// Compilation result: statements grouped by level, ascending. Level 0 is
/// the single `CREATE TABLE`; each higher level holds generated-column
/// `ALTER TABLE` statements. Empty on error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSqlResponse {
    pub content: BTreeMap<u64, Vec<SqlStatement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn has_primary_key(dtypes: &BTreeMap<String, ColumnSpec>) -> bool {
    dtypes.values().any(ColumnSpec::declares_primary_key)
}

/// Compile formula columns into level-ordered DDL for `table_name`.
///
/// `cols` maps output column names to their formula ASTs, `columns` maps
/// sheet letters to output column names (for cell resolution), `dtypes`
/// declares each column's SQL type. Cyclic references abort the whole
/// compilation; unresolved cell references only degrade the affected
/// column to a level-0 declaration.
pub fn build_sql_tables(
    cols: &BTreeMap<String, Ast>,
    columns: &ColumnMapping,
    dtypes: &BTreeMap<String, ColumnSpec>,
    table_name: &str,
) -> BuildSqlResponse {
    let emitted: BTreeMap<String, crate::ast::DdlNode> = cols
        .iter()
        .map(|(name, ast)| (name.clone(), emit(ast, columns)))
        .collect();

    let graph = dependency_graph(&emitted);
    if has_cyclic_dependencies(&graph) {
        return BuildSqlResponse {
            content: BTreeMap::new(),
            error: Some("The AST contains cyclic dependencies.".to_string()),
        };
    }

    let levels = priority_levels(&graph);
    let default_spec = ColumnSpec::default();
    let spec_for = |name: &str| dtypes.get(name).unwrap_or(&default_spec);

    let mut content: BTreeMap<u64, Vec<SqlStatement>> = BTreeMap::new();

    // Level 0: one CREATE TABLE covering every independent column. A
    // surrogate key is added unless the caller declared a primary key.
    let insert_id = !has_primary_key(dtypes);
    let level0: Vec<&String> = cols.keys().filter(|name| levels[*name] == 0).collect();

    let mut declared: Vec<String> = if insert_id {
        vec!["id".to_string()]
    } else {
        Vec::new()
    };
    let mut create = format!("CREATE TABLE IF NOT EXISTS {table_name} (");
    if insert_id {
        create.push_str("id SERIAL PRIMARY KEY, ");
    }
    for (i, name) in level0.iter().enumerate() {
        let spec = spec_for(name);
        let mut column_sql = format!("{} {}", name, spec.sql_type);
        if !spec.extra.is_empty() {
            column_sql.push(' ');
            column_sql.push_str(&spec.extra);
        }
        declared.push((*name).clone());
        create.push_str(&column_sql);
        if i + 1 < level0.len() {
            create.push_str(", ");
        }
    }
    create.push_str(");");
    content.insert(
        0,
        vec![SqlStatement {
            sql: create,
            columns: declared,
        }],
    );

    // Levels ≥ 1: one generated-column ALTER per dependent column, grouped
    // by its level. Gaps between levels are fine; empty levels never appear.
    let mut dependent: Vec<(&String, u64)> = cols
        .keys()
        .filter_map(|name| {
            let level = levels[name];
            (level > 0).then_some((name, level))
        })
        .collect();
    dependent.sort_by_key(|(_, level)| *level);

    for (name, level) in dependent {
        let spec = spec_for(name);
        let mut sql = format!(
            "ALTER TABLE {table_name} ADD COLUMN {} {} GENERATED ALWAYS AS ({}) STORED",
            name,
            spec.sql_type,
            emitted[name].sql()
        );
        if !spec.extra.is_empty() {
            sql.push(' ');
            sql.push_str(&spec.extra);
        }
        sql.push(';');

        content.entry(level).or_default().push(SqlStatement {
            sql,
            columns: vec![name.clone()],
        });
    }

    BuildSqlResponse {
        content,
        error: None,
    }
}
