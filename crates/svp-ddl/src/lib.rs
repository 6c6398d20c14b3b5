//! Formula-to-SQL compilation pipeline.
//!
//! Takes spreadsheet formula ASTs (produced by an external parser), resolves
//! cell references against a column mapping, builds the column dependency
//! graph, and emits level-ordered DDL: one `CREATE TABLE` at level 0 and one
//! generated-column `ALTER TABLE` per dependent column at levels ≥ 1.
//!
//! The pipeline is pure and single-threaded; all containers are ordered
//! (`BTreeMap`) so output is deterministic for a given input.

pub mod ast;
pub mod builder;
pub mod emit;
pub mod graph;

pub use ast::{Ast, ColumnSpec, DdlNode, RefType};
pub use builder::{build_sql_tables, BuildSqlResponse, SqlStatement};
pub use emit::emit;
pub use graph::{dependency_graph, has_cyclic_dependencies, priority_levels};
