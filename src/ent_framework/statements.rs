// Statement construction for entity tables and edges
// Every statement is parameterised; identifiers come only from table definitions.

use serde_json::Value;

use crate::ent_framework::edge::EdgeDefinition;
use crate::ent_framework::table::TableDefinition;
use crate::error::AppResult;
use crate::infrastructure::database::{Row, RowKey, SqlParam, Statement};

/// Alias the relation join uses for the owning entity id.
pub const OWNER_ALIAS: &str = "__ent_owner_id";

/// Double-quote an SQL identifier.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// A key set bound as one JSON array parameter, expanded with `json_each`.
/// Keeps a statement at a fixed parameter count however many keys it carries.
fn key_array(keys: &[RowKey]) -> SqlParam {
    let values: Vec<Value> = keys.iter().map(RowKey::to_value).collect();
    SqlParam::Text(Value::Array(values).to_string())
}

fn column_list(table: &TableDefinition) -> String {
    table
        .column_names()
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

/// All rows in insertion order.
pub fn select_all(table: &TableDefinition) -> Statement {
    Statement::new(
        "select_all",
        format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list(table),
            quote(table.name())
        ),
    )
}

/// Single row by an arbitrary key column (primary or natural key).
pub fn select_by_key(table: &TableDefinition, column: &str, value: SqlParam) -> Statement {
    Statement::new(
        "select_by_key",
        format!(
            "SELECT {} FROM {} WHERE {} = ? LIMIT 1",
            column_list(table),
            quote(table.name()),
            quote(column)
        ),
    )
    .bind(value)
}

/// Rows whose `column` equals any of `values`, in insertion order.
pub fn select_where_in(table: &TableDefinition, column: &str, values: Vec<SqlParam>) -> Statement {
    Statement::new(
        "select_where",
        format!(
            "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY rowid",
            column_list(table),
            quote(table.name()),
            quote(column),
            placeholders(values.len())
        ),
    )
    .bind_all(values)
}

/// INSERT ... RETURNING for a prepared row.
pub fn insert_returning(table: &TableDefinition, row: &Row) -> AppResult<Statement> {
    let returning = column_list(table);
    if row.is_empty() {
        return Ok(Statement::new(
            "insert",
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                quote(table.name()),
                returning
            ),
        ));
    }

    let mut columns = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (column, value) in row {
        columns.push(quote(column));
        params.push(table.param_for(column, value)?);
    }

    Ok(Statement::new(
        "insert",
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote(table.name()),
            columns.join(", "),
            placeholders(params.len()),
            returning
        ),
    )
    .bind_all(params))
}

/// UPDATE ... RETURNING by primary key. An empty change set re-reads the row.
pub fn update_returning(table: &TableDefinition, key: &RowKey, changes: &Row) -> AppResult<Statement> {
    let key_column = &table.primary_key().column;
    if changes.is_empty() {
        return Ok(select_by_key(table, key_column, key.to_param()));
    }

    let mut assignments = Vec::with_capacity(changes.len());
    let mut params = Vec::with_capacity(changes.len() + 1);
    for (column, value) in changes {
        assignments.push(format!("{} = ?", quote(column)));
        params.push(table.param_for(column, value)?);
    }
    params.push(key.to_param());

    Ok(Statement::new(
        "update",
        format!(
            "UPDATE {} SET {} WHERE {} = ? RETURNING {}",
            quote(table.name()),
            assignments.join(", "),
            quote(key_column),
            column_list(table)
        ),
    )
    .bind_all(params))
}

/// DELETE ... RETURNING by primary key.
pub fn delete_returning(table: &TableDefinition, key: &RowKey) -> Statement {
    Statement::new(
        "delete",
        format!(
            "DELETE FROM {} WHERE {} = ? RETURNING {}",
            quote(table.name()),
            quote(&table.primary_key().column),
            column_list(table)
        ),
    )
    .bind(key.to_param())
}

/// Remove every edge leaving `source`.
pub fn delete_edges(edge: &EdgeDefinition, source: &RowKey) -> Statement {
    Statement::new(
        "delete_edges",
        format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(edge.join_table()),
            quote(edge.source_column_name())
        ),
    )
    .bind(source.to_param())
}

/// One insert for the whole target set, expanded from a JSON array so the
/// statement has two parameters for any number of targets. Ordered edges
/// record the target's index as its position.
pub fn insert_edges(edge: &EdgeDefinition, source: &RowKey, targets: &[RowKey]) -> Statement {
    let mut columns = vec![quote(edge.source_column_name()), quote(edge.target_column_name())];
    let mut selected = vec!["?", "value"];
    if let Some(position) = edge.position_column() {
        columns.push(quote(position));
        selected.push("key");
    }

    Statement::new(
        "insert_edges",
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM json_each(?) ORDER BY key",
            quote(edge.join_table()),
            columns.join(", "),
            selected.join(", ")
        ),
    )
    .bind(source.to_param())
    .bind(key_array(targets))
}

/// The batch loader's single join: every target row reachable from any of
/// `sources`, tagged with its owner under `OWNER_ALIAS`.
pub fn relation_join(edge: &EdgeDefinition, target: &TableDefinition, sources: &[RowKey]) -> Statement {
    let target_columns = target
        .column_names()
        .map(|c| format!("t.{}", quote(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let order = match edge.position_column() {
        Some(position) => format!("e.{}, e.rowid", quote(position)),
        None => "e.rowid".to_string(),
    };

    Statement::new(
        "relation_join",
        format!(
            "SELECT e.{source} AS {owner}, {columns} FROM {edges} e \
             JOIN {target} t ON t.{target_key} = e.{target_column} \
             WHERE e.{source} IN (SELECT value FROM json_each(?)) ORDER BY {order}",
            source = quote(edge.source_column_name()),
            owner = quote(OWNER_ALIAS),
            columns = target_columns,
            edges = quote(edge.join_table()),
            target = quote(target.name()),
            target_key = quote(&target.primary_key().column),
            target_column = quote(edge.target_column_name()),
            order = order
        ),
    )
    .bind(key_array(sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_framework::table::{ColumnDefinition, IdStrategy};
    use serde_json::json;

    fn tag_table() -> TableDefinition {
        TableDefinition::new("tag", ColumnDefinition::text("id"), IdStrategy::uuid())
            .column(ColumnDefinition::text("name").not_null())
    }

    fn post_table() -> TableDefinition {
        TableDefinition::new("post", ColumnDefinition::integer("id"), IdStrategy::StoreAssigned)
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("name"), "\"name\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_relation_join_shape() {
        let edge = EdgeDefinition::new("tags", "post_tag", &post_table(), &tag_table());
        let statement = relation_join(&edge, &tag_table(), &[RowKey::Integer(1), RowKey::Integer(2)]);
        assert_eq!(statement.label, "relation_join");
        assert_eq!(
            statement.sql,
            "SELECT e.\"post_id\" AS \"__ent_owner_id\", t.\"id\", t.\"name\" FROM \"post_tag\" e \
             JOIN \"tag\" t ON t.\"id\" = e.\"tag_id\" \
             WHERE e.\"post_id\" IN (SELECT value FROM json_each(?)) ORDER BY e.rowid"
        );
        assert_eq!(statement.params, vec![SqlParam::Text("[1,2]".into())]);
    }

    #[test]
    fn test_insert_edges_binds_positions() {
        let edge = EdgeDefinition::new("tags", "post_tag", &post_table(), &tag_table()).ordered();
        let statement = insert_edges(
            &edge,
            &RowKey::Integer(7),
            &[RowKey::from("a"), RowKey::from("b")],
        );
        assert_eq!(
            statement.sql,
            "INSERT INTO \"post_tag\" (\"post_id\", \"tag_id\", \"position\") \
             SELECT ?, value, key FROM json_each(?) ORDER BY key"
        );
        assert_eq!(
            statement.params,
            vec![SqlParam::Integer(7), SqlParam::Text("[\"a\",\"b\"]".into())]
        );
    }

    #[test]
    fn test_update_without_changes_rereads() {
        let statement = update_returning(&tag_table(), &RowKey::from("x"), &Row::new()).unwrap();
        assert_eq!(statement.label, "select_by_key");

        let changes = json!({ "name": "rust" }).as_object().cloned().unwrap();
        let statement = update_returning(&tag_table(), &RowKey::from("x"), &changes).unwrap();
        assert_eq!(statement.label, "update");
        assert_eq!(
            statement.params,
            vec![SqlParam::Text("rust".into()), SqlParam::Text("x".into())]
        );
    }
}
