// Relation Batch Loader and Projector
// Related rows for any number of owners are fetched with a single join and
// grouped in memory. Edge writes replace the whole set for one source.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::ent_framework::edge::EdgeDefinition;
use crate::ent_framework::schema::Schema;
use crate::ent_framework::statements::{self, OWNER_ALIAS};
use crate::ent_framework::table::TableDefinition;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Database, Row, RowKey};

/// Related rows grouped by owner id. Every requested owner has an entry.
#[derive(Debug, Clone, Default)]
pub struct RelationMap {
    entries: HashMap<RowKey, Vec<Row>>,
}

impl RelationMap {
    fn with_owners(owners: &[RowKey]) -> Self {
        Self {
            entries: owners.iter().map(|id| (id.clone(), Vec::new())).collect(),
        }
    }

    /// Rows related to `owner`, empty when it has none.
    pub fn get(&self, owner: &RowKey) -> &[Row] {
        self.entries.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, owner: &RowKey) -> bool {
        self.entries.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn dedupe(ids: impl IntoIterator<Item = RowKey>) -> Vec<RowKey> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Loads rows of a target entity through one edge.
#[derive(Debug, Clone)]
pub struct RelationLoader {
    edge: Arc<EdgeDefinition>,
    target: Arc<TableDefinition>,
    schema: Schema,
}

impl RelationLoader {
    pub fn new(edge: Arc<EdgeDefinition>, target: Arc<TableDefinition>, schema: Schema) -> Self {
        Self { edge, target, schema }
    }

    pub fn edge(&self) -> &EdgeDefinition {
        &self.edge
    }

    /// Fetch related rows for every owner in `ids` with one join statement.
    /// An empty id set issues no statement at all.
    pub async fn load_for(
        &self,
        db: &Database,
        ids: impl IntoIterator<Item = RowKey>,
    ) -> AppResult<RelationMap> {
        let owners = dedupe(ids);
        let mut relations = RelationMap::with_owners(&owners);
        if owners.is_empty() {
            return Ok(relations);
        }

        let rows = db
            .fetch_all(statements::relation_join(&self.edge, &self.target, &owners))
            .await?;
        debug!(
            edge = self.edge.name(),
            owners = owners.len(),
            rows = rows.len(),
            "Loaded relation batch"
        );

        for mut row in rows {
            let owner = row
                .remove(OWNER_ALIAS)
                .and_then(|v| RowKey::from_value(&v))
                .ok_or_else(|| {
                    AppError::Internal(format!("Edge {} returned a row without owner", self.edge.name()))
                })?;
            let related = self.schema.check_output(&Value::Object(row))?;
            relations.entries.entry(owner).or_default().push(related);
        }
        Ok(relations)
    }

    /// Attach the related rows of every base row under `field`.
    pub async fn hydrate(&self, db: &Database, field: &str, rows: Vec<Row>) -> AppResult<Vec<Row>> {
        let owner_key = self.edge.source().key.as_str();
        let ids: Vec<RowKey> = rows
            .iter()
            .filter_map(|row| row.get(owner_key).and_then(RowKey::from_value))
            .collect();
        let relations = self.load_for(db, ids).await?;
        Ok(project(rows, &[(field, &relations)], owner_key))
    }
}

/// Merge base rows with their relation collections, preserving row order.
/// Owners missing from a map get an empty collection.
pub fn project(rows: Vec<Row>, relations: &[(&str, &RelationMap)], owner_key: &str) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            let owner = row.get(owner_key).and_then(RowKey::from_value);
            for (field, map) in relations {
                let related = owner
                    .as_ref()
                    .map(|id| map.get(id).iter().cloned().map(Value::Object).collect())
                    .unwrap_or_default();
                row.insert(field.to_string(), Value::Array(related));
            }
            row
        })
        .collect()
}

/// Insert-or-fetch by a natural key: try the insert, and when a concurrent
/// or earlier writer already holds the key, read that row instead.
pub async fn upsert_by_key(
    db: &Database,
    table: &TableDefinition,
    key_column: &str,
    values: Row,
) -> AppResult<Row> {
    let prepared = table.prepare_insert(values)?;
    let key = prepared
        .get(key_column)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| AppError::validation(key_column, "Required"))?;

    match db
        .fetch_optional(statements::insert_returning(table, &prepared)?)
        .await
    {
        Ok(Some(row)) => Ok(row),
        Ok(None) => Err(AppError::Internal(format!(
            "Insert into {} returned no row",
            table.name()
        ))),
        Err(err) if err.is_unique_violation() => {
            let param = table.param_for(key_column, &key)?;
            match db
                .fetch_optional(statements::select_by_key(table, key_column, param))
                .await?
            {
                Some(existing) => {
                    debug!(table = table.name(), key = %key, "Reusing existing row for natural key");
                    Ok(existing)
                }
                // The collision was on some other unique column.
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Replace every edge leaving `source` with `targets`. Duplicate targets are
/// written once; an empty set only clears.
pub async fn replace_edges(
    db: &Database,
    edge: &EdgeDefinition,
    source: &RowKey,
    targets: impl IntoIterator<Item = RowKey>,
) -> AppResult<()> {
    let removed = db.execute(statements::delete_edges(edge, source)).await?;
    let targets = dedupe(targets);
    debug!(
        edge = edge.name(),
        source = %source,
        removed,
        inserted = targets.len(),
        "Replacing edges"
    );
    if targets.is_empty() {
        return Ok(());
    }
    db.execute(statements::insert_edges(edge, source, &targets)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_project_preserves_order_and_defaults_empty() {
        let mut map = RelationMap::with_owners(&[RowKey::from("a")]);
        map.entries
            .entry(RowKey::from("a"))
            .or_default()
            .push(row(json!({ "name": "x" })));

        let projected = project(
            vec![row(json!({ "id": "b" })), row(json!({ "id": "a" }))],
            &[("tags", &map)],
            "id",
        );
        assert_eq!(projected[0]["id"], json!("b"));
        assert_eq!(projected[0]["tags"], json!([]));
        assert_eq!(projected[1]["tags"], json!([{ "name": "x" }]));
    }

    #[test]
    fn test_missing_owner_is_empty_slice() {
        let map = RelationMap::default();
        assert!(map.get(&RowKey::Integer(1)).is_empty());
        assert!(!map.contains(&RowKey::Integer(1)));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let ids = dedupe(vec![RowKey::from("b"), RowKey::from("a"), RowKey::from("b")]);
        assert_eq!(ids, vec![RowKey::from("b"), RowKey::from("a")]);
    }
}
