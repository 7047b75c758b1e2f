// Stock raw implementations over one table
// Every method returns an owned future so it can be used directly as the
// body of a query or action closure.

use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::ent_framework::relation::upsert_by_key;
use crate::ent_framework::statements;
use crate::ent_framework::table::TableDefinition;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Database, Row, RowKey};

#[derive(Debug, Clone)]
pub struct Crud {
    table: Arc<TableDefinition>,
}

fn to_row<V: Serialize>(value: &V) -> AppResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(AppError::SerializationError(format!(
            "Expected an object of column values, got {}",
            other
        ))),
    }
}

impl Crud {
    pub fn new(table: Arc<TableDefinition>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    pub fn find_all(&self, db: Database) -> BoxFuture<'static, AppResult<Vec<Row>>> {
        let statement = statements::select_all(&self.table);
        async move { db.fetch_all(statement).await }.boxed()
    }

    pub fn find_by_id(&self, db: Database, id: RowKey) -> BoxFuture<'static, AppResult<Option<Row>>> {
        let statement = statements::select_by_key(&self.table, &self.table.primary_key().column, id.to_param());
        async move { db.fetch_optional(statement).await }.boxed()
    }

    /// Rows whose `column` matches any of `values`. An empty set reads nothing.
    pub fn find_where(
        &self,
        db: Database,
        column: &str,
        values: Vec<Value>,
    ) -> BoxFuture<'static, AppResult<Vec<Row>>> {
        if values.is_empty() {
            return future::ready(Ok(Vec::new())).boxed();
        }
        let params = match values
            .iter()
            .map(|v| self.table.param_for(column, v))
            .collect::<AppResult<Vec<_>>>()
        {
            Ok(params) => params,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        let statement = statements::select_where_in(&self.table, column, params);
        async move { db.fetch_all(statement).await }.boxed()
    }

    pub fn find_one_where(
        &self,
        db: Database,
        column: &str,
        value: Value,
    ) -> BoxFuture<'static, AppResult<Option<Row>>> {
        let param = match self.table.param_for(column, &value) {
            Ok(param) => param,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        let statement = statements::select_by_key(&self.table, column, param);
        async move { db.fetch_optional(statement).await }.boxed()
    }

    /// Insert a new row. The primary key and server-assigned columns are
    /// produced here, never taken from `value`.
    pub fn create<V: Serialize>(&self, db: Database, value: &V) -> BoxFuture<'static, AppResult<Row>> {
        let statement = to_row(value)
            .and_then(|row| self.table.prepare_insert(row))
            .and_then(|row| statements::insert_returning(&self.table, &row));
        let table = self.table.name().to_string();
        async move {
            db.fetch_optional(statement?)
                .await?
                .ok_or_else(|| AppError::Internal(format!("Insert into {} returned no row", table)))
        }
        .boxed()
    }

    /// Update caller-writable columns. `None` when `id` does not exist.
    pub fn update<V: Serialize>(
        &self,
        db: Database,
        id: RowKey,
        value: &V,
    ) -> BoxFuture<'static, AppResult<Option<Row>>> {
        let statement = to_row(value)
            .map(|row| self.table.prepare_update(row))
            .and_then(|changes| statements::update_returning(&self.table, &id, &changes));
        async move { db.fetch_optional(statement?).await }.boxed()
    }

    /// Delete by id, returning the removed row. Deleting an absent id is `None`.
    pub fn delete(&self, db: Database, id: RowKey) -> BoxFuture<'static, AppResult<Option<Row>>> {
        let statement = statements::delete_returning(&self.table, &id);
        async move { db.fetch_optional(statement).await }.boxed()
    }

    /// Insert-or-fetch by a natural key column.
    pub fn upsert_by<V: Serialize>(
        &self,
        db: Database,
        key_column: &str,
        value: &V,
    ) -> BoxFuture<'static, AppResult<Row>> {
        let row = match to_row(value) {
            Ok(row) => row,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        let table = Arc::clone(&self.table);
        let key_column = key_column.to_string();
        async move { upsert_by_key(&db, &table, &key_column, row).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_framework::table::{ColumnDefinition, IdStrategy, ServerDefault};
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use serde_json::json;

    fn notes() -> Arc<TableDefinition> {
        Arc::new(
            TableDefinition::new("note", ColumnDefinition::text("id"), IdStrategy::uuid())
                .column(ColumnDefinition::text("title").not_null().unique())
                .column(ColumnDefinition::text("body"))
                .column(
                    ColumnDefinition::timestamp("created_at")
                        .not_null()
                        .server_default(ServerDefault::Now),
                ),
        )
    }

    async fn setup() -> (Database, Crud) {
        let db = SqliteDatabase::new_in_memory().await.unwrap().into_database();
        let table = notes();
        for statement in table.create_statements() {
            db.execute(statement).await.unwrap();
        }
        (db, Crud::new(table))
    }

    fn key(row: &Row) -> RowKey {
        RowKey::from_value(&row["id"]).unwrap()
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let (db, crud) = setup().await;

        let created = crud
            .create(db.clone(), &json!({ "id": "forged", "title": "first", "body": null }))
            .await
            .unwrap();
        assert_ne!(created["id"], json!("forged"));
        assert!(created["created_at"].is_string());

        let updated = crud
            .update(db.clone(), key(&created), &json!({ "body": "hello", "created_at": "2000-01-01T00:00:00Z" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["body"], json!("hello"));
        assert_eq!(updated["created_at"], created["created_at"]);

        let deleted = crud.delete(db.clone(), key(&created)).await.unwrap();
        assert_eq!(deleted.unwrap()["title"], json!("first"));
        assert!(crud.delete(db.clone(), key(&created)).await.unwrap().is_none());
        assert!(crud.find_by_id(db, key(&created)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_absent_row() {
        let (db, crud) = setup().await;
        let updated = crud
            .update(db, RowKey::from("missing"), &json!({ "title": "x" }))
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn test_find_where_and_upsert() {
        let (db, crud) = setup().await;
        let a = crud.upsert_by(db.clone(), "title", &json!({ "title": "a" })).await.unwrap();
        let again = crud.upsert_by(db.clone(), "title", &json!({ "title": "a" })).await.unwrap();
        assert_eq!(a["id"], again["id"]);
        crud.create(db.clone(), &json!({ "title": "b" })).await.unwrap();

        let found = crud
            .find_where(db.clone(), "title", vec![json!("b"), json!("a")])
            .await
            .unwrap();
        let titles: Vec<_> = found.iter().map(|r| r["title"].clone()).collect();
        assert_eq!(titles, vec![json!("a"), json!("b")]);

        assert!(crud.find_where(db.clone(), "title", vec![]).await.unwrap().is_empty());
        assert_eq!(crud.find_all(db).await.unwrap().len(), 2);
    }
}
