// Query Builder - raw read implementations wrapped with output validation
// No row leaves a query without being checked against the entity's schema.

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error};

use crate::ent_framework::schema::{FieldRule, Schema};
use crate::error::{AppError, AppResult, FieldIssue};
use crate::infrastructure::database::{Database, Row};

/// Declared result arity and shape of a query or action.
#[derive(Debug, Clone)]
pub enum Output {
    /// Exactly one row.
    One(Schema),
    /// One row or none.
    Nullable(Schema),
    Many(Schema),
    Scalar(FieldRule),
}

impl Output {
    pub fn one(schema: &Schema) -> Self {
        Output::One(schema.clone())
    }

    pub fn nullable(schema: &Schema) -> Self {
        Output::Nullable(schema.clone())
    }

    pub fn many(schema: &Schema) -> Self {
        Output::Many(schema.clone())
    }

    pub fn scalar(rule: FieldRule) -> Self {
        Output::Scalar(rule)
    }

    /// Validate a raw result. Any failure is a `SchemaMismatch` for `entity`.
    pub fn validate(&self, entity: &str, raw: Value) -> AppResult<Value> {
        match (self, raw) {
            (Output::One(_), Value::Null) => Err(mismatch(
                entity,
                vec![FieldIssue::new("", "Expected a row, received none")],
            )),
            (Output::One(schema), raw) => schema.check_output(&raw).map(Value::Object),
            (Output::Nullable(_), Value::Null) => Ok(Value::Null),
            (Output::Nullable(schema), raw) => schema.check_output(&raw).map(Value::Object),
            (Output::Many(schema), Value::Array(rows)) => {
                let mut issues = Vec::new();
                let mut validated = Vec::with_capacity(rows.len());
                for (index, row) in rows.iter().enumerate() {
                    match schema.parse(row) {
                        Ok(row) => validated.push(Value::Object(row)),
                        Err(errs) => {
                            let index = index.to_string();
                            issues.extend(errs.0.into_iter().map(|e| e.nested(&index)));
                        }
                    }
                }
                if issues.is_empty() {
                    Ok(Value::Array(validated))
                } else {
                    Err(mismatch(schema.entity(), issues))
                }
            }
            (Output::Many(_), other) => Err(mismatch(
                entity,
                vec![FieldIssue::new("", format!("Expected a list of rows, received {}", other))],
            )),
            (Output::Scalar(rule), raw) => rule.validate(&raw).map_err(|issues| mismatch(entity, issues)),
        }
    }
}

fn mismatch(entity: &str, issues: Vec<FieldIssue>) -> AppError {
    let err = AppError::schema_mismatch(entity, issues);
    error!("{}", err);
    err
}

/// Convert a validated value into the caller's type. A failure here is
/// still a shape disagreement, not a serialization bug in the caller.
pub(crate) fn into_typed<T: DeserializeOwned>(entity: &str, value: Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| mismatch(entity, vec![FieldIssue::new("", e.to_string())]))
}

/// Anything a raw implementation may hand back before validation.
pub trait IntoRawOutput {
    fn into_raw(self) -> Value;
}

impl IntoRawOutput for Value {
    fn into_raw(self) -> Value {
        self
    }
}

impl IntoRawOutput for Row {
    fn into_raw(self) -> Value {
        Value::Object(self)
    }
}

impl IntoRawOutput for Option<Row> {
    fn into_raw(self) -> Value {
        self.map_or(Value::Null, Value::Object)
    }
}

impl IntoRawOutput for Vec<Row> {
    fn into_raw(self) -> Value {
        Value::Array(self.into_iter().map(Value::Object).collect())
    }
}

impl IntoRawOutput for i64 {
    fn into_raw(self) -> Value {
        Value::from(self)
    }
}

impl IntoRawOutput for bool {
    fn into_raw(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoRawOutput for String {
    fn into_raw(self) -> Value {
        Value::String(self)
    }
}

/// Type-erased raw implementation.
pub type RawImplementation<P> =
    Arc<dyn Fn(Database, P) -> BoxFuture<'static, AppResult<Value>> + Send + Sync>;

pub(crate) fn erase<P, F, Fut, R>(raw: F) -> RawImplementation<P>
where
    F: Fn(Database, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<R>> + Send + 'static,
    R: IntoRawOutput,
{
    Arc::new(move |db, params| raw(db, params).map(|r| r.map(IntoRawOutput::into_raw)).boxed())
}

/// Produces queries for one entity.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity: String,
}

impl QueryBuilder {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
        }
    }

    pub fn implementation<P, F, Fut, R>(&self, raw: F) -> PendingQuery<P>
    where
        F: Fn(Database, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<R>> + Send + 'static,
        R: IntoRawOutput,
    {
        PendingQuery {
            entity: self.entity.clone(),
            raw: erase(raw),
        }
    }
}

/// A raw implementation still waiting for its declared output.
pub struct PendingQuery<P> {
    entity: String,
    raw: RawImplementation<P>,
}

impl<P> PendingQuery<P> {
    pub fn output<T>(self, output: Output) -> Query<P, T> {
        Query {
            entity: self.entity,
            raw: self.raw,
            output,
            _marker: PhantomData,
        }
    }
}

/// A callable, validated read operation.
pub struct Query<P, T> {
    entity: String,
    raw: RawImplementation<P>,
    output: Output,
    _marker: PhantomData<fn() -> T>,
}

impl<P, T: DeserializeOwned> Query<P, T> {
    pub async fn call(&self, db: &Database, params: P) -> AppResult<T> {
        debug!(entity = %self.entity, "Running query");
        let raw = (self.raw)(Arc::clone(db), params).await?;
        let validated = self.output.validate(&self.entity, raw)?;
        into_typed(&self.entity, validated)
    }

    pub fn output(&self) -> &Output {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tag {
        name: String,
        weight: i64,
    }

    fn tag_schema() -> Schema {
        Schema::new("tag")
            .with_field("name", FieldRule::text().non_empty("Name is required"))
            .with_field("weight", FieldRule::integer())
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    async fn db() -> Database {
        SqliteDatabase::new_in_memory().await.unwrap().into_database()
    }

    #[tokio::test]
    async fn test_many_validates_every_row() {
        let db = db().await;
        let query = QueryBuilder::new("tag")
            .implementation(|_db: Database, _: ()| async move {
                Ok::<_, AppError>(vec![
                    row(json!({ "name": "a", "weight": "1" })),
                    row(json!({ "name": "b", "weight": 2, "stray": true })),
                ])
            })
            .output::<Vec<Tag>>(Output::many(&tag_schema()));

        let tags = query.call(&db, ()).await.unwrap();
        assert_eq!(
            tags,
            vec![
                Tag { name: "a".into(), weight: 1 },
                Tag { name: "b".into(), weight: 2 }
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_row_is_schema_mismatch() {
        let db = db().await;
        let query = QueryBuilder::new("tag")
            .implementation(|_db: Database, _: ()| async move {
                Ok::<_, AppError>(vec![
                    row(json!({ "name": "a", "weight": 1 })),
                    row(json!({ "name": "", "weight": 1 })),
                ])
            })
            .output::<Vec<Tag>>(Output::many(&tag_schema()));

        match query.call(&db, ()).await.unwrap_err() {
            AppError::SchemaMismatch { issues, .. } => assert!(issues.has_path("1.name")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nullable_and_scalar_arities() {
        let db = db().await;
        let absent = QueryBuilder::new("tag")
            .implementation(|_db: Database, _: ()| async move { Ok::<Option<Row>, AppError>(None) })
            .output::<Option<Tag>>(Output::nullable(&tag_schema()));
        assert_eq!(absent.call(&db, ()).await.unwrap(), None);

        let required = QueryBuilder::new("tag")
            .implementation(|_db: Database, _: ()| async move { Ok::<Option<Row>, AppError>(None) })
            .output::<Tag>(Output::one(&tag_schema()));
        assert!(required.call(&db, ()).await.unwrap_err().is_schema_mismatch());

        let count = QueryBuilder::new("tag")
            .implementation(|_db: Database, n: i64| async move { Ok::<_, AppError>(n * 2) })
            .output::<i64>(Output::scalar(FieldRule::integer()));
        assert_eq!(count.call(&db, 21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_text_and_boolean_scalars() {
        let db = db().await;
        let status = QueryBuilder::new("tag")
            .implementation(|_db: Database, status: String| async move { Ok::<_, AppError>(status) })
            .output::<String>(Output::scalar(FieldRule::text().one_of(&["open", "closed"])));
        assert_eq!(status.call(&db, "open".to_string()).await.unwrap(), "open");
        assert!(status
            .call(&db, "archived".to_string())
            .await
            .unwrap_err()
            .is_schema_mismatch());

        let exists = QueryBuilder::new("tag")
            .implementation(|_db: Database, n: i64| async move { Ok::<_, AppError>(n > 0) })
            .output::<bool>(Output::scalar(FieldRule::boolean()));
        assert!(exists.call(&db, 3).await.unwrap());
        assert!(!exists.call(&db, 0).await.unwrap());
    }
}
