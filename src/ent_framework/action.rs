// Action Builder - raw mutations wrapped with input and output validation
// Input is checked before the raw implementation runs, so a rejected call
// never reaches the store.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::ent_framework::query::{erase, into_typed, IntoRawOutput, Output, RawImplementation};
use crate::ent_framework::schema::Schema;
use crate::error::AppResult;
use crate::infrastructure::database::Database;

type InputCheck<P> = Arc<dyn Fn(&P) -> AppResult<()> + Send + Sync>;

/// Parameters of an update: the target id and the new caller-writable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<Id, V> {
    pub id: Id,
    pub value: V,
}

impl<Id, V> Update<Id, V> {
    pub fn new(id: Id, value: V) -> Self {
        Self { id, value }
    }
}

/// Produces actions for one entity.
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    entity: String,
}

impl ActionBuilder {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
        }
    }

    pub fn action<P, T, F, Fut, R>(&self, name: &'static str, raw: F, output: Output) -> Action<P, T>
    where
        F: Fn(Database, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<R>> + Send + 'static,
        R: IntoRawOutput,
    {
        Action {
            entity: self.entity.clone(),
            name,
            raw: erase(raw),
            output,
            input: None,
            _marker: PhantomData,
        }
    }
}

/// A callable, validated mutation.
pub struct Action<P, T> {
    entity: String,
    name: &'static str,
    raw: RawImplementation<P>,
    output: Output,
    input: Option<InputCheck<P>>,
    _marker: PhantomData<fn() -> T>,
}

impl<P: 'static, T: DeserializeOwned> Action<P, T> {
    /// Check the whole parameter value against `schema` before running.
    pub fn validate_input(self, schema: Schema) -> Self
    where
        P: Serialize,
    {
        self.with_input_check(move |params: &P| schema.check_input_of(params).map(|_| ()))
    }

    /// Check the part of the parameters selected by `project`.
    pub fn validate_input_with<V: Serialize + 'static>(
        self,
        schema: Schema,
        project: impl Fn(&P) -> &V + Send + Sync + 'static,
    ) -> Self {
        self.with_input_check(move |params: &P| schema.check_input_of(project(params)).map(|_| ()))
    }

    fn with_input_check(mut self, check: impl Fn(&P) -> AppResult<()> + Send + Sync + 'static) -> Self {
        self.input = Some(Arc::new(check));
        self
    }

    pub async fn call(&self, db: &Database, params: P) -> AppResult<T> {
        if let Some(check) = &self.input {
            check(&params)?;
        }
        debug!(entity = %self.entity, action = self.name, "Running action");
        let raw = (self.raw)(Arc::clone(db), params).await?;
        let validated = self.output.validate(&self.entity, raw)?;
        into_typed(&self.entity, validated)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<Id: 'static, V: Serialize + 'static, T: DeserializeOwned> Action<Update<Id, V>, T> {
    /// Check `value` of an update against `schema`; the id is typed already.
    pub fn validate_value(self, schema: Schema) -> Self {
        self.validate_input_with(schema, |params| &params.value)
    }
}
