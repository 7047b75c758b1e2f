// SystemTechnology - technologies attached to system elements, unique by name

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EntityId;
use crate::ent_framework::{
    Action, ColumnDefinition, Entity, EntityBuilder, EntityContext, IdStrategy, Output, Overrides,
    Query, Schema, TableDefinition,
};
use crate::error::AppResult;
use crate::infrastructure::database::Database;
use crate::patterns::CreatedAtPattern;

crate::define_entity_id!(SystemTechnologyId, "SystemTechnologyID", String);

pub const TABLE: &str = "system_technology";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTechnology {
    pub id: SystemTechnologyId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSystemTechnology {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewSystemTechnology {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

pub struct SystemTechnologyQueries {
    pub query_all: Query<(), Vec<SystemTechnology>>,
    pub query_by_id: Query<SystemTechnologyId, Option<SystemTechnology>>,
    pub query_by_name: Query<String, Option<SystemTechnology>>,
}

pub struct SystemTechnologyActions {
    pub create: Action<NewSystemTechnology, SystemTechnology>,
    /// Insert-or-fetch by name; safe under concurrent callers.
    pub upsert: Action<NewSystemTechnology, SystemTechnology>,
    pub delete: Action<SystemTechnologyId, Option<SystemTechnology>>,
}

pub type SystemTechnologyEntity = Entity<SystemTechnologyQueries, SystemTechnologyActions>;

static ENTITY: OnceCell<SystemTechnologyEntity> = OnceCell::new();

pub fn system_technology() -> AppResult<&'static SystemTechnologyEntity> {
    ENTITY.get_or_try_init(build)
}

fn table() -> TableDefinition {
    TableDefinition::new(TABLE, ColumnDefinition::text("id"), IdStrategy::uuid())
        .column(ColumnDefinition::text("name").not_null().unique())
        .column(ColumnDefinition::text("description"))
        .column(CreatedAtPattern::for_table())
}

fn build() -> AppResult<SystemTechnologyEntity> {
    EntityBuilder::new(|| Ok(table()))
        .schema(|table| {
            Schema::bind(
                table,
                Overrides::new()
                    .field("id", |rule| rule.brand(SystemTechnologyId::BRAND))
                    .field("name", |rule| rule.non_empty("Technology name cannot be empty")),
            )
        })
        .build(queries, actions)
}

fn queries(ctx: &EntityContext) -> AppResult<SystemTechnologyQueries> {
    let schema = ctx.schema();

    let crud = ctx.crud();
    let query_all = ctx
        .query_builder()
        .implementation(move |db: Database, _: ()| crud.find_all(db))
        .output(Output::many(schema));

    let crud = ctx.crud();
    let query_by_id = ctx
        .query_builder()
        .implementation(move |db: Database, id: SystemTechnologyId| crud.find_by_id(db, id.key()))
        .output(Output::nullable(schema));

    let crud = ctx.crud();
    let query_by_name = ctx
        .query_builder()
        .implementation(move |db: Database, name: String| {
            crud.find_one_where(db, "name", Value::String(name))
        })
        .output(Output::nullable(schema));

    Ok(SystemTechnologyQueries {
        query_all,
        query_by_id,
        query_by_name,
    })
}

fn actions(ctx: &EntityContext) -> AppResult<SystemTechnologyActions> {
    let schema = ctx.schema();
    let builder = ctx.action_builder();

    let crud = ctx.crud();
    let create = builder
        .action(
            "create",
            move |db: Database, input: NewSystemTechnology| crud.create(db, &input),
            Output::one(schema),
        )
        .validate_input(schema.input_schema());

    let crud = ctx.crud();
    let upsert = builder
        .action(
            "upsert",
            move |db: Database, input: NewSystemTechnology| crud.upsert_by(db, "name", &input),
            Output::one(schema),
        )
        .validate_input(schema.input_schema());

    let crud = ctx.crud();
    let delete = builder.action(
        "delete",
        move |db: Database, id: SystemTechnologyId| crud.delete(db, id.key()),
        Output::nullable(schema),
    );

    Ok(SystemTechnologyActions {
        create,
        upsert,
        delete,
    })
}
