// SystemElementRelation - labelled arrows between two system elements

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::core::EntityId;
use crate::domains::design_tool::system_element::{self, SystemElementId};
use crate::ent_framework::{
    Action, ColumnDefinition, Entity, EntityBuilder, EntityContext, IdStrategy, OnDelete, Output,
    Overrides, Query, Schema, TableDefinition, Update,
};
use crate::error::AppResult;
use crate::infrastructure::database::Database;
use crate::patterns::CreatedAtPattern;

crate::define_entity_id!(SystemElementRelationId, "SystemElementRelationID", String);

pub const TABLE: &str = "system_element_relation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemElementRelation {
    pub id: SystemElementRelationId,
    pub source_id: SystemElementId,
    pub target_id: SystemElementId,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSystemElementRelation {
    pub source_id: SystemElementId,
    pub target_id: SystemElementId,
    #[serde(default)]
    pub label: Option<String>,
}

pub struct SystemElementRelationQueries {
    pub query_all: Query<(), Vec<SystemElementRelation>>,
    pub query_by_id: Query<SystemElementRelationId, Option<SystemElementRelation>>,
}

pub struct SystemElementRelationActions {
    pub create: Action<NewSystemElementRelation, SystemElementRelation>,
    pub update: Action<
        Update<SystemElementRelationId, NewSystemElementRelation>,
        Option<SystemElementRelation>,
    >,
    pub delete: Action<SystemElementRelationId, Option<SystemElementRelation>>,
}

pub type SystemElementRelationEntity =
    Entity<SystemElementRelationQueries, SystemElementRelationActions>;

static ENTITY: OnceCell<SystemElementRelationEntity> = OnceCell::new();

pub fn system_element_relation() -> AppResult<&'static SystemElementRelationEntity> {
    ENTITY.get_or_try_init(build)
}

fn element_reference(name: &str) -> ColumnDefinition {
    ColumnDefinition::text(name)
        .not_null()
        .references(system_element::TABLE, "id")
        .on_delete(OnDelete::Cascade)
}

fn build() -> AppResult<SystemElementRelationEntity> {
    EntityBuilder::new(|| {
        Ok(
            TableDefinition::new(TABLE, ColumnDefinition::text("id"), IdStrategy::uuid())
                .column(element_reference("source_id"))
                .column(element_reference("target_id"))
                .column(ColumnDefinition::text("label"))
                .column(CreatedAtPattern::for_table()),
        )
    })
    .schema(|table| {
        Schema::bind(
            table,
            Overrides::new()
                .field("id", |rule| rule.brand(SystemElementRelationId::BRAND))
                .field("source_id", |rule| rule.brand(SystemElementId::BRAND))
                .field("target_id", |rule| rule.brand(SystemElementId::BRAND))
                .field("label", |rule| rule.max_length(200, "Label is too long")),
        )
    })
    .build(queries, actions)
}

fn queries(ctx: &EntityContext) -> AppResult<SystemElementRelationQueries> {
    let schema = ctx.schema();

    let crud = ctx.crud();
    let query_all = ctx
        .query_builder()
        .implementation(move |db: Database, _: ()| crud.find_all(db))
        .output(Output::many(schema));

    let crud = ctx.crud();
    let query_by_id = ctx
        .query_builder()
        .implementation(move |db: Database, id: SystemElementRelationId| {
            crud.find_by_id(db, id.key())
        })
        .output(Output::nullable(schema));

    Ok(SystemElementRelationQueries {
        query_all,
        query_by_id,
    })
}

fn actions(ctx: &EntityContext) -> AppResult<SystemElementRelationActions> {
    let schema = ctx.schema();
    let builder = ctx.action_builder();

    let crud = ctx.crud();
    let create = builder
        .action(
            "create",
            move |db: Database, input: NewSystemElementRelation| crud.create(db, &input),
            Output::one(schema),
        )
        .validate_input(schema.input_schema());

    let crud = ctx.crud();
    let update = builder
        .action(
            "update",
            move |db: Database, update: Update<SystemElementRelationId, NewSystemElementRelation>| {
                crud.update(db, update.id.key(), &update.value)
            },
            Output::nullable(schema),
        )
        .validate_value(schema.input_schema());

    let crud = ctx.crud();
    let delete = builder.action(
        "delete",
        move |db: Database, id: SystemElementRelationId| crud.delete(db, id.key()),
        Output::nullable(schema),
    );

    Ok(SystemElementRelationActions {
        create,
        update,
        delete,
    })
}
