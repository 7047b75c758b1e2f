// MessageBoard - named boards that messages are posted to

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::core::EntityId;
use crate::ent_framework::{
    Action, ColumnDefinition, Entity, EntityBuilder, EntityContext, IdStrategy, Output, Overrides,
    Query, Schema, TableDefinition,
};
use crate::error::AppResult;
use crate::infrastructure::database::Database;
use crate::patterns::CreatedAtPattern;

crate::define_entity_id!(MessageBoardId, "MessageBoardID", String);

pub const TABLE: &str = "message_board";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBoard {
    pub id: MessageBoardId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessageBoard {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct MessageBoardQueries {
    pub query_all: Query<(), Vec<MessageBoard>>,
    pub query_by_id: Query<MessageBoardId, Option<MessageBoard>>,
}

pub struct MessageBoardActions {
    pub create: Action<NewMessageBoard, MessageBoard>,
    pub delete: Action<MessageBoardId, Option<MessageBoard>>,
}

pub type MessageBoardEntity = Entity<MessageBoardQueries, MessageBoardActions>;

static ENTITY: OnceCell<MessageBoardEntity> = OnceCell::new();

pub fn message_board() -> AppResult<&'static MessageBoardEntity> {
    ENTITY.get_or_try_init(build)
}

fn build() -> AppResult<MessageBoardEntity> {
    EntityBuilder::new(|| {
        Ok(
            TableDefinition::new(TABLE, ColumnDefinition::text("id"), IdStrategy::uuid())
                .column(ColumnDefinition::text("name").not_null())
                .column(ColumnDefinition::text("description"))
                .column(CreatedAtPattern::for_table()),
        )
    })
    .schema(|table| {
        Schema::bind(
            table,
            Overrides::new()
                .field("id", |rule| rule.brand(MessageBoardId::BRAND))
                .field("name", |rule| {
                    rule.non_empty("Board name cannot be empty")
                        .max_length(100, "Board name is too long")
                }),
        )
    })
    .build(
        |ctx: &EntityContext| {
            let schema = ctx.schema();
            let crud = ctx.crud();
            let query_all = ctx
                .query_builder()
                .implementation(move |db: Database, _: ()| crud.find_all(db))
                .output(Output::many(schema));

            let crud = ctx.crud();
            let query_by_id = ctx
                .query_builder()
                .implementation(move |db: Database, id: MessageBoardId| crud.find_by_id(db, id.key()))
                .output(Output::nullable(schema));

            Ok(MessageBoardQueries {
                query_all,
                query_by_id,
            })
        },
        |ctx: &EntityContext| {
            let schema = ctx.schema();
            let crud = ctx.crud();
            let create = ctx
                .action_builder()
                .action(
                    "create",
                    move |db: Database, input: NewMessageBoard| crud.create(db, &input),
                    Output::one(schema),
                )
                .validate_input(schema.input_schema());

            let crud = ctx.crud();
            let delete = ctx.action_builder().action(
                "delete",
                move |db: Database, id: MessageBoardId| crud.delete(db, id.key()),
                Output::nullable(schema),
            );

            Ok(MessageBoardActions { create, delete })
        },
    )
}
