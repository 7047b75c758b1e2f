// Message - posts on a message board, optionally with an image

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::core::{EntityId, UserId};
use crate::domains::messaging::image::{self, ImageId};
use crate::domains::messaging::message_board::{self, MessageBoardId};
use crate::ent_framework::{
    Action, ColumnDefinition, Entity, EntityBuilder, EntityContext, IdStrategy, IndexDefinition,
    OnDelete, Output, Overrides, Query, Schema, TableDefinition,
};
use crate::error::AppResult;
use crate::infrastructure::database::Database;
use crate::patterns::{CreatedAtPattern, CreatedByUserPattern};

crate::define_entity_id!(MessageId, "MessageID", String);

pub const TABLE: &str = "message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub message_board_id: MessageBoardId,
    pub image_id: Option<ImageId>,
    pub created_by_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
    pub message_board_id: MessageBoardId,
    #[serde(default)]
    pub image_id: Option<ImageId>,
    pub created_by_user_id: UserId,
}

pub struct MessageQueries {
    pub query_by_board: Query<MessageBoardId, Vec<Message>>,
    pub query_by_id: Query<MessageId, Option<Message>>,
}

pub struct MessageActions {
    pub create: Action<NewMessage, Message>,
    pub delete: Action<MessageId, Option<Message>>,
}

pub type MessageEntity = Entity<MessageQueries, MessageActions>;

static ENTITY: OnceCell<MessageEntity> = OnceCell::new();

pub fn message() -> AppResult<&'static MessageEntity> {
    ENTITY.get_or_try_init(build)
}

fn table() -> TableDefinition {
    TableDefinition::new(TABLE, ColumnDefinition::text("id"), IdStrategy::uuid())
        .column(ColumnDefinition::text("content").not_null())
        .column(
            ColumnDefinition::text("message_board_id")
                .not_null()
                .references(message_board::TABLE, "id")
                .on_delete(OnDelete::Cascade),
        )
        .column(
            ColumnDefinition::integer("image_id")
                .references(image::TABLE, "id")
                .on_delete(OnDelete::SetNull),
        )
        .column(CreatedByUserPattern::for_table())
        .column(CreatedAtPattern::for_table())
        .index(IndexDefinition::new("message_board_idx", vec!["message_board_id"]))
}

fn build() -> AppResult<MessageEntity> {
    EntityBuilder::new(|| Ok(table()))
        .schema(|table| {
            let overrides = Overrides::new()
                .field("id", |rule| rule.brand(MessageId::BRAND))
                .field("content", |rule| {
                    rule.non_empty("Message cannot be empty")
                        .max_length(4000, "Message is too long")
                })
                .field("message_board_id", |rule| rule.brand(MessageBoardId::BRAND))
                .field("image_id", |rule| rule.brand(ImageId::BRAND));
            Schema::bind(table, CreatedByUserPattern::for_schema(overrides))
        })
        .build(queries, actions)
}

fn queries(ctx: &EntityContext) -> AppResult<MessageQueries> {
    let schema = ctx.schema();

    let crud = ctx.crud();
    let query_by_board = ctx
        .query_builder()
        .implementation(move |db: Database, board: MessageBoardId| {
            crud.find_where(db, "message_board_id", vec![board.to_value()])
        })
        .output(Output::many(schema));

    let crud = ctx.crud();
    let query_by_id = ctx
        .query_builder()
        .implementation(move |db: Database, id: MessageId| crud.find_by_id(db, id.key()))
        .output(Output::nullable(schema));

    Ok(MessageQueries {
        query_by_board,
        query_by_id,
    })
}

fn actions(ctx: &EntityContext) -> AppResult<MessageActions> {
    let schema = ctx.schema();

    let crud = ctx.crud();
    let create = ctx
        .action_builder()
        .action(
            "create",
            move |db: Database, input: NewMessage| crud.create(db, &input),
            Output::one(schema),
        )
        .validate_input(schema.input_schema());

    let crud = ctx.crud();
    let delete = ctx.action_builder().action(
        "delete",
        move |db: Database, id: MessageId| crud.delete(db, id.key()),
        Output::nullable(schema),
    );

    Ok(MessageActions { create, delete })
}
