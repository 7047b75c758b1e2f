// Image - binary attachments with numeric snowflake ids

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EntityId;
use crate::ent_framework::{
    Action, ColumnDefinition, Entity, EntityBuilder, EntityContext, IdStrategy, Output, Overrides,
    Query, Schema, TableDefinition,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Database, RowKey};
use crate::patterns::CreatedAtPattern;

crate::define_entity_id!(ImageId, "ImageID", i64);

pub const TABLE: &str = "image";
const SHARD_ID: u16 = 1;

static MIME_TYPE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[\w.+-]+/[\w.+-]+$"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    /// Base64 encoded bytes.
    pub file_content: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub image_src: String,
}

impl Image {
    pub fn bytes(&self) -> AppResult<Vec<u8>> {
        STANDARD
            .decode(&self.file_content)
            .map_err(|e| AppError::SerializationError(format!("Invalid image content: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImage {
    pub file_content: String,
    pub mime_type: String,
}

impl NewImage {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            file_content: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }
}

/// Path the surrounding application serves an image from.
pub fn image_src(id: &RowKey) -> String {
    format!("/application/images/{}", id)
}

pub struct ImageQueries {
    pub query_by_id: Query<ImageId, Option<Image>>,
}

pub struct ImageActions {
    pub create: Action<NewImage, Image>,
    pub delete: Action<ImageId, Option<Image>>,
}

pub type ImageEntity = Entity<ImageQueries, ImageActions>;

static ENTITY: OnceCell<ImageEntity> = OnceCell::new();

pub fn image() -> AppResult<&'static ImageEntity> {
    ENTITY.get_or_try_init(build)
}

fn build() -> AppResult<ImageEntity> {
    let mime_type = MIME_TYPE
        .as_ref()
        .map_err(|e| AppError::ConfigurationError(format!("Invalid mime type pattern: {}", e)))?
        .clone();

    EntityBuilder::new(|| {
        Ok(
            TableDefinition::new(TABLE, ColumnDefinition::integer("id"), IdStrategy::snowflake(SHARD_ID)?)
                .column(ColumnDefinition::blob("file_content").not_null())
                .column(ColumnDefinition::text("mime_type").not_null())
                .column(CreatedAtPattern::for_table()),
        )
    })
    .schema(move |table| {
        Schema::bind(
            table,
            Overrides::new()
                .field("id", |rule| rule.brand(ImageId::BRAND))
                .field("mime_type", move |rule| rule.pattern(mime_type, "Unsupported mime type")),
        )
        .computed("image_src", |row| {
            let src = row.get("id").and_then(RowKey::from_value).map(|id| image_src(&id));
            src.map_or(Value::Null, Value::String)
        })
    })
    .build(queries, actions)
}

fn queries(ctx: &EntityContext) -> AppResult<ImageQueries> {
    let crud = ctx.crud();
    let query_by_id = ctx
        .query_builder()
        .implementation(move |db: Database, id: ImageId| crud.find_by_id(db, id.key()))
        .output(Output::nullable(ctx.schema()));

    Ok(ImageQueries { query_by_id })
}

fn actions(ctx: &EntityContext) -> AppResult<ImageActions> {
    let schema = ctx.schema();

    let crud = ctx.crud();
    let create = ctx
        .action_builder()
        .action(
            "create",
            move |db: Database, input: NewImage| crud.create(db, &input),
            Output::one(schema),
        )
        .validate_input(schema.input_schema());

    let crud = ctx.crud();
    let delete = ctx.action_builder().action(
        "delete",
        move |db: Database, id: ImageId| crud.delete(db, id.key()),
        Output::nullable(schema),
    );

    Ok(ImageActions { create, delete })
}
