// SystemElement - nodes of a system design diagram with their technologies

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::core::EntityId;
use crate::domains::design_tool::system_technology::{
    system_technology, NewSystemTechnology, SystemTechnology,
};
use crate::ent_framework::{
    replace_edges, Action, ColumnDefinition, EdgeDefinition, Entity, EntityBuilder,
    EntityContext, FieldRule, IdStrategy, OnDelete, Output, Overrides, Query, RelationLoader,
    Schema, TableDefinition, Update,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{with_transaction, Database, Row, RowKey};
use crate::patterns::CreatedAtPattern;

crate::define_entity_id!(SystemElementId, "SystemElementID", String);

pub const TABLE: &str = "system_element";
pub const TECHNOLOGIES: &str = "technologies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemElementType {
    System,
    Container,
    Component,
    Person,
}

impl SystemElementType {
    pub const VARIANTS: [&'static str; 4] = ["system", "container", "component", "person"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemElement {
    pub id: SystemElementId,
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: SystemElementType,
    pub description: Option<String>,
    pub parent_id: Option<SystemElementId>,
    pub is_external: bool,
    pub created_at: DateTime<Utc>,
    /// Empty on rows returned by `delete`, which does not resolve relations.
    #[serde(default)]
    pub technologies: Vec<SystemTechnology>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSystemElement {
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: SystemElementType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<SystemElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_external: Option<bool>,
    /// Technology names; unknown names are created.
    #[serde(default)]
    pub technologies: Vec<String>,
}

impl NewSystemElement {
    pub fn new(name: impl Into<String>, element_type: SystemElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
            description: None,
            parent_id: None,
            is_external: None,
            technologies: Vec::new(),
        }
    }
}

/// Caller-writable fields of an element. The technology set is replaced
/// wholesale on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemElementUpdate {
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: SystemElementType,
    pub description: Option<String>,
    pub parent_id: Option<SystemElementId>,
    pub is_external: bool,
    pub technologies: Vec<String>,
}

impl From<&SystemElement> for SystemElementUpdate {
    fn from(element: &SystemElement) -> Self {
        Self {
            name: element.name.clone(),
            element_type: element.element_type,
            description: element.description.clone(),
            parent_id: element.parent_id.clone(),
            is_external: element.is_external,
            technologies: element.technologies.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

pub struct SystemElementQueries {
    pub query_all: Query<(), Vec<SystemElement>>,
    pub query_by_id: Query<SystemElementId, Option<SystemElement>>,
    pub query_children: Query<SystemElementId, Vec<SystemElement>>,
}

pub struct SystemElementActions {
    pub create: Action<NewSystemElement, SystemElement>,
    pub update: Action<Update<SystemElementId, SystemElementUpdate>, Option<SystemElement>>,
    pub delete: Action<SystemElementId, Option<SystemElement>>,
}

pub type SystemElementEntity = Entity<SystemElementQueries, SystemElementActions>;

static ENTITY: OnceCell<SystemElementEntity> = OnceCell::new();

pub fn system_element() -> AppResult<&'static SystemElementEntity> {
    ENTITY.get_or_try_init(build)
}

fn table() -> TableDefinition {
    TableDefinition::new(TABLE, ColumnDefinition::text("id"), IdStrategy::uuid())
        .column(ColumnDefinition::text("name").not_null())
        .column(ColumnDefinition::text("type").not_null())
        .column(ColumnDefinition::text("description"))
        .column(
            ColumnDefinition::text("parent_id")
                .references(TABLE, "id")
                .on_delete(OnDelete::SetNull),
        )
        .column(ColumnDefinition::boolean("is_external").not_null().default_value(false))
        .column(CreatedAtPattern::for_table())
}

fn build() -> AppResult<SystemElementEntity> {
    let technology = system_technology()?;
    let technology_schema = technology.schema.clone();

    EntityBuilder::new(|| Ok(table()))
        .edges(move |table| {
            Ok(vec![EdgeDefinition::new(
                TECHNOLOGIES,
                "system_element_technology",
                table,
                technology.table(),
            )
            .ordered()])
        })
        .schema(move |table| {
            Schema::bind(
                table,
                Overrides::new()
                    .field("id", |rule| rule.brand(SystemElementId::BRAND))
                    .field("name", |rule| {
                        rule.non_empty("System element name cannot be empty")
                    })
                    .field("type", |rule| rule.one_of(&SystemElementType::VARIANTS))
                    .field("parent_id", |rule| rule.brand(SystemElementId::BRAND)),
            )
            .extend([(TECHNOLOGIES, FieldRule::list_of(&technology_schema))])
        })
        .build(queries, actions)
}

/// Input schema shared by create and update: caller-writable columns plus
/// technology names.
fn input_schema(schema: &Schema) -> Schema {
    schema.input_schema().extend([(
        TECHNOLOGIES,
        FieldRule::list(FieldRule::text().non_empty("Technology name cannot be empty")).optional(),
    )])
}

fn queries(ctx: &EntityContext) -> AppResult<SystemElementQueries> {
    let schema = ctx.schema();
    let technologies = ctx.relation_loader(TECHNOLOGIES, system_technology()?)?;

    let (crud, loader) = (ctx.crud(), technologies.clone());
    let query_all = ctx
        .query_builder()
        .implementation(move |db: Database, _: ()| {
            let (crud, loader) = (crud.clone(), loader.clone());
            async move {
                let rows = crud.find_all(db.clone()).await?;
                loader.hydrate(&db, TECHNOLOGIES, rows).await
            }
        })
        .output(Output::many(schema));

    let (crud, loader) = (ctx.crud(), technologies.clone());
    let query_by_id = ctx
        .query_builder()
        .implementation(move |db: Database, id: SystemElementId| {
            let (crud, loader) = (crud.clone(), loader.clone());
            async move {
                let row = crud.find_by_id(db.clone(), id.key()).await?;
                hydrate_one(&db, &loader, row).await
            }
        })
        .output(Output::nullable(schema));

    let (crud, loader) = (ctx.crud(), technologies);
    let query_children = ctx
        .query_builder()
        .implementation(move |db: Database, parent: SystemElementId| {
            let (crud, loader) = (crud.clone(), loader.clone());
            async move {
                let rows = crud
                    .find_where(db.clone(), "parent_id", vec![parent.to_value()])
                    .await?;
                loader.hydrate(&db, TECHNOLOGIES, rows).await
            }
        })
        .output(Output::many(schema));

    Ok(SystemElementQueries {
        query_all,
        query_by_id,
        query_children,
    })
}

async fn hydrate_one(db: &Database, loader: &RelationLoader, row: Option<Row>) -> AppResult<Option<Row>> {
    match row {
        Some(row) => Ok(loader.hydrate(db, TECHNOLOGIES, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Resolve technology names to ids, creating the missing ones.
async fn upsert_technologies(db: &Database, names: &[String]) -> AppResult<Vec<RowKey>> {
    let technology = system_technology()?;
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let upserted = technology
            .actions
            .upsert
            .call(db, NewSystemTechnology::named(name.as_str()))
            .await?;
        ids.push(upserted.id.key());
    }
    Ok(ids)
}

fn row_key(row: &Row, column: &str) -> AppResult<RowKey> {
    row.get(column)
        .and_then(RowKey::from_value)
        .ok_or_else(|| AppError::Internal(format!("{} row without {}", TABLE, column)))
}

fn actions(ctx: &EntityContext) -> AppResult<SystemElementActions> {
    let schema = ctx.schema();
    let builder = ctx.action_builder();
    let edge = ctx.edge(TECHNOLOGIES)?;
    let loader = ctx.relation_loader(TECHNOLOGIES, system_technology()?)?;

    let (crud, edge_for_create, loader_for_create) = (ctx.crud(), edge.clone(), loader.clone());
    let create = builder
        .action(
            "create",
            move |db: Database, input: NewSystemElement| {
                let (crud, edge, loader) =
                    (crud.clone(), edge_for_create.clone(), loader_for_create.clone());
                async move {
                    with_transaction(&db, |tx| async move {
                        let row = crud.create(tx.clone(), &input).await?;
                        let id = row_key(&row, "id")?;
                        let targets = upsert_technologies(&tx, &input.technologies).await?;
                        replace_edges(&tx, &edge, &id, targets).await?;
                        hydrate_one(&tx, &loader, Some(row)).await
                    })
                    .await
                }
            },
            Output::one(schema),
        )
        .validate_input(input_schema(schema));

    let crud = ctx.crud();
    let update = builder
        .action(
            "update",
            move |db: Database, update: Update<SystemElementId, SystemElementUpdate>| {
                let (crud, edge, loader) = (crud.clone(), edge.clone(), loader.clone());
                async move {
                    with_transaction(&db, |tx| async move {
                        let id = update.id.key();
                        let Some(row) = crud.update(tx.clone(), id.clone(), &update.value).await? else {
                            return Ok(None);
                        };
                        let targets = upsert_technologies(&tx, &update.value.technologies).await?;
                        replace_edges(&tx, &edge, &id, targets).await?;
                        hydrate_one(&tx, &loader, Some(row)).await
                    })
                    .await
                }
            },
            Output::nullable(schema),
        )
        .validate_value(input_schema(schema));

    let crud = ctx.crud();
    let delete = builder.action(
        "delete",
        move |db: Database, id: SystemElementId| crud.delete(db, id.key()),
        Output::nullable(&schema.without(&[TECHNOLOGIES])),
    );

    Ok(SystemElementActions {
        create,
        update,
        delete,
    })
}
