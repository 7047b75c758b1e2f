// Ent Framework - table definitions, schemas, validated queries and actions,
// edges and batched relation loading

pub mod action;
pub mod crud;
pub mod edge;
pub mod entity;
pub mod query;
pub mod relation;
pub mod schema;
pub mod statements;
pub mod table;

pub use action::{Action, ActionBuilder, Update};
pub use crud::Crud;
pub use edge::{EdgeDefinition, Edges};
pub use entity::{Entity, EntityBuilder, EntityContext};
pub use query::{IntoRawOutput, Output, Query, QueryBuilder};
pub use relation::{project, replace_edges, upsert_by_key, RelationLoader, RelationMap};
pub use schema::{FieldKind, FieldRole, FieldRule, Overrides, Schema};
pub use table::{
    ColumnDefinition, ColumnType, IdStrategy, IndexDefinition, OnDelete, ServerDefault,
    TableDefinition,
};
