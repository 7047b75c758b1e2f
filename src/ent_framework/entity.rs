// Entity Builder - composition root for one entity type
// Builds the table, edges and schema, then hands them to the entity's query
// and action factories so those can compose crud and relation loading.

use std::sync::Arc;
use tracing::info;

use crate::ent_framework::action::ActionBuilder;
use crate::ent_framework::crud::Crud;
use crate::ent_framework::edge::{EdgeDefinition, Edges};
use crate::ent_framework::query::QueryBuilder;
use crate::ent_framework::relation::RelationLoader;
use crate::ent_framework::schema::{Overrides, Schema};
use crate::ent_framework::table::TableDefinition;
use crate::error::AppResult;
use crate::infrastructure::database::Database;

type TableFactory = Box<dyn FnOnce() -> AppResult<TableDefinition>>;
type EdgeFactory = Box<dyn FnOnce(&TableDefinition) -> AppResult<Vec<EdgeDefinition>>>;
type SchemaFactory = Box<dyn FnOnce(&TableDefinition) -> Schema>;

/// Everything an entity's query and action factories may draw on.
pub struct EntityContext {
    table: Arc<TableDefinition>,
    edges: Edges,
    schema: Schema,
}

impl EntityContext {
    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn table(&self) -> &Arc<TableDefinition> {
        &self.table
    }

    pub fn edges(&self) -> &Edges {
        &self.edges
    }

    pub fn edge(&self, name: &str) -> AppResult<Arc<EdgeDefinition>> {
        self.edges.get(name)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.table.name())
    }

    pub fn action_builder(&self) -> ActionBuilder {
        ActionBuilder::new(self.table.name())
    }

    pub fn crud(&self) -> Crud {
        Crud::new(Arc::clone(&self.table))
    }

    /// Batch loader for this entity's edge `edge` into `target`'s rows,
    /// validated with `target`'s schema.
    pub fn relation_loader<Q, A>(&self, edge: &str, target: &Entity<Q, A>) -> AppResult<RelationLoader> {
        Ok(RelationLoader::new(
            self.edge(edge)?,
            Arc::clone(&target.table),
            target.schema.clone(),
        ))
    }
}

/// Builder for an `Entity`. Factories run once, inside `build`.
pub struct EntityBuilder {
    table: TableFactory,
    edges: Option<EdgeFactory>,
    schema: Option<SchemaFactory>,
}

impl EntityBuilder {
    pub fn new(table: impl FnOnce() -> AppResult<TableDefinition> + 'static) -> Self {
        Self {
            table: Box::new(table),
            edges: None,
            schema: None,
        }
    }

    pub fn edges(
        mut self,
        edges: impl FnOnce(&TableDefinition) -> AppResult<Vec<EdgeDefinition>> + 'static,
    ) -> Self {
        self.edges = Some(Box::new(edges));
        self
    }

    /// Defaults to the plain column-derived schema.
    pub fn schema(mut self, schema: impl FnOnce(&TableDefinition) -> Schema + 'static) -> Self {
        self.schema = Some(Box::new(schema));
        self
    }

    pub fn build<Q, A>(
        self,
        queries: impl FnOnce(&EntityContext) -> AppResult<Q>,
        actions: impl FnOnce(&EntityContext) -> AppResult<A>,
    ) -> AppResult<Entity<Q, A>> {
        let table = (self.table)()?;
        let edges = match self.edges {
            Some(factory) => Edges::new(factory(&table)?)?,
            None => Edges::default(),
        };
        let schema = match self.schema {
            Some(factory) => factory(&table),
            None => Schema::bind(&table, Overrides::new()),
        };

        let context = EntityContext {
            table: Arc::new(table),
            edges,
            schema,
        };
        let queries = queries(&context)?;
        let actions = actions(&context)?;

        info!(
            entity = context.name(),
            columns = context.table.column_definitions().len(),
            edges = context.edges.len(),
            "Built entity"
        );

        let EntityContext { table, edges, schema } = context;
        Ok(Entity {
            schema,
            queries,
            actions,
            table,
            edges,
        })
    }
}

/// A declared entity: its schema plus validated queries and actions.
pub struct Entity<Q, A> {
    pub schema: Schema,
    pub queries: Q,
    pub actions: A,
    table: Arc<TableDefinition>,
    edges: Edges,
}

impl<Q, A> Entity<Q, A> {
    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    pub fn edges(&self) -> &Edges {
        &self.edges
    }

    /// Create the entity's table and edge tables if they are missing.
    pub async fn ensure_tables(&self, db: &Database) -> AppResult<()> {
        let statements = self
            .table
            .create_statements()
            .into_iter()
            .chain(self.edges.iter().flat_map(|edge| edge.create_statements()));
        for statement in statements {
            db.execute(statement).await?;
        }
        info!(entity = self.name(), edges = self.edges.len(), "Ensured tables");
        Ok(())
    }
}
