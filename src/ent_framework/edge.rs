// Edge Manager - many-to-many join table declarations
// Pure configuration: an edge knows its join table's shape and DDL, while
// loading and replacing edges lives in the relation module.

use std::sync::Arc;

use crate::ent_framework::table::{ColumnDefinition, ColumnType, IndexDefinition, OnDelete, TableDefinition};
use crate::ent_framework::statements::quote;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Statement;

/// One end of an edge: the owning table and its key.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeEnd {
    pub table: String,
    pub key: String,
    pub key_type: ColumnType,
    pub column: String,
}

impl EdgeEnd {
    fn from_table(table: &TableDefinition, column: String) -> Self {
        Self {
            table: table.name().to_string(),
            key: table.primary_key().column.clone(),
            key_type: table.primary_key_column().column_type,
            column,
        }
    }

    fn column_definition(&self) -> ColumnDefinition {
        ColumnDefinition::new(&self.column, self.key_type)
            .not_null()
            .references(&self.table, &self.key)
            .on_delete(OnDelete::Cascade)
    }
}

/// A named join table from a source entity to a target entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDefinition {
    name: String,
    join_table: String,
    source: EdgeEnd,
    target: EdgeEnd,
    position_column: Option<String>,
}

impl EdgeDefinition {
    /// Join columns default to `{table}_id`, prefixed with `source_`/`target_`
    /// when both ends are the same table.
    pub fn new(name: &str, join_table: &str, source: &TableDefinition, target: &TableDefinition) -> Self {
        let (source_column, target_column) = if source.name() == target.name() {
            (
                format!("source_{}_id", source.name()),
                format!("target_{}_id", target.name()),
            )
        } else {
            (format!("{}_id", source.name()), format!("{}_id", target.name()))
        };

        Self {
            name: name.to_string(),
            join_table: join_table.to_string(),
            source: EdgeEnd::from_table(source, source_column),
            target: EdgeEnd::from_table(target, target_column),
            position_column: None,
        }
    }

    pub fn source_column(mut self, column: &str) -> Self {
        self.source.column = column.to_string();
        self
    }

    pub fn target_column(mut self, column: &str) -> Self {
        self.target.column = column.to_string();
        self
    }

    /// Keep an explicit `position` so related rows come back in the order
    /// they were written.
    pub fn ordered(mut self) -> Self {
        self.position_column = Some("position".to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join_table(&self) -> &str {
        &self.join_table
    }

    pub fn source(&self) -> &EdgeEnd {
        &self.source
    }

    pub fn target(&self) -> &EdgeEnd {
        &self.target
    }

    pub fn source_column_name(&self) -> &str {
        &self.source.column
    }

    pub fn target_column_name(&self) -> &str {
        &self.target.column
    }

    pub fn position_column(&self) -> Option<&str> {
        self.position_column.as_deref()
    }

    /// Join table, a unique (source, target) index and a target lookup index.
    pub fn create_statements(&self) -> Vec<Statement> {
        let mut columns = vec![
            self.source.column_definition().column_sql(None),
            self.target.column_definition().column_sql(None),
        ];
        if let Some(position) = &self.position_column {
            columns.push(format!("{} INTEGER NOT NULL DEFAULT 0", quote(position)));
        }

        let pair = IndexDefinition::new(
            &format!("{}_source_target", self.join_table),
            vec![self.source.column.as_str(), self.target.column.as_str()],
        )
        .unique();
        let by_target = IndexDefinition::new(
            &format!("{}_target", self.join_table),
            vec![self.target.column.as_str()],
        );

        vec![
            Statement::new(
                "create_table",
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    quote(&self.join_table),
                    columns.join(", ")
                ),
            ),
            pair.create_statement(&self.join_table),
            by_target.create_statement(&self.join_table),
        ]
    }
}

/// The named edges of one entity.
#[derive(Debug, Clone, Default)]
pub struct Edges {
    entries: Vec<Arc<EdgeDefinition>>,
}

impl Edges {
    pub fn new(edges: Vec<EdgeDefinition>) -> AppResult<Self> {
        let mut entries: Vec<Arc<EdgeDefinition>> = Vec::with_capacity(edges.len());
        for edge in edges {
            if entries.iter().any(|e| e.name == edge.name) {
                return Err(AppError::ConfigurationError(format!(
                    "Edge {} declared twice",
                    edge.name
                )));
            }
            entries.push(Arc::new(edge));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> AppResult<Arc<EdgeDefinition>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| AppError::ConfigurationError(format!("Unknown edge {}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EdgeDefinition>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_framework::table::IdStrategy;

    fn element() -> TableDefinition {
        TableDefinition::new("element", ColumnDefinition::text("id"), IdStrategy::uuid())
    }

    fn technology() -> TableDefinition {
        TableDefinition::new("technology", ColumnDefinition::integer("id"), IdStrategy::StoreAssigned)
    }

    #[test]
    fn test_edge_ddl() {
        let edge = EdgeDefinition::new("technologies", "element_technology", &element(), &technology());
        let statements = edge.create_statements();
        assert_eq!(
            statements[0].sql,
            "CREATE TABLE IF NOT EXISTS \"element_technology\" (\
             \"element_id\" TEXT NOT NULL REFERENCES \"element\"(\"id\") ON DELETE CASCADE, \
             \"technology_id\" INTEGER NOT NULL REFERENCES \"technology\"(\"id\") ON DELETE CASCADE)"
        );
        assert_eq!(
            statements[1].sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"element_technology_source_target\" \
             ON \"element_technology\" (\"element_id\", \"technology_id\")"
        );
    }

    #[test]
    fn test_self_edge_columns_differ() {
        let edge = EdgeDefinition::new("children", "element_child", &element(), &element()).ordered();
        assert_eq!(edge.source_column_name(), "source_element_id");
        assert_eq!(edge.target_column_name(), "target_element_id");
        assert!(edge.create_statements()[0].sql.contains("\"position\" INTEGER NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_explicit_column_names() {
        let edge = EdgeDefinition::new("depends_on", "element_dependency", &element(), &element())
            .source_column("dependent_id")
            .target_column("dependency_id");
        assert_eq!(edge.source_column_name(), "dependent_id");
        assert_eq!(edge.target_column_name(), "dependency_id");
        assert_eq!(
            edge.create_statements()[2].sql,
            "CREATE INDEX IF NOT EXISTS \"element_dependency_target\" \
             ON \"element_dependency\" (\"dependency_id\")"
        );
    }

    #[test]
    fn test_lookup_by_name() {
        let edges = Edges::new(vec![EdgeDefinition::new("technologies", "et", &element(), &technology())]).unwrap();
        assert_eq!(edges.get("technologies").unwrap().join_table(), "et");
        assert!(matches!(edges.get("nope"), Err(AppError::ConfigurationError(_))));

        let duplicate = Edges::new(vec![
            EdgeDefinition::new("technologies", "et", &element(), &technology()),
            EdgeDefinition::new("technologies", "et2", &element(), &technology()),
        ]);
        assert!(duplicate.is_err());
    }
}
