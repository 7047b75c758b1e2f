// Table Definitions - declarative description of an entity's backing table
// Declared once per entity at startup and shared read-only afterwards.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::ent_framework::statements::quote;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Row, SqlParam, Statement};
use crate::infrastructure::id_generator::{IdGenerator, SnowflakeIdGenerator, UuidGenerator};

/// Storage types supported by the binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    /// RFC 3339 text in UTC.
    Timestamp,
    /// Raw bytes, surfaced in rows as base64 text.
    Blob,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Timestamp => "TEXT",
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
        }
    }

    /// Convert a row value into a statement parameter for this column type.
    pub fn to_param(self, value: &Value) -> AppResult<SqlParam> {
        match (self, value) {
            (_, Value::Null) => Ok(SqlParam::Null),
            (ColumnType::Blob, Value::String(encoded)) => STANDARD
                .decode(encoded)
                .map(SqlParam::Blob)
                .map_err(|e| AppError::SerializationError(format!("Invalid base64 blob: {}", e))),
            (ColumnType::Boolean, Value::Bool(b)) => Ok(SqlParam::Boolean(*b)),
            (ColumnType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(SqlParam::Integer)
                .map_err(|_| AppError::SerializationError(format!("'{}' is not an integer", s))),
            (_, other) => Ok(SqlParam::from_value(other)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Blob => "blob",
        };
        write!(f, "{}", name)
    }
}

/// Value the store side assigns when a row is inserted.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerDefault {
    /// Current UTC time.
    Now,
}

impl ServerDefault {
    fn produce(&self) -> Value {
        match self {
            ServerDefault::Now => Value::String(now_timestamp()),
        }
    }
}

/// Current UTC time in the format timestamp columns are stored in.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
}

impl OnDelete {
    fn sql(self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: OnDelete,
}

/// Column definition. Columns are nullable unless marked `not_null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    /// Used when an insert omits the column.
    pub default: Option<Value>,
    /// Assigned on insert regardless of input; never caller-writable.
    pub server_default: Option<ServerDefault>,
    pub references: Option<ForeignKey>,
}

impl ColumnDefinition {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
            unique: false,
            default: None,
            server_default: None,
            references: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn real(name: &str) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn timestamp(name: &str) -> Self {
        Self::new(name, ColumnType::Timestamp)
    }

    pub fn blob(name: &str) -> Self {
        Self::new(name, ColumnType::Blob)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn server_default(mut self, default: ServerDefault) -> Self {
        self.server_default = Some(default);
        self
    }

    /// Foreign key to `table.column`, restricting deletes by default.
    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ForeignKey {
            table: table.to_string(),
            column: column.to_string(),
            on_delete: OnDelete::Restrict,
        });
        self
    }

    pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
        if let Some(fk) = self.references.as_mut() {
            fk.on_delete = on_delete;
        }
        self
    }

    pub fn is_server_assigned(&self) -> bool {
        self.server_default.is_some()
    }

    pub(crate) fn column_sql(&self, primary_key: Option<&IdStrategy>) -> String {
        let mut sql = format!("{} {}", quote(&self.name), self.column_type.sql_type());
        match primary_key {
            // AUTOINCREMENT keeps store-assigned ids from being reused after deletes.
            Some(IdStrategy::StoreAssigned) => sql.push_str(" PRIMARY KEY AUTOINCREMENT"),
            Some(_) => sql.push_str(" PRIMARY KEY NOT NULL"),
            None => {
                if !self.nullable {
                    sql.push_str(" NOT NULL");
                }
                if self.unique {
                    sql.push_str(" UNIQUE");
                }
            }
        }
        if let Some(fk) = &self.references {
            sql.push_str(&format!(
                " REFERENCES {}({}) ON DELETE {}",
                quote(&fk.table),
                quote(&fk.column),
                fk.on_delete.sql()
            ));
        }
        sql
    }
}

/// How the create path obtains a primary key value.
#[derive(Clone)]
pub enum IdStrategy {
    /// Synthesised by a generator; caller-supplied values are replaced.
    Generated(Arc<dyn IdGenerator>),
    /// Integer rowid assigned by the store.
    StoreAssigned,
    /// The caller must provide the key.
    CallerSupplied,
}

impl IdStrategy {
    pub fn uuid() -> Self {
        IdStrategy::Generated(Arc::new(UuidGenerator))
    }

    pub fn snowflake(shard_id: u16) -> AppResult<Self> {
        Ok(IdStrategy::Generated(Arc::new(SnowflakeIdGenerator::new(
            shard_id,
        )?)))
    }
}

impl fmt::Debug for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdStrategy::Generated(_) => write!(f, "Generated"),
            IdStrategy::StoreAssigned => write!(f, "StoreAssigned"),
            IdStrategy::CallerSupplied => write!(f, "CallerSupplied"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrimaryKey {
    pub column: String,
    pub strategy: IdStrategy,
}

/// Index definition
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(name: &str, columns: Vec<&str>) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.into_iter().map(|s| s.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn create_statement(&self, table: &str) -> Statement {
        let columns = self
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        Statement::new(
            "create_index",
            format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                if self.unique { "UNIQUE " } else { "" },
                quote(&self.name),
                quote(table),
                columns
            ),
        )
    }
}

/// An entity's backing table: ordered columns plus a designated primary key.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    name: String,
    columns: Vec<ColumnDefinition>,
    primary_key: PrimaryKey,
    indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    /// Start a table whose first column is the primary key.
    pub fn new(name: &str, key: ColumnDefinition, strategy: IdStrategy) -> Self {
        let primary_key = PrimaryKey {
            column: key.name.clone(),
            strategy,
        };
        Self {
            name: name.to_string(),
            columns: vec![key.not_null()],
            primary_key,
            indexes: Vec::new(),
        }
    }

    /// Add a column, replacing any existing column with the same name.
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    pub fn columns(self, columns: impl IntoIterator<Item = ColumnDefinition>) -> Self {
        columns.into_iter().fold(self, |table, column| table.column(column))
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn primary_key_column(&self) -> &ColumnDefinition {
        // The key column is always the first one.
        &self.columns[0]
    }

    pub fn column_definitions(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    /// Parameter for `value` bound against `column`.
    pub fn param_for(&self, column: &str, value: &Value) -> AppResult<SqlParam> {
        let definition = self.get_column(column).ok_or_else(|| {
            AppError::ConfigurationError(format!("Table {} has no column {}", self.name, column))
        })?;
        definition.column_type.to_param(value)
    }

    /// Shape a caller-supplied row for insertion: keep known columns,
    /// synthesise the primary key, fill server-assigned and default values.
    pub fn prepare_insert(&self, mut values: Row) -> AppResult<Row> {
        let mut row = Row::new();
        for column in &self.columns {
            let is_key = column.name == self.primary_key.column;
            let value = if is_key {
                match &self.primary_key.strategy {
                    IdStrategy::Generated(generator) => Some(generator.next_value()?),
                    IdStrategy::StoreAssigned => None,
                    IdStrategy::CallerSupplied => {
                        let supplied = values.remove(&column.name).filter(|v| !v.is_null());
                        if supplied.is_none() {
                            return Err(AppError::validation(
                                column.name.as_str(),
                                "Primary key must be supplied",
                            ));
                        }
                        supplied
                    }
                }
            } else if let Some(server_default) = &column.server_default {
                Some(server_default.produce())
            } else {
                // An explicit null on a defaulted column means "use the default".
                match values.remove(&column.name) {
                    Some(Value::Null) if column.default.is_some() => column.default.clone(),
                    Some(value) => Some(value),
                    None => column.default.clone(),
                }
            };

            if let Some(value) = value {
                row.insert(column.name.clone(), value);
            }
        }
        Ok(row)
    }

    /// Shape an update: only caller-writable columns that were provided.
    /// The primary key and server-assigned columns are never updated.
    pub fn prepare_update(&self, mut values: Row) -> Row {
        let mut row = Row::new();
        for column in &self.columns {
            if column.name == self.primary_key.column || column.is_server_assigned() {
                continue;
            }
            if let Some(value) = values.remove(&column.name) {
                row.insert(column.name.clone(), value);
            }
        }
        row
    }

    /// `CREATE TABLE IF NOT EXISTS` plus index statements.
    pub fn create_statements(&self) -> Vec<Statement> {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let key = (column.name == self.primary_key.column)
                    .then_some(&self.primary_key.strategy);
                column.column_sql(key)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut statements = vec![Statement::new(
            "create_table",
            format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(&self.name), columns),
        )];
        statements.extend(self.indexes.iter().map(|i| i.create_statement(&self.name)));
        statements
    }
}
