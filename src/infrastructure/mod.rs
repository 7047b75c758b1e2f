// Infrastructure - store handle, SQLite binding, decorators and id generation
pub mod database; // Database handle trait, statements, transactions
pub mod database_decorators; // Instrumentation decorator
pub mod id_generator; // Primary key generation
pub mod sqlite_database; // SQLite implementation

pub use database::{
    with_transaction, Database, DatabaseInterface, DatabaseTransaction, Row, RowKey, SqlParam,
    Statement,
};
pub use database_decorators::{InstrumentedDatabase, StatementStats};
pub use id_generator::{IdGenerator, SnowflakeIdGenerator, UuidGenerator};
pub use sqlite_database::{SqliteDatabase, SqliteTransaction};
