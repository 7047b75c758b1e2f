// Domain-Driven Organization - entities grouped by feature

pub mod design_tool;
pub mod messaging;

use crate::error::AppResult;
use crate::infrastructure::database::Database;

/// Bootstrap every domain's tables.
pub async fn ensure_all_tables(db: &Database) -> AppResult<()> {
    design_tool::ensure_tables(db).await?;
    messaging::ensure_tables(db).await
}
