// Design tool domain - system elements, their technologies and relations

pub mod system_element;
pub mod system_element_relation;
pub mod system_technology;

pub use system_element::{
    system_element, NewSystemElement, SystemElement, SystemElementId, SystemElementType,
    SystemElementUpdate,
};
pub use system_element_relation::{
    system_element_relation, NewSystemElementRelation, SystemElementRelation,
    SystemElementRelationId,
};
pub use system_technology::{
    system_technology, NewSystemTechnology, SystemTechnology, SystemTechnologyId,
};

use crate::error::AppResult;
use crate::infrastructure::database::Database;

/// Create every design tool table, referenced tables first.
pub async fn ensure_tables(db: &Database) -> AppResult<()> {
    system_technology()?.ensure_tables(db).await?;
    system_element()?.ensure_tables(db).await?;
    system_element_relation()?.ensure_tables(db).await
}
