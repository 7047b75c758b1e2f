// Reusable column groups shared by several entities

use crate::core::{EntityId, UserId};
use crate::ent_framework::schema::Overrides;
use crate::ent_framework::table::{ColumnDefinition, ServerDefault};

/// `created_at`: assigned on insert, never caller-writable.
pub struct CreatedAtPattern;

impl CreatedAtPattern {
    pub const COLUMN: &'static str = "created_at";

    pub fn for_table() -> ColumnDefinition {
        ColumnDefinition::timestamp(Self::COLUMN)
            .not_null()
            .server_default(ServerDefault::Now)
    }
}

/// `created_by_user_id`: the acting user, supplied by the caller's session.
pub struct CreatedByUserPattern;

impl CreatedByUserPattern {
    pub const COLUMN: &'static str = "created_by_user_id";

    pub fn for_table() -> ColumnDefinition {
        ColumnDefinition::text(Self::COLUMN).not_null()
    }

    pub fn for_schema(overrides: Overrides) -> Overrides {
        overrides.field(Self::COLUMN, |rule| {
            rule.brand(UserId::BRAND).non_empty("User is required")
        })
    }
}
