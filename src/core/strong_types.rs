// Strong Types - branded identifiers per entity
// Each entity gets its own id newtype so a MessageId can never be passed where
// a SystemElementId is expected, without any runtime tagging.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::infrastructure::database::RowKey;

/// Behaviour shared by every branded entity identifier.
pub trait EntityId:
    Debug + Display + Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Brand tag carried by the id field's schema rule.
    const BRAND: &'static str;

    /// Store-side representation used when binding statement parameters.
    fn to_value(&self) -> Value;

    /// Hashable key used to group batch-loaded relation rows.
    fn key(&self) -> RowKey;
}

/// Declare a branded identifier newtype.
///
/// `define_entity_id!(SystemElementId, "SystemElementID", String)` creates a
/// text id; `define_entity_id!(ImageId, "ImageID", i64)` a numeric one.
#[macro_export]
macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $brand:literal, String) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl $crate::core::strong_types::EntityId for $name {
            const BRAND: &'static str = $brand;

            fn to_value(&self) -> serde_json::Value {
                serde_json::Value::String(self.0.clone())
            }

            fn key(&self) -> $crate::infrastructure::database::RowKey {
                $crate::infrastructure::database::RowKey::Text(self.0.clone())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
    ($(#[$meta:meta])* $name:ident, $brand:literal, i64) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl $crate::core::strong_types::EntityId for $name {
            const BRAND: &'static str = $brand;

            fn to_value(&self) -> serde_json::Value {
                serde_json::Value::from(self.0)
            }

            fn key(&self) -> $crate::infrastructure::database::RowKey {
                $crate::infrastructure::database::RowKey::Integer(self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

define_entity_id!(
    /// Identity of the acting user, resolved by the caller's session layer.
    UserId,
    "UserID",
    String
);

#[cfg(test)]
mod tests {
    use super::*;

    define_entity_id!(WidgetId, "WidgetID", String);
    define_entity_id!(CounterId, "CounterID", i64);

    #[test]
    fn test_text_id_is_transparent() {
        let id = WidgetId::new("abc");
        assert_eq!(serde_json::to_value(&id).unwrap(), Value::String("abc".into()));
        assert_eq!(id.key(), RowKey::Text("abc".into()));
        assert_eq!(WidgetId::BRAND, "WidgetID");

        let parsed: WidgetId = serde_json::from_value(Value::String("xyz".into())).unwrap();
        assert_eq!(parsed.as_str(), "xyz");
    }

    #[test]
    fn test_numeric_id_is_transparent() {
        let id = CounterId::new(42);
        assert_eq!(id.to_value(), Value::from(42));
        assert_eq!(id.key(), RowKey::Integer(42));
        assert_eq!(id.to_string(), "42");
    }
}
