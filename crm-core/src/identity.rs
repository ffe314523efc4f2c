//! Identity types for CRM entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behavior for typed entity identifiers.
///
/// Every id is a UUIDv7 newtype, so ids sort by creation time and can't be
/// mixed up across entity kinds at compile time.
pub trait EntityIdType:
    Copy + Clone + fmt::Debug + fmt::Display + PartialEq + Eq + std::hash::Hash + Send + Sync + 'static
{
    /// Human readable entity name used in errors and logs.
    const ENTITY_NAME: &'static str;

    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Borrow the raw UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a fresh timestamp-sortable id.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The nil id, useful as a placeholder in tests.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_entity_id!(
    /// Organization owning every ordered list.
    TenantId,
    "tenant"
);
define_entity_id!(
    /// Sales opportunity.
    OpportunityId,
    "opportunity"
);
define_entity_id!(
    /// Pipeline stage (kanban column).
    StageId,
    "pipeline_stage"
);
define_entity_id!(CompanyId, "company");
define_entity_id!(ContactId, "contact");
