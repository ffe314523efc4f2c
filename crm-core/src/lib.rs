//! CRM Core - Entity Types and Ordering
//!
//! Identity newtypes, pipeline entities, partition keys, the error taxonomy
//! and the pure fractional-index calculator. Every other crate depends on
//! this one. Nothing here performs I/O.

pub mod entities;
pub mod error;
pub mod identity;
pub mod ordering;
pub mod partition;

pub use entities::{EntityType, Opportunity, OrderableItem, PipelineStage};
pub use error::{ConfigError, CrmError, CrmResult, ReorderError, StorageError, ValidationError};
pub use identity::{CompanyId, ContactId, EntityIdType, OpportunityId, StageId, TenantId, Timestamp};
pub use ordering::{
    append_position, calculate_position, is_strictly_between, place_between, rebalance_plan,
    Neighbors, Placement, Position, APPEND_STEP, EDGE_OFFSET, FIRST_POSITION,
};
pub use partition::PartitionKey;
