//! Classification and merge routing.
//!
//! A record flows through:
//! 1. [`TypeClassifier`] picks its target domain
//! 2. [`FieldMapper`] renames its fields onto the domain schema
//! 3. [`MergePolicy`] decides, per field, whether to write
//! 4. [`RoutingCoordinator`] applies the writes and marks the file
//!
//! All four read the same immutable [`RoutingTables`].

mod classifier;
mod coordinator;
mod mapper;
mod merge;
mod tables;
mod transform;

pub use classifier::TypeClassifier;
pub use coordinator::{CancelFlag, RoutingCoordinator, RunOptions};
pub use mapper::FieldMapper;
pub use merge::{DecisionCounts, Decisions, MergePolicy};
pub use tables::{
    DomainSchema, DomainSpec, FieldAlias, MappingSpec, RoutingTables, SourceSpec, SourceTable,
    TablesFile,
};
pub use transform::{CodeTable, Transform};
