//! ClaimScan Core
//!
//! Core types shared across ClaimScan components.
//!
//! This crate provides:
//! - Typed claim cells, date parsing and orderable rule ids
//! - Claim tables with explicit composite row keys
//! - The violation table handed to reporting
//! - Error types and result handling
//! - Structured engine events and the observer trait

pub mod error;
pub mod events;
pub mod table;
pub mod types;

pub use error::{Error, Result, RuleFailure};
pub use events::{EngineEvent, EngineObserver, NoopObserver, ObserverSet, TracingObserver};
pub use table::{
    Claim, ClaimRef, ClaimTable, RowKey, Schema, Violation, ViolationTable, RULE_DESC_COLUMN,
    RULE_ID_COLUMN,
};
pub use types::{parse_date, KeyPart, RuleId, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result, RuleFailure};
    pub use crate::events::{EngineEvent, EngineObserver};
    pub use crate::table::{Claim, ClaimTable, Schema, Violation, ViolationTable};
    pub use crate::types::{RuleId, Value};
}
