//! # Careflow Core
//!
//! Workflow engine for hospital activities.
//!
//! An activity is one occurrence of a clinical or administrative event (an admission, a move, an
//! observation). Every activity carries the same envelope and moves through the same lifecycle:
//! `new`, `scheduled`, `started`, then `completed` or `cancelled`. Which actions are legal in
//! which state, and what else happens around them, is decided per registered data type.
//!
//! This crate contains:
//! - the activity envelope and lifecycle types ([`activity`])
//! - per-type transition tables ([`transitions`]) and the type registry ([`registry`])
//! - the engine running lifecycle operations ([`ActivityEngine`])
//! - policy triggers that cascade follow-up activities on completion ([`policy`])
//! - lineage queries over the business and creation hierarchies
//! - storage traits with an in-memory backend ([`store`])
//! - a small set of clinical data types ([`clinical`])
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and
//! `careflow-cli`.

pub mod activity;
pub mod clinical;
pub mod config;
pub mod constants;
pub mod datetime;
pub mod directory;
pub mod engine;
pub mod error;
pub mod fields;
mod lineage;
pub mod policy;
pub mod registry;
pub mod store;
pub mod transitions;

pub use activity::{Action, Activity, ActivityPatch, ActivityState, DataRef, Fields, NewActivity};
pub use config::CoreConfig;
pub use datetime::ScheduleDate;
pub use directory::{Directory, LocationUsage, MemoryDirectory};
pub use engine::ActivityEngine;
pub use error::{CoreError, CoreResult};
pub use policy::{PolicyTrigger, TriggerAction};
pub use registry::{ActivityDataType, SimpleDataType, TypeRegistry};
pub use store::{ActivityQuery, MemoryStore, Store};
pub use transitions::{TransitionTable, DEFAULT_TRANSITIONS};

pub use careflow_types::{ActivityId, LocationId, RecordId, TypesError, UserId};
