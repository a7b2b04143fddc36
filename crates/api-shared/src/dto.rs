//! Request and response bodies.
//!
//! Identifiers travel as plain integers and are validated by the API layer before they reach
//! the engine. Timestamps are RFC 3339 strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Error category, e.g. `transition` or `not_found`.
    pub kind: String,
    pub message: String,
}

/// A registered activity data type.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DataTypeRes {
    pub name: String,
    pub description: String,
    /// Allowed actions keyed by state.
    pub transitions: BTreeMap<String, Vec<String>>,
    /// Target types of the policy triggers, in evaluation order.
    pub policy: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListDataTypesRes {
    pub types: Vec<DataTypeRes>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateActivityReq {
    pub data_model: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub location_id: Option<i64>,
    /// Submitted to the new activity when present and non-empty.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DataRefRes {
    pub model: String,
    pub id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityRes {
    pub id: u64,
    pub summary: String,
    pub state: String,
    pub data_model: String,
    pub data_ref: Option<DataRefRes>,
    pub parent_id: Option<u64>,
    pub creator_id: Option<u64>,
    pub user_id: Option<u64>,
    pub user_ids: Vec<u64>,
    pub assign_locked: bool,
    pub patient_id: Option<u64>,
    pub location_id: Option<u64>,
    pub spell_activity_id: Option<u64>,
    pub sequence: Option<u64>,
    pub date_scheduled: Option<String>,
    pub date_started: Option<String>,
    pub date_terminated: Option<String>,
    pub terminate_uid: Option<u64>,
    pub create_date: String,
    pub write_date: String,
    /// Fields of the bound data record.
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitReq {
    #[schema(value_type = Object)]
    pub values: Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ScheduleReq {
    /// RFC 3339 instant or `YYYY-MM-DD[ HH[:MM[:SS]]]` in UTC. Defaults to the activity's
    /// stored schedule date.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignReq {
    pub user_id: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CancelReq {
    #[serde(default)]
    pub reason_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityIdsRes {
    pub ids: Vec<u64>,
}
