//! The activity envelope.
//!
//! An [`Activity`] records one occurrence of a clinical or administrative event. It owns the
//! lifecycle state, both hierarchies (business parent/child and creation lineage), the
//! assignment, the audit timestamps and the `sequence` order witness. The type-specific
//! payload lives in a separate data record referenced through [`DataRef`].

use careflow_types::{ActivityId, LocationId, RecordId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Field map carried by data records and submit payloads.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Lifecycle state shared by every activity type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    New,
    Scheduled,
    Started,
    Completed,
    Cancelled,
}

impl ActivityState {
    pub const ALL: [ActivityState; 5] = [
        ActivityState::New,
        ActivityState::Scheduled,
        ActivityState::Started,
        ActivityState::Completed,
        ActivityState::Cancelled,
    ];

    /// States an open activity can no longer leave by normal progress.
    pub const TERMINAL: [ActivityState; 2] = [ActivityState::Completed, ActivityState::Cancelled];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityState::New => "new",
            ActivityState::Scheduled => "scheduled",
            ActivityState::Started => "started",
            ActivityState::Completed => "completed",
            ActivityState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle action gated by a transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Schedule,
    Start,
    Complete,
    Cancel,
    Submit,
    Assign,
    Unassign,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Schedule,
        Action::Start,
        Action::Complete,
        Action::Cancel,
        Action::Submit,
        Action::Assign,
        Action::Unassign,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Schedule => "schedule",
            Action::Start => "start",
            Action::Complete => "complete",
            Action::Cancel => "cancel",
            Action::Submit => "submit",
            Action::Assign => "assign",
            Action::Unassign => "unassign",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// Polymorphic reference to the data record bound to an activity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataRef {
    pub model: String,
    pub id: RecordId,
}

impl DataRef {
    pub fn new(model: impl Into<String>, id: RecordId) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.model, self.id)
    }
}

/// The activity envelope as persisted by an [`crate::store::ActivityStore`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Activity {
    pub id: ActivityId,
    pub summary: String,
    pub state: ActivityState,
    pub notes: Option<String>,

    /// Business hierarchy.
    pub parent_id: Option<ActivityId>,
    /// Evolution hierarchy. Fixed at creation.
    pub creator_id: Option<ActivityId>,

    pub data_model: String,
    pub data_ref: Option<DataRef>,

    pub user_id: Option<UserId>,
    pub user_ids: BTreeSet<UserId>,
    pub assign_locked: bool,

    pub patient_id: Option<RecordId>,
    pub location_id: Option<LocationId>,
    pub pos_id: Option<RecordId>,
    pub spell_activity_id: Option<ActivityId>,
    pub cancel_reason_id: Option<RecordId>,
    pub ward_manager_id: Option<UserId>,

    pub date_planned: Option<DateTime<Utc>>,
    pub date_scheduled: Option<DateTime<Utc>>,
    pub date_started: Option<DateTime<Utc>>,
    pub date_terminated: Option<DateTime<Utc>>,
    pub date_deadline: Option<DateTime<Utc>>,
    pub date_expiry: Option<DateTime<Utc>>,

    pub create_date: DateTime<Utc>,
    pub write_date: DateTime<Utc>,
    pub create_uid: UserId,
    pub write_uid: UserId,
    pub terminate_uid: Option<UserId>,

    /// State switch sequence. `None` until the first state-changing write.
    pub sequence: Option<u64>,
}

impl Activity {
    /// Apply a patch in place. Stores call this so every backend interprets a patch the same way.
    pub fn apply(&mut self, patch: &ActivityPatch) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut self.summary, &patch.summary);
        set(&mut self.state, &patch.state);
        if patch.sequence.is_some() {
            self.sequence = patch.sequence;
        }
        set(&mut self.notes, &patch.notes.clone().map(Some));
        set(&mut self.parent_id, &patch.parent_id.map(Some));
        set(&mut self.data_ref, &patch.data_ref.clone().map(Some));
        set(&mut self.user_id, &patch.user_id);
        set(&mut self.user_ids, &patch.user_ids);
        set(&mut self.assign_locked, &patch.assign_locked);
        set(&mut self.patient_id, &patch.patient_id);
        set(&mut self.location_id, &patch.location_id);
        set(&mut self.pos_id, &patch.pos_id);
        set(&mut self.spell_activity_id, &patch.spell_activity_id);
        set(&mut self.cancel_reason_id, &patch.cancel_reason_id.map(Some));
        set(&mut self.ward_manager_id, &patch.ward_manager_id.map(Some));
        set(&mut self.date_scheduled, &patch.date_scheduled.map(Some));
        set(&mut self.date_started, &patch.date_started.map(Some));
        set(&mut self.date_terminated, &patch.date_terminated.map(Some));
        set(&mut self.date_deadline, &patch.date_deadline.map(Some));
        set(&mut self.date_expiry, &patch.date_expiry.map(Some));
        set(&mut self.terminate_uid, &patch.terminate_uid.map(Some));
        set(&mut self.write_date, &patch.write_date);
        set(&mut self.write_uid, &patch.write_uid);
    }
}

/// Caller-supplied fields for a new activity.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewActivity {
    pub data_model: String,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub parent_id: Option<ActivityId>,
    pub creator_id: Option<ActivityId>,
    pub patient_id: Option<RecordId>,
    pub location_id: Option<LocationId>,
    pub pos_id: Option<RecordId>,
    pub date_planned: Option<DateTime<Utc>>,
    pub date_scheduled: Option<DateTime<Utc>>,
    pub date_deadline: Option<DateTime<Utc>>,
    pub date_expiry: Option<DateTime<Utc>>,
}

impl NewActivity {
    pub fn of(data_model: impl Into<String>) -> Self {
        Self {
            data_model: data_model.into(),
            ..Self::default()
        }
    }

    pub fn parent(mut self, parent_id: ActivityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn creator(mut self, creator_id: ActivityId) -> Self {
        self.creator_id = Some(creator_id);
        self
    }

    pub fn patient(mut self, patient_id: RecordId) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }
}

/// A partial update of an activity.
///
/// `None` leaves a field untouched. Fields that may be cleared use a nested `Option`:
/// `Some(None)` clears the value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityPatch {
    pub summary: Option<String>,
    pub state: Option<ActivityState>,
    /// Set by the engine whenever `state` is present.
    pub sequence: Option<u64>,
    pub notes: Option<String>,
    pub parent_id: Option<ActivityId>,
    pub data_ref: Option<DataRef>,
    pub user_id: Option<Option<UserId>>,
    pub user_ids: Option<BTreeSet<UserId>>,
    pub assign_locked: Option<bool>,
    pub patient_id: Option<Option<RecordId>>,
    pub location_id: Option<Option<LocationId>>,
    pub pos_id: Option<Option<RecordId>>,
    pub spell_activity_id: Option<Option<ActivityId>>,
    pub cancel_reason_id: Option<RecordId>,
    pub ward_manager_id: Option<UserId>,
    pub date_scheduled: Option<DateTime<Utc>>,
    pub date_started: Option<DateTime<Utc>>,
    pub date_terminated: Option<DateTime<Utc>>,
    pub date_deadline: Option<DateTime<Utc>>,
    pub date_expiry: Option<DateTime<Utc>>,
    pub terminate_uid: Option<UserId>,
    pub write_date: Option<DateTime<Utc>>,
    pub write_uid: Option<UserId>,
}

impl ActivityPatch {
    /// Patch that moves an activity into `state`.
    pub fn state(state: ActivityState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Patch that closes an activity in a terminal `state`.
    pub fn terminate(state: ActivityState, uid: UserId, at: DateTime<Utc>) -> Self {
        Self {
            state: Some(state),
            terminate_uid: Some(uid),
            date_terminated: Some(at),
            ..Self::default()
        }
    }
}
