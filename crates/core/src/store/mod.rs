//! Persistence seams.
//!
//! The engine talks to storage through two traits: [`ActivityStore`] for activity envelopes and
//! [`RecordStore`] for the typed data records they reference. Any backend that implements both
//! (and is `Send`) is a [`Store`]. The crate ships [`MemoryStore`].

mod memory;
mod query;

pub use memory::MemoryStore;
pub use query::{ActivityQuery, Condition, Domain, Operator, QueryOrder, StateFilter};

use crate::activity::{Activity, ActivityPatch, Fields};
use crate::CoreResult;
use careflow_types::{ActivityId, RecordId};

/// Persistence of activity envelopes.
pub trait ActivityStore {
    /// Reserve the identifier for the next inserted activity.
    fn next_activity_id(&mut self) -> CoreResult<ActivityId>;

    /// Persist a new activity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Conflict`] if the id or data reference is already taken.
    fn insert_activity(&mut self, activity: Activity) -> CoreResult<()>;

    /// Fetch an activity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] if no activity has this id.
    fn activity(&self, id: ActivityId) -> CoreResult<Activity>;

    /// Apply a patch to an existing activity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] for an unknown id and
    /// [`crate::CoreError::Conflict`] if the patch would bind a data reference already bound to
    /// another activity.
    fn update_activity(&mut self, id: ActivityId, patch: &ActivityPatch) -> CoreResult<()>;

    /// Ids of the activities matching `query`, in the query's order.
    fn search_activities(&self, query: &ActivityQuery) -> CoreResult<Vec<ActivityId>>;

    /// Highest `sequence` across all activities, zero when none has switched state yet.
    ///
    /// The engine stamps `max_sequence() + 1` on every state change. Shared backends must
    /// serialise that read with the following update (for example `SELECT ... FOR UPDATE`) so
    /// two writers never stamp the same value.
    fn max_sequence(&self) -> CoreResult<u64>;
}

/// Persistence of typed data records, addressed by model name and record id.
pub trait RecordStore {
    fn create_record(&mut self, model: &str, fields: Fields) -> CoreResult<RecordId>;

    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] if the record does not exist.
    fn read_record(&self, model: &str, id: RecordId) -> CoreResult<Fields>;

    /// Merge `fields` into an existing record.
    fn write_record(&mut self, model: &str, id: RecordId, fields: &Fields) -> CoreResult<()>;

    fn search_records(&self, model: &str, domain: &Domain) -> CoreResult<Vec<RecordId>>;

    fn browse_records(&self, model: &str, ids: &[RecordId]) -> CoreResult<Vec<(RecordId, Fields)>>;
}

/// A complete storage backend for the engine.
pub trait Store: ActivityStore + RecordStore + Send {}

impl<T> Store for T where T: ActivityStore + RecordStore + Send {}
