//! The activity engine.
//!
//! [`ActivityEngine`] owns the store and runs every lifecycle operation. Each operation follows
//! the same shape:
//!
//! 1. load the activity and resolve its data type,
//! 2. check the action against the type's transition table,
//! 3. run the type's `prepare_*` hook where one exists,
//! 4. perform the generic bookkeeping (state, timestamps, sequence, audit),
//! 5. run the type's `on_*` hook, which may call back into the engine.
//!
//! Completion additionally evaluates the type's policy once the hook has returned.

use crate::activity::{Action, Activity, ActivityPatch, ActivityState, DataRef, Fields, NewActivity};
use crate::config::CoreConfig;
use crate::constants::PATIENT_MODEL;
use crate::datetime::ScheduleDate;
use crate::directory::Directory;
use crate::fields::read_id;
use crate::registry::{ActivityDataType, TypeRegistry};
use crate::store::{ActivityQuery, Store};
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, LocationId, RecordId, UserId};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Runs lifecycle operations against a [`Store`].
pub struct ActivityEngine {
    cfg: Arc<CoreConfig>,
    registry: Arc<TypeRegistry>,
    directory: Arc<dyn Directory>,
    store: Box<dyn Store>,
}

impl ActivityEngine {
    pub fn new(
        cfg: Arc<CoreConfig>,
        registry: Arc<TypeRegistry>,
        directory: Arc<dyn Directory>,
        store: Box<dyn Store>,
    ) -> Self {
        Self {
            cfg,
            registry,
            directory,
            store,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn Store {
        self.store.as_mut()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch an activity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the id is unknown.
    pub fn activity(&self, id: ActivityId) -> CoreResult<Activity> {
        self.store.activity(id)
    }

    pub fn search(&self, query: &ActivityQuery) -> CoreResult<Vec<ActivityId>> {
        self.store.search_activities(query)
    }

    pub fn data_type(&self, activity: &Activity) -> CoreResult<Arc<dyn ActivityDataType>> {
        self.registry.get(&activity.data_model)
    }

    /// The data record bound to `activity`, if one has been submitted.
    pub fn data_record(&self, activity: &Activity) -> CoreResult<Option<Fields>> {
        activity
            .data_ref
            .as_ref()
            .map(|data_ref| self.store.read_record(&data_ref.model, data_ref.id))
            .transpose()
    }

    /// Patient the activity concerns, preferring the data record over the envelope.
    pub fn patient_id_of(
        &self,
        activity: &Activity,
        record: Option<&Fields>,
    ) -> CoreResult<Option<RecordId>> {
        let from_record = match record {
            Some(record) => read_id(record, "patient_id")?,
            None => None,
        };
        Ok(from_record.or(activity.patient_id))
    }

    /// Location derived for an activity when no type-specific rule applies.
    ///
    /// The first of these that is set wins: the record's `location_id`, the patient's
    /// current location, the location of the patient's started spell, the parent's location.
    pub fn default_location_id(
        &self,
        activity: &Activity,
        record: Option<&Fields>,
    ) -> CoreResult<Option<LocationId>> {
        if let Some(record) = record {
            if let Some(location_id) = read_id(record, "location_id")? {
                return Ok(Some(location_id));
            }
        }

        if let Some(patient_id) = self.patient_id_of(activity, record)? {
            match self.store.read_record(PATIENT_MODEL, patient_id) {
                Ok(patient) => {
                    if let Some(location_id) = read_id(&patient, "current_location_id")? {
                        return Ok(Some(location_id));
                    }
                }
                Err(CoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }

            if let Some(spell) = self.get_spell_activity(patient_id)? {
                if spell.id != activity.id && spell.location_id.is_some() {
                    return Ok(spell.location_id);
                }
            }
        }

        match activity.parent_id {
            Some(parent_id) => Ok(self.activity(parent_id)?.location_id),
            None => Ok(None),
        }
    }

    fn visible_user_ids(&self, activity: &Activity) -> CoreResult<BTreeSet<UserId>> {
        let data_type = self.data_type(activity)?;
        Ok(data_type.visible_user_ids(self.directory.as_ref(), activity))
    }

    // ========================================================================
    // Generic writes
    // ========================================================================

    /// Create an activity in state `new`.
    ///
    /// The summary defaults to the type's description. Parent and creator must exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a blank `data_model`, [`CoreError::UnknownType`]
    /// if it is not registered, and [`CoreError::NotFound`] for a dangling parent or creator.
    pub fn create(&mut self, uid: UserId, new: NewActivity) -> CoreResult<ActivityId> {
        if new.data_model.trim().is_empty() {
            return Err(CoreError::Validation(
                "data_model is required to create an activity".into(),
            ));
        }
        let data_type = self.registry.get(&new.data_model)?;
        for linked in [new.parent_id, new.creator_id].into_iter().flatten() {
            self.store.activity(linked)?;
        }

        let summary = new
            .summary
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or_else(|| data_type.description().to_owned());
        let now = Utc::now();
        let id = self.store.next_activity_id()?;

        let mut activity = Activity {
            id,
            summary,
            state: ActivityState::New,
            notes: new.notes,
            parent_id: new.parent_id,
            creator_id: new.creator_id,
            data_model: new.data_model,
            data_ref: None,
            user_id: None,
            user_ids: BTreeSet::new(),
            assign_locked: false,
            patient_id: new.patient_id,
            location_id: new.location_id,
            pos_id: new.pos_id,
            spell_activity_id: None,
            cancel_reason_id: None,
            ward_manager_id: None,
            date_planned: new.date_planned,
            date_scheduled: new.date_scheduled,
            date_started: None,
            date_terminated: None,
            date_deadline: new.date_deadline,
            date_expiry: new.date_expiry,
            create_date: now,
            write_date: now,
            create_uid: uid,
            write_uid: uid,
            terminate_uid: None,
            sequence: None,
        };
        activity.user_ids = data_type.visible_user_ids(self.directory.as_ref(), &activity);

        tracing::debug!("created activity {} of type {}", id, activity.data_model);
        self.store.insert_activity(activity)?;
        Ok(id)
    }

    /// Write a patch to an activity.
    ///
    /// A state change stamps the next `sequence` value. A location or patient change
    /// recomputes `user_ids`. Every write stamps `write_date` and `write_uid`.
    pub fn write(&mut self, uid: UserId, id: ActivityId, mut patch: ActivityPatch) -> CoreResult<()> {
        if patch.state.is_some() {
            patch.sequence = Some(self.store.max_sequence()? + 1);
        }
        if patch.location_id.is_some() || patch.patient_id.is_some() {
            let mut preview = self.activity(id)?;
            preview.apply(&patch);
            patch.user_ids = Some(self.visible_user_ids(&preview)?);
        }
        patch.write_uid = Some(uid);
        patch.write_date = Some(Utc::now());
        self.store.update_activity(id, &patch)
    }

    /// Create an activity of `data_model` and submit `data` to it when non-empty.
    pub fn create_activity(
        &mut self,
        uid: UserId,
        data_model: &str,
        mut new: NewActivity,
        data: Fields,
    ) -> CoreResult<ActivityId> {
        new.data_model = data_model.to_owned();
        let id = self.create(uid, new)?;
        if !data.is_empty() {
            self.submit(uid, id, Value::Object(data))?;
        }
        Ok(id)
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Create or update the activity's data record.
    ///
    /// The first submit creates the record and binds it as `data_ref`; later submits merge into
    /// the same record. The envelope is then refreshed from the record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `values` is not a JSON object and
    /// [`CoreError::Transition`] if the current state does not allow submitting.
    pub fn submit(&mut self, uid: UserId, id: ActivityId, values: Value) -> CoreResult<()> {
        let mut values = match values {
            Value::Object(values) => values,
            other => {
                return Err(CoreError::Validation(format!(
                    "submitted values must be an object, found to be {other}"
                )));
            }
        };

        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Submit)?;
        data_type.prepare_submit(self, &activity, &mut values)?;

        match &activity.data_ref {
            None => {
                let mut record = values.clone();
                record.insert("activity_id".into(), Value::from(id.get()));
                let record_id = self.store.create_record(&activity.data_model, record)?;
                let patch = ActivityPatch {
                    data_ref: Some(DataRef::new(activity.data_model.clone(), record_id)),
                    ..ActivityPatch::default()
                };
                self.write(uid, id, patch)?;
            }
            Some(data_ref) => {
                self.store.write_record(&data_ref.model, data_ref.id, &values)?;
            }
        }
        tracing::debug!("submitted data to activity {}", id);

        self.update_activity(self.cfg.superuser_id(), id)?;
        data_type.on_submit(self, uid, id, &values)
    }

    /// Refresh the envelope's patient, location, point of service and spell from the data
    /// record, and recompute `user_ids`.
    pub fn update_activity(&mut self, uid: UserId, id: ActivityId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        let record = self.data_record(&activity)?;

        let patient_id = self.patient_id_of(&activity, record.as_ref())?;
        let location_id = data_type.activity_location_id(self, &activity, record.as_ref())?;
        let spell = match patient_id {
            Some(patient_id) => self.get_spell_activity(patient_id)?,
            None => None,
        };
        let record_pos_id = match &record {
            Some(record) => read_id(record, "pos_id")?,
            None => None,
        };
        let pos_id = record_pos_id
            .or_else(|| spell.as_ref().and_then(|spell| spell.pos_id))
            .or(activity.pos_id);

        let patch = ActivityPatch {
            patient_id: Some(patient_id),
            location_id: Some(location_id),
            pos_id: Some(pos_id),
            spell_activity_id: Some(spell.map(|spell| spell.id)),
            ..ActivityPatch::default()
        };
        self.write(uid, id, patch)?;
        data_type.on_update(self, uid, id)
    }

    /// Move the activity to `scheduled`.
    ///
    /// `date` overrides the activity's existing `date_scheduled`; text dates are parsed first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DateFormat`] for an unparseable date, [`CoreError::Transition`] if
    /// scheduling is not allowed, and [`CoreError::Validation`] if no date is known at all.
    pub fn schedule(
        &mut self,
        uid: UserId,
        id: ActivityId,
        date: Option<ScheduleDate>,
    ) -> CoreResult<()> {
        let date = date.map(|date| date.resolve()).transpose()?;
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Schedule)?;

        let date_scheduled = date.or(activity.date_scheduled).ok_or_else(|| {
            CoreError::Validation(
                "schedule date is neither set on the activity nor passed to the operation".into(),
            )
        })?;
        let patch = ActivityPatch {
            date_scheduled: Some(date_scheduled),
            ..ActivityPatch::state(ActivityState::Scheduled)
        };
        self.write(uid, id, patch)?;
        tracing::debug!("activity {} scheduled for {}", id, date_scheduled);

        data_type.on_schedule(self, uid, id)
    }

    /// Assign the activity to `user_id`.
    ///
    /// The first assignment sets `user_id`. Assigning the same user again while the activity is
    /// unlocked sets the lock; once locked, further assignments change nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the activity is already assigned to somebody else.
    pub fn assign(&mut self, uid: UserId, id: ActivityId, user_id: UserId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Assign)?;

        match activity.user_id {
            Some(current) if current != user_id => {
                return Err(CoreError::Conflict(format!(
                    "activity {id} is already assigned to user {current}"
                )));
            }
            Some(_) if activity.assign_locked => {
                tracing::debug!("activity {} is locked to user {}", id, user_id);
            }
            Some(_) => {
                let patch = ActivityPatch {
                    assign_locked: Some(true),
                    ..ActivityPatch::default()
                };
                self.write(uid, id, patch)?;
            }
            None => {
                let patch = ActivityPatch {
                    user_id: Some(Some(user_id)),
                    ..ActivityPatch::default()
                };
                self.write(uid, id, patch)?;
                tracing::debug!("activity {} assigned to user {}", id, user_id);
            }
        }

        data_type.on_assign(self, uid, id)
    }

    /// Release the activity from its assignee. Only the assignee may unassign, and a locked
    /// assignment stays in place.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the activity is not assigned or `uid` is not the
    /// assignee.
    pub fn unassign(&mut self, uid: UserId, id: ActivityId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Unassign)?;

        let Some(current) = activity.user_id else {
            return Err(CoreError::Conflict(format!(
                "activity {id} is not assigned yet"
            )));
        };
        if current != uid {
            return Err(CoreError::Conflict(format!(
                "only the assignee of activity {id} may unassign it"
            )));
        }
        if activity.assign_locked {
            tracing::warn!("activity {} is locked, keeping user {}", id, current);
        } else {
            let patch = ActivityPatch {
                user_id: Some(None),
                ..ActivityPatch::default()
            };
            self.write(uid, id, patch)?;
        }

        data_type.on_unassign(self, uid, id)
    }

    pub fn start(&mut self, uid: UserId, id: ActivityId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Start)?;

        let patch = ActivityPatch {
            date_started: Some(Utc::now()),
            ..ActivityPatch::state(ActivityState::Started)
        };
        self.write(uid, id, patch)?;
        tracing::debug!("activity {} started", id);

        data_type.on_start(self, uid, id)
    }

    /// Complete the activity, then evaluate its type's policy.
    pub fn complete(&mut self, uid: UserId, id: ActivityId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Complete)?;
        data_type.prepare_complete(self, &activity)?;

        self.write(
            uid,
            id,
            ActivityPatch::terminate(ActivityState::Completed, uid, Utc::now()),
        )?;
        self.audit_ward_manager(uid, id)?;
        tracing::debug!("activity {} completed", id);

        data_type.on_complete(self, uid, id)?;

        if !data_type.policy().is_empty() {
            let activity = self.activity(id)?;
            let location_id = data_type.trigger_location(self, &activity)?;
            self.trigger_policy(id, location_id, None)?;
        }
        Ok(())
    }

    /// Cancel the activity. Completed activities may be cancelled too, in which case the
    /// termination stamps are overwritten.
    pub fn cancel(&mut self, uid: UserId, id: ActivityId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let data_type = self.data_type(&activity)?;
        data_type
            .transitions()
            .check(&activity.data_model, activity.state, Action::Cancel)?;

        self.write(
            uid,
            id,
            ActivityPatch::terminate(ActivityState::Cancelled, uid, Utc::now()),
        )?;
        self.audit_ward_manager(uid, id)?;
        tracing::debug!("activity {} cancelled", id);

        data_type.on_cancel(self, uid, id)
    }

    /// Cancel the activity and record why.
    pub fn cancel_with_reason(
        &mut self,
        uid: UserId,
        id: ActivityId,
        reason_id: RecordId,
    ) -> CoreResult<()> {
        self.cancel(uid, id)?;
        let patch = ActivityPatch {
            cancel_reason_id: Some(reason_id),
            ..ActivityPatch::default()
        };
        self.write(uid, id, patch)
    }

    /// Cancel every open activity of `data_model` whose parent is `parent_id`.
    ///
    /// Returns the cancelled ids.
    pub fn cancel_open_activities(
        &mut self,
        uid: UserId,
        parent_id: ActivityId,
        data_model: &str,
        reason_id: Option<RecordId>,
    ) -> CoreResult<Vec<ActivityId>> {
        let query = ActivityQuery::new()
            .data_model(data_model)
            .parent(parent_id)
            .open();
        let ids = self.store.search_activities(&query)?;
        for id in &ids {
            match reason_id {
                Some(reason_id) => self.cancel_with_reason(uid, *id, reason_id)?,
                None => self.cancel(uid, *id)?,
            }
        }
        Ok(ids)
    }

    /// Record the manager of the ward the activity is located in.
    fn audit_ward_manager(&mut self, uid: UserId, id: ActivityId) -> CoreResult<()> {
        let activity = self.activity(id)?;
        let ward_manager_id = activity
            .location_id
            .and_then(|location_id| self.directory.ward_manager_id(location_id));
        if let Some(ward_manager_id) = ward_manager_id {
            let patch = ActivityPatch {
                ward_manager_id: Some(ward_manager_id),
                ..ActivityPatch::default()
            };
            self.write(uid, id, patch)?;
        }
        Ok(())
    }
}
