use crate::activity::{Activity, ActivityPatch, ActivityState, Fields};
use crate::constants::{MOVE_MODEL, PATIENT_MODEL};
use crate::engine::ActivityEngine;
use crate::fields::{fields, read_id};
use crate::registry::ActivityDataType;
use crate::store::{ActivityQuery, QueryOrder};
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, LocationId, UserId};
use serde_json::Value;

/// Transfer of a patient to a destination location.
#[derive(Clone, Copy, Debug, Default)]
pub struct Move;

impl Move {
    fn destination(record: &Fields) -> CoreResult<Option<LocationId>> {
        read_id(record, "location_id")
    }
}

impl ActivityDataType for Move {
    fn name(&self) -> &str {
        MOVE_MODEL
    }

    fn description(&self) -> &str {
        "Patient Move"
    }

    fn prepare_complete(&self, engine: &ActivityEngine, activity: &Activity) -> CoreResult<()> {
        let record = engine.data_record(activity)?.unwrap_or_default();
        if Self::destination(&record)?.is_none() {
            return Err(CoreError::Validation("there is no destination location".into()));
        }
        Ok(())
    }

    /// Attach the move to the patient's started spell when it has no parent yet.
    fn on_submit(
        &self,
        engine: &mut ActivityEngine,
        uid: UserId,
        activity_id: ActivityId,
        values: &Fields,
    ) -> CoreResult<()> {
        let activity = engine.activity(activity_id)?;
        if activity.parent_id.is_some() {
            return Ok(());
        }
        let Some(patient_id) = read_id(values, "patient_id")? else {
            return Ok(());
        };
        if let Some(spell) = engine.get_spell_activity(patient_id)? {
            let patch = ActivityPatch {
                parent_id: Some(spell.id),
                ..ActivityPatch::default()
            };
            engine.write(uid, activity_id, patch)?;
        }
        Ok(())
    }

    fn on_complete(
        &self,
        engine: &mut ActivityEngine,
        _uid: UserId,
        activity_id: ActivityId,
    ) -> CoreResult<()> {
        let activity = engine.activity(activity_id)?;
        let Some(data_ref) = activity.data_ref.clone() else {
            return Err(CoreError::Validation("there is no destination location".into()));
        };
        let record = engine.store().read_record(&data_ref.model, data_ref.id)?;
        let destination = Self::destination(&record)?
            .ok_or_else(|| CoreError::Validation("there is no destination location".into()))?;
        let Some(patient_id) = engine.patient_id_of(&activity, Some(&record))? else {
            return Err(CoreError::Validation("patient_id is required for a move".into()));
        };
        let superuser = engine.config().superuser_id();

        let previous = ActivityQuery::new()
            .data_model(MOVE_MODEL)
            .states(&[ActivityState::Completed])
            .patient(patient_id)
            .excluding(activity_id)
            .order(QueryOrder::SequenceDesc);
        if let Some(previous_id) = engine.search(&previous)?.first() {
            let previous = engine.activity(*previous_id)?;
            let from = engine
                .data_record(&previous)?
                .map(|record| read_id::<LocationId>(&record, "location_id"))
                .transpose()?
                .flatten();
            if let Some(from) = from {
                engine.store_mut().write_record(
                    &data_ref.model,
                    data_ref.id,
                    &fields([("from_location_id", Value::from(from.get()))]),
                )?;
            }
        }

        engine.store_mut().write_record(
            PATIENT_MODEL,
            patient_id,
            &fields([("current_location_id", Value::from(destination.get()))]),
        )?;

        if let Some(parent_id) = activity.parent_id {
            engine.submit(
                superuser,
                parent_id,
                Value::Object(fields([("location_id", Value::from(destination.get()))])),
            )?;
        }
        tracing::debug!("patient {} moved to location {}", patient_id, destination);
        Ok(())
    }
}
