use crate::activity::{Activity, Fields, NewActivity};
use crate::config::CoreConfig;
use crate::constants::{EWS_MODEL, MOVE_MODEL, PLACEMENT_MODEL};
use crate::engine::ActivityEngine;
use crate::fields::{fields, read_id};
use crate::policy::{PolicyTrigger, TriggerAction};
use crate::registry::ActivityDataType;
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, LocationId, UserId};
use serde_json::Value;

/// Placement of an admitted patient into a bed.
#[derive(Debug)]
pub struct Placement {
    policy: Vec<PolicyTrigger>,
}

impl Placement {
    pub fn new(cfg: &CoreConfig) -> Self {
        let frequency = cfg.ews_frequency_minutes();
        let mut observation = PolicyTrigger::new(EWS_MODEL, TriggerAction::Recurring)
            .cancel_others()
            .with_context(cfg.ews_context())
            .with_create_data(move |_| fields([("frequency", Value::from(frequency))]));
        if let Some(reason_id) = cfg.placement_cancel_reason_id() {
            observation = observation.with_cancel_reason(reason_id);
        }
        Self {
            policy: vec![observation],
        }
    }

    fn location_id(record: &Fields) -> CoreResult<Option<LocationId>> {
        read_id(record, "location_id")
    }
}

impl ActivityDataType for Placement {
    fn name(&self) -> &str {
        PLACEMENT_MODEL
    }

    fn description(&self) -> &str {
        "Patient Placement"
    }

    fn policy(&self) -> &[PolicyTrigger] {
        &self.policy
    }

    /// Placed location once known, otherwise the suggested one.
    fn activity_location_id(
        &self,
        engine: &ActivityEngine,
        activity: &Activity,
        record: Option<&Fields>,
    ) -> CoreResult<Option<LocationId>> {
        if let Some(record) = record {
            if let Some(location_id) = Self::location_id(record)? {
                return Ok(Some(location_id));
            }
            if let Some(location_id) = read_id(record, "suggested_location_id")? {
                return Ok(Some(location_id));
            }
        }
        engine.default_location_id(activity, record)
    }

    fn trigger_location(
        &self,
        engine: &ActivityEngine,
        activity: &Activity,
    ) -> CoreResult<Option<LocationId>> {
        let record = engine.data_record(activity)?.unwrap_or_default();
        Self::location_id(&record)
    }

    fn prepare_complete(&self, engine: &ActivityEngine, activity: &Activity) -> CoreResult<()> {
        let record = engine.data_record(activity)?.unwrap_or_default();
        if Self::location_id(&record)?.is_none() {
            return Err(CoreError::Validation(
                "location_id is required to complete a placement".into(),
            ));
        }
        let Some(patient_id) = engine.patient_id_of(activity, Some(&record))? else {
            return Err(CoreError::Validation(
                "patient_id is required to complete a placement".into(),
            ));
        };
        if engine.get_spell_activity(patient_id)?.is_none() {
            return Err(CoreError::NotFound(format!(
                "patient {patient_id} has no started spell"
            )));
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
        let record = engine.data_record(&activity)?.unwrap_or_default();
        let location_id = Self::location_id(&record)?.ok_or_else(|| {
            CoreError::Validation("location_id is required to complete a placement".into())
        })?;
        let patient_id = engine
            .patient_id_of(&activity, Some(&record))?
            .ok_or_else(|| CoreError::Validation("patient_id is required".into()))?;
        let spell = engine
            .get_spell_activity(patient_id)?
            .ok_or_else(|| CoreError::NotFound(format!("patient {patient_id} has no started spell")))?;
        let superuser = engine.config().superuser_id();

        let move_data = fields([
            ("patient_id", Value::from(patient_id.get())),
            ("location_id", Value::from(location_id.get())),
        ]);
        let new_move = NewActivity::default()
            .parent(spell.id)
            .creator(activity_id)
            .patient(patient_id);
        let move_id = engine.create_activity(superuser, MOVE_MODEL, new_move, move_data)?;
        engine.complete(superuser, move_id)?;

        engine.submit(
            superuser,
            spell.id,
            Value::Object(fields([("location_id", Value::from(location_id.get()))])),
        )?;
        tracing::info!("patient {} placed in location {}", patient_id, location_id);
        Ok(())
    }
}
