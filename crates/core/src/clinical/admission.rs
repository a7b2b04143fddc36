use crate::activity::{Activity, ActivityPatch, Fields, NewActivity};
use crate::constants::{ADMISSION_MODEL, MOVE_MODEL, PLACEMENT_MODEL};
use crate::engine::ActivityEngine;
use crate::fields::read_id;
use crate::policy::{PolicyTrigger, TriggerAction};
use crate::registry::ActivityDataType;
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, LocationId, RecordId, UserId};
use serde_json::Value;

/// Admission of a patient into a location. Completing it opens the patient's spell.
#[derive(Debug)]
pub struct Admission {
    policy: Vec<PolicyTrigger>,
}

impl Admission {
    pub fn new() -> Self {
        let placement = PolicyTrigger::new(PLACEMENT_MODEL, TriggerAction::Schedule { offset: None })
            .cancel_others()
            .with_create_data(|admission| {
                let mut data = Fields::new();
                if let Some(location_id) = admission.get("location_id") {
                    data.insert("suggested_location_id".into(), location_id.clone());
                }
                data
            });
        Self {
            policy: vec![placement],
        }
    }

    fn patient_id(values: &Fields) -> CoreResult<RecordId> {
        read_id(values, "patient_id")?
            .ok_or_else(|| CoreError::Validation("patient_id is required for an admission".into()))
    }
}

impl Default for Admission {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityDataType for Admission {
    fn name(&self) -> &str {
        ADMISSION_MODEL
    }

    fn description(&self) -> &str {
        "Patient Admission"
    }

    fn policy(&self) -> &[PolicyTrigger] {
        &self.policy
    }

    fn prepare_submit(
        &self,
        engine: &ActivityEngine,
        _activity: &Activity,
        values: &mut Fields,
    ) -> CoreResult<()> {
        let patient_id = Self::patient_id(values)?;
        if let Some(spell) = engine.get_spell_activity(patient_id)? {
            return Err(CoreError::Conflict(format!(
                "patient {patient_id} already has a started spell (activity {})",
                spell.id
            )));
        }
        Ok(())
    }

    fn prepare_complete(&self, engine: &ActivityEngine, activity: &Activity) -> CoreResult<()> {
        let record = engine.data_record(activity)?.unwrap_or_default();
        Self::patient_id(&record).map(|_| ())
    }

    fn on_complete(
        &self,
        engine: &mut ActivityEngine,
        _uid: UserId,
        activity_id: ActivityId,
    ) -> CoreResult<()> {
        let activity = engine.activity(activity_id)?;
        let record = engine.data_record(&activity)?.unwrap_or_default();
        let patient_id = Self::patient_id(&record)?;
        let location_id: Option<LocationId> = read_id(&record, "location_id")?;
        let superuser = engine.config().superuser_id();

        let mut spell_data = Fields::new();
        for key in ["patient_id", "location_id", "pos_id", "code", "start_date"] {
            if let Some(value) = record.get(key).filter(|value| !value.is_null()) {
                spell_data.insert(key.into(), value.clone());
            }
        }
        let spell_model = engine.config().spell_model().to_owned();
        let new_spell = NewActivity::default()
            .creator(activity_id)
            .patient(patient_id);
        let spell_id = engine.create_activity(superuser, &spell_model, new_spell, spell_data)?;
        engine.start(superuser, spell_id)?;

        let patch = ActivityPatch {
            parent_id: Some(spell_id),
            ..ActivityPatch::default()
        };
        engine.write(superuser, activity_id, patch)?;
        engine.update_activity(superuser, activity_id)?;

        if let Some(location_id) = location_id {
            let mut move_data = Fields::new();
            move_data.insert("patient_id".into(), Value::from(patient_id.get()));
            move_data.insert("location_id".into(), Value::from(location_id.get()));
            let new_move = NewActivity::default()
                .parent(spell_id)
                .creator(activity_id)
                .patient(patient_id);
            let move_id = engine.create_activity(superuser, MOVE_MODEL, new_move, move_data)?;
            engine.complete(superuser, move_id)?;
        }
        tracing::info!("patient {} admitted, spell activity {}", patient_id, spell_id);
        Ok(())
    }

    /// Cancelling an admission cancels the spell it opened and everything still open under it.
    fn on_cancel(
        &self,
        engine: &mut ActivityEngine,
        _uid: UserId,
        activity_id: ActivityId,
    ) -> CoreResult<()> {
        let Some(spell_id) = engine.activity(activity_id)?.parent_id else {
            return Ok(());
        };
        let superuser = engine.config().superuser_id();
        for id in engine.get_recursive_child_ids(spell_id)? {
            if !engine.activity(id)?.state.is_terminal() {
                engine.cancel(superuser, id)?;
            }
        }
        Ok(())
    }
}
