//! Policy triggers.
//!
//! A data type's policy is an ordered list of [`PolicyTrigger`]s. When an activity of that type
//! completes, the engine walks the list and, for every trigger whose guards pass, creates a
//! follow-up activity under the patient's started spell and drives it to the requested state.

use crate::activity::{Fields, NewActivity};
use crate::engine::ActivityEngine;
use crate::fields::read_i64;
use crate::store::ActivityQuery;
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, LocationId, RecordId};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds extra data for a triggered activity from the triggering activity's data record.
pub type CreateData = Arc<dyn Fn(&Fields) -> Fields + Send + Sync>;

/// What happens to a triggered activity right after it is created.
#[derive(Clone, Debug, PartialEq)]
pub enum TriggerAction {
    Start,
    /// Submit `data` if given, then complete.
    Complete { data: Option<Fields> },
    /// Schedule `offset` from now, or after the configured default offset.
    Schedule { offset: Option<Duration> },
    /// Schedule `frequency` minutes from now, reading `frequency` from the new activity's data
    /// record and falling back to the triggering one.
    Recurring,
}

/// One entry of a data type's policy.
#[derive(Clone)]
pub struct PolicyTrigger {
    pub model: String,
    pub action: TriggerAction,
    /// Cancel open activities of `model` under the spell before creating the new one.
    pub cancel_others: bool,
    /// Cancellation reason recorded on activities cancelled by `cancel_others`.
    pub cancel_reason_id: Option<RecordId>,
    /// Only fire when evaluated with this case.
    pub case: Option<i64>,
    /// Only fire when the trigger location carries this context.
    pub context: Option<String>,
    /// Skip the trigger when any of these queries finds an activity under the spell.
    pub domains: Vec<ActivityQuery>,
    pub create_data: Option<CreateData>,
}

impl PolicyTrigger {
    pub fn new(model: impl Into<String>, action: TriggerAction) -> Self {
        Self {
            model: model.into(),
            action,
            cancel_others: false,
            cancel_reason_id: None,
            case: None,
            context: None,
            domains: Vec::new(),
            create_data: None,
        }
    }

    pub fn cancel_others(mut self) -> Self {
        self.cancel_others = true;
        self
    }

    pub fn with_cancel_reason(mut self, reason_id: RecordId) -> Self {
        self.cancel_reason_id = Some(reason_id);
        self
    }

    pub fn with_case(mut self, case: i64) -> Self {
        self.case = Some(case);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_domain(mut self, query: ActivityQuery) -> Self {
        self.domains.push(query);
        self
    }

    pub fn with_create_data<F>(mut self, create_data: F) -> Self
    where
        F: Fn(&Fields) -> Fields + Send + Sync + 'static,
    {
        self.create_data = Some(Arc::new(create_data));
        self
    }
}

impl fmt::Debug for PolicyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyTrigger")
            .field("model", &self.model)
            .field("action", &self.action)
            .field("cancel_others", &self.cancel_others)
            .field("cancel_reason_id", &self.cancel_reason_id)
            .field("case", &self.case)
            .field("context", &self.context)
            .field("domains", &self.domains)
            .field("create_data", &self.create_data.is_some())
            .finish()
    }
}

impl ActivityEngine {
    /// Evaluate the policy of the activity's data type.
    ///
    /// # Arguments
    ///
    /// * `activity_id` - The triggering activity.
    /// * `location_id` - Location whose contexts gate context-restricted triggers. Without one,
    ///   the context check is skipped.
    /// * `case` - When given, only triggers declaring the same case fire.
    ///
    /// # Returns
    ///
    /// `false` if the patient has no started spell, in which case nothing is created;
    /// `true` otherwise, including when the policy is empty.
    pub fn trigger_policy(
        &mut self,
        activity_id: ActivityId,
        location_id: Option<LocationId>,
        case: Option<i64>,
    ) -> CoreResult<bool> {
        let activity = self.activity(activity_id)?;
        let data_type = self.data_type(&activity)?;
        if data_type.policy().is_empty() {
            return Ok(true);
        }

        let record = self.data_record(&activity)?.unwrap_or_default();
        let Some(patient_id) = self.patient_id_of(&activity, Some(&record))? else {
            tracing::debug!("activity {} has no patient, policy not triggered", activity_id);
            return Ok(false);
        };
        let Some(spell) = self.get_spell_activity(patient_id)? else {
            tracing::debug!(
                "patient {} has no started spell, policy of activity {} not triggered",
                patient_id,
                activity_id
            );
            return Ok(false);
        };
        let superuser = self.config().superuser_id();

        for trigger in data_type.policy() {
            if case.is_some() && trigger.case != case {
                continue;
            }
            if let (Some(context), Some(location_id)) = (&trigger.context, location_id) {
                if !self.directory().location_contexts(location_id).contains(context) {
                    continue;
                }
            }
            if self.domain_guard_matches(trigger, spell.id)? {
                continue;
            }

            if trigger.cancel_others {
                self.cancel_open_activities(
                    superuser,
                    spell.id,
                    &trigger.model,
                    trigger.cancel_reason_id,
                )?;
            }

            let mut data = Fields::new();
            data.insert("patient_id".into(), Value::from(patient_id.get()));
            if let Some(create_data) = &trigger.create_data {
                data.extend(create_data(&record));
            }
            let new = NewActivity {
                parent_id: Some(spell.id),
                creator_id: Some(activity_id),
                patient_id: Some(patient_id),
                ..NewActivity::default()
            };
            let created = self.create_activity(superuser, &trigger.model, new, data)?;

            match &trigger.action {
                TriggerAction::Start => self.start(superuser, created)?,
                TriggerAction::Complete { data } => {
                    if let Some(data) = data {
                        self.submit(superuser, created, Value::Object(data.clone()))?;
                    }
                    self.complete(superuser, created)?;
                }
                TriggerAction::Schedule { offset } => {
                    let offset = offset.unwrap_or_else(|| self.config().schedule_offset());
                    self.schedule(superuser, created, Some((Utc::now() + offset).into()))?;
                }
                TriggerAction::Recurring => {
                    let frequency = self.recurring_frequency(created, &record)?;
                    let due = Utc::now() + Duration::minutes(frequency);
                    self.schedule(superuser, created, Some(due.into()))?;
                }
            }
            tracing::info!(
                "activity {} triggered {} activity {}",
                activity_id,
                trigger.model,
                created
            );
        }
        Ok(true)
    }

    fn domain_guard_matches(
        &self,
        trigger: &PolicyTrigger,
        spell_id: ActivityId,
    ) -> CoreResult<bool> {
        for guard in &trigger.domains {
            let query = guard.clone().parent(spell_id);
            if !self.store().search_activities(&query)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn recurring_frequency(&self, created: ActivityId, trigger_record: &Fields) -> CoreResult<i64> {
        let activity = self.activity(created)?;
        let own = match self.data_record(&activity)? {
            Some(record) => read_i64(&record, "frequency")?,
            None => None,
        };
        let frequency = match own {
            Some(frequency) => Some(frequency),
            None => read_i64(trigger_record, "frequency")?,
        };
        match frequency {
            Some(frequency) if frequency > 0 => Ok(frequency),
            Some(frequency) => Err(CoreError::Validation(format!(
                "frequency must be > 0, found to be {frequency}"
            ))),
            None => Err(CoreError::Validation(format!(
                "recurring {} activity {} has no frequency",
                activity.data_model, created
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityState;
    use crate::config::CoreConfig;
    use crate::constants::SPELL_MODEL;
    use crate::directory::{LocationUsage, MemoryDirectory};
    use crate::fields::fields;
    use crate::registry::{SimpleDataType, TypeRegistry};
    use crate::store::MemoryStore;
    use careflow_types::UserId;
    use serde_json::json;

    const TRIGGER: &str = "test.trigger";
    const FOLLOW_UP: &str = "test.follow_up";
    const GUARDED: &str = "test.guarded";
    const RECURRING: &str = "test.recurring";

    fn uid(id: i64) -> UserId {
        UserId::new(id).unwrap()
    }

    fn bed() -> LocationId {
        LocationId::new(4).unwrap()
    }

    fn setup_test_engine(triggers: Vec<PolicyTrigger>) -> ActivityEngine {
        let mut registry = TypeRegistry::new();
        registry.register(SimpleDataType::new(SPELL_MODEL)).unwrap();
        registry.register(SimpleDataType::new(FOLLOW_UP)).unwrap();
        registry.register(SimpleDataType::new(RECURRING)).unwrap();
        registry.register(SimpleDataType::new(GUARDED)).unwrap();
        let trigger_type = triggers
            .into_iter()
            .fold(SimpleDataType::new(TRIGGER), |t, trigger| t.with_trigger(trigger));
        registry.register(trigger_type).unwrap();

        let mut directory = MemoryDirectory::new();
        directory
            .add_location(bed(), "Bed 1", LocationUsage::Bed, None)
            .add_context(bed(), "eobs");

        ActivityEngine::new(
            Arc::new(CoreConfig::default()),
            Arc::new(registry),
            Arc::new(directory),
            Box::new(MemoryStore::new()),
        )
    }

    fn start_spell(engine: &mut ActivityEngine, patient: RecordId) -> ActivityId {
        let spell = engine
            .create_activity(
                uid(1),
                SPELL_MODEL,
                NewActivity::default(),
                fields([("patient_id", json!(patient.get()))]),
            )
            .unwrap();
        engine.start(uid(1), spell).unwrap();
        spell
    }

    fn trigger_activity(engine: &mut ActivityEngine, patient: RecordId, extra: Fields) -> ActivityId {
        let mut data = fields([("patient_id", json!(patient.get()))]);
        data.extend(extra);
        engine
            .create_activity(uid(1), TRIGGER, NewActivity::default(), data)
            .unwrap()
    }

    fn children(engine: &ActivityEngine, spell: ActivityId, model: &str) -> Vec<ActivityId> {
        engine
            .search(&ActivityQuery::new().data_model(model).parent(spell))
            .unwrap()
    }

    #[test]
    fn start_trigger_cancels_previous_and_starts_new() {
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            FOLLOW_UP,
            TriggerAction::Start,
        )
        .cancel_others()]);
        let patient = RecordId::new(50).unwrap();
        let spell = start_spell(&mut engine, patient);
        let previous = engine
            .create(uid(1), NewActivity::of(FOLLOW_UP).parent(spell))
            .unwrap();

        let trigger = trigger_activity(&mut engine, patient, Fields::new());
        engine.complete(uid(1), trigger).unwrap();

        assert_eq!(engine.activity(previous).unwrap().state, ActivityState::Cancelled);
        let created = children(&engine, spell, FOLLOW_UP);
        assert_eq!(created.len(), 2);
        let new = engine.activity(created[1]).unwrap();
        assert_eq!(new.state, ActivityState::Started);
        assert_eq!(new.creator_id, Some(trigger));
        assert_eq!(new.parent_id, Some(spell));
        assert_eq!(new.patient_id, Some(patient));
    }

    #[test]
    fn cancel_others_records_cancel_reason() {
        let reason = RecordId::new(9).unwrap();
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            FOLLOW_UP,
            TriggerAction::Start,
        )
        .cancel_others()
        .with_cancel_reason(reason)]);
        let patient = RecordId::new(51).unwrap();
        let spell = start_spell(&mut engine, patient);
        let previous = engine
            .create(uid(1), NewActivity::of(FOLLOW_UP).parent(spell))
            .unwrap();

        let trigger = trigger_activity(&mut engine, patient, Fields::new());
        engine.complete(uid(1), trigger).unwrap();

        let previous = engine.activity(previous).unwrap();
        assert_eq!(previous.state, ActivityState::Cancelled);
        assert_eq!(previous.cancel_reason_id, Some(reason));
        let created = children(&engine, spell, FOLLOW_UP);
        assert_eq!(engine.activity(created[1]).unwrap().cancel_reason_id, None);
    }

    #[test]
    fn no_started_spell_means_no_trigger() {
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            FOLLOW_UP,
            TriggerAction::Start,
        )]);
        let patient = RecordId::new(50).unwrap();
        let trigger = trigger_activity(&mut engine, patient, Fields::new());
        engine.complete(uid(1), trigger).unwrap();

        assert!(!engine.trigger_policy(trigger, None, None).unwrap());
        let none = engine
            .search(&ActivityQuery::new().data_model(FOLLOW_UP))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn empty_policy_reports_success() {
        let mut engine = setup_test_engine(Vec::new());
        let patient = RecordId::new(50).unwrap();
        let trigger = trigger_activity(&mut engine, patient, Fields::new());
        assert!(engine.trigger_policy(trigger, None, None).unwrap());
    }

    #[test]
    fn schedule_trigger_uses_offset_and_create_data() {
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            FOLLOW_UP,
            TriggerAction::Schedule {
                offset: Some(Duration::minutes(30)),
            },
        )
        .with_create_data(|record| {
            fields([(
                "suggested_location_id",
                record.get("location_id").cloned().unwrap_or(Value::Null),
            )])
        })]);
        let patient = RecordId::new(50).unwrap();
        let spell = start_spell(&mut engine, patient);
        let trigger = trigger_activity(&mut engine, patient, fields([("location_id", json!(4))]));

        let before = Utc::now();
        engine.complete(uid(1), trigger).unwrap();

        let created = children(&engine, spell, FOLLOW_UP);
        let activity = engine.activity(created[0]).unwrap();
        assert_eq!(activity.state, ActivityState::Scheduled);
        let due = activity.date_scheduled.unwrap();
        assert!(due >= before + Duration::minutes(30));
        assert!(due <= Utc::now() + Duration::minutes(30));

        let record = engine.data_record(&activity).unwrap().unwrap();
        assert_eq!(record.get("suggested_location_id"), Some(&json!(4)));
        assert_eq!(record.get("patient_id"), Some(&json!(50)));
    }

    #[test]
    fn complete_trigger_submits_data_first() {
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            FOLLOW_UP,
            TriggerAction::Complete {
                data: Some(fields([("outcome", json!("discharged"))])),
            },
        )]);
        let patient = RecordId::new(50).unwrap();
        let spell = start_spell(&mut engine, patient);
        let trigger = trigger_activity(&mut engine, patient, Fields::new());
        engine.complete(uid(1), trigger).unwrap();

        let created = children(&engine, spell, FOLLOW_UP);
        let activity = engine.activity(created[0]).unwrap();
        assert_eq!(activity.state, ActivityState::Completed);
        let record = engine.data_record(&activity).unwrap().unwrap();
        assert_eq!(record.get("outcome"), Some(&json!("discharged")));
    }

    #[test]
    fn context_case_and_domain_guards() {
        let mut engine = setup_test_engine(vec![
            PolicyTrigger::new(FOLLOW_UP, TriggerAction::Start).with_context("critical_care"),
            PolicyTrigger::new(FOLLOW_UP, TriggerAction::Start).with_case(2),
            PolicyTrigger::new(FOLLOW_UP, TriggerAction::Start)
                .with_domain(ActivityQuery::new().data_model(GUARDED).open()),
        ]);
        let patient = RecordId::new(50).unwrap();
        let spell = start_spell(&mut engine, patient);
        engine
            .create(uid(1), NewActivity::of(GUARDED).parent(spell))
            .unwrap();
        let trigger = trigger_activity(&mut engine, patient, fields([("location_id", json!(4))]));
        engine.complete(uid(1), trigger).unwrap();

        // the bed has no critical_care context, the open guarded activity blocks the third;
        // without a case argument the second fires
        assert_eq!(children(&engine, spell, FOLLOW_UP).len(), 1);

        assert!(engine.trigger_policy(trigger, Some(bed()), Some(3)).unwrap());
        assert_eq!(children(&engine, spell, FOLLOW_UP).len(), 1);

        assert!(engine.trigger_policy(trigger, Some(bed()), Some(2)).unwrap());
        assert_eq!(children(&engine, spell, FOLLOW_UP).len(), 2);
    }

    #[test]
    fn recurring_reads_frequency_from_new_then_trigger_record() {
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            RECURRING,
            TriggerAction::Recurring,
        )
        .cancel_others()]);
        let patient = RecordId::new(50).unwrap();
        let spell = start_spell(&mut engine, patient);
        let trigger = trigger_activity(&mut engine, patient, fields([("frequency", json!(240))]));

        let before = Utc::now();
        engine.complete(uid(1), trigger).unwrap();

        let created = children(&engine, spell, RECURRING);
        let activity = engine.activity(created[0]).unwrap();
        assert_eq!(activity.state, ActivityState::Scheduled);
        assert!(activity.date_scheduled.unwrap() >= before + Duration::minutes(240));
    }

    #[test]
    fn recurring_without_frequency_fails() {
        let mut engine = setup_test_engine(vec![PolicyTrigger::new(
            RECURRING,
            TriggerAction::Recurring,
        )]);
        let patient = RecordId::new(50).unwrap();
        start_spell(&mut engine, patient);
        let trigger = trigger_activity(&mut engine, patient, Fields::new());
        let err = engine.complete(uid(1), trigger).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
