//! Activity data types and the registry that resolves them by name.
//!
//! Every activity names a `data_model`. The registry maps that name to an
//! [`ActivityDataType`], which supplies the type's description, transition table and policy,
//! plus the hooks the engine runs around each lifecycle operation.
//!
//! Hooks come in two flavours. `prepare_*` hooks run after the transition check and before
//! anything is written, so they can veto an operation or adjust the submitted values.
//! `on_*` hooks run after the generic bookkeeping and may call back into the engine.

use crate::activity::{Activity, Fields};
use crate::constants::UNDEFINED_DESCRIPTION;
use crate::directory::Directory;
use crate::engine::ActivityEngine;
use crate::policy::PolicyTrigger;
use crate::transitions::{TransitionTable, DEFAULT_TRANSITIONS};
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, LocationId, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Behaviour attached to one registered data model.
pub trait ActivityDataType: Send + Sync {
    /// Registered type name, matched against `Activity::data_model`.
    fn name(&self) -> &str;

    /// Default summary for new activities of this type.
    fn description(&self) -> &str {
        UNDEFINED_DESCRIPTION
    }

    fn transitions(&self) -> &TransitionTable {
        &DEFAULT_TRANSITIONS
    }

    /// Triggers evaluated, in order, after an activity of this type completes.
    fn policy(&self) -> &[PolicyTrigger] {
        &[]
    }

    /// Users who may see the activity: those responsible for its location plus the patient's
    /// followers.
    fn visible_user_ids(&self, directory: &dyn Directory, activity: &Activity) -> BTreeSet<UserId> {
        let mut user_ids = activity
            .location_id
            .map(|location_id| directory.responsible_user_ids(location_id, self.name()))
            .unwrap_or_default();
        if let Some(patient_id) = activity.patient_id {
            user_ids.extend(directory.patient_follower_ids(patient_id));
        }
        user_ids
    }

    /// Location recorded on the activity when it is refreshed from its data record.
    fn activity_location_id(
        &self,
        engine: &ActivityEngine,
        activity: &Activity,
        record: Option<&Fields>,
    ) -> CoreResult<Option<LocationId>> {
        engine.default_location_id(activity, record)
    }

    /// Location whose contexts gate this type's policy triggers.
    fn trigger_location(
        &self,
        _engine: &ActivityEngine,
        activity: &Activity,
    ) -> CoreResult<Option<LocationId>> {
        Ok(activity.location_id)
    }

    fn prepare_submit(
        &self,
        _engine: &ActivityEngine,
        _activity: &Activity,
        _values: &mut Fields,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn prepare_complete(&self, _engine: &ActivityEngine, _activity: &Activity) -> CoreResult<()> {
        Ok(())
    }

    fn on_submit(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
        _values: &Fields,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_update(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_schedule(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_assign(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_unassign(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_start(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_complete(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn on_cancel(
        &self,
        _engine: &mut ActivityEngine,
        _uid: UserId,
        _activity_id: ActivityId,
    ) -> CoreResult<()> {
        Ok(())
    }
}

/// A data type with no behaviour beyond its table and policy.
#[derive(Clone, Debug)]
pub struct SimpleDataType {
    name: String,
    description: String,
    transitions: TransitionTable,
    policy: Vec<PolicyTrigger>,
}

impl SimpleDataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: UNDEFINED_DESCRIPTION.into(),
            transitions: DEFAULT_TRANSITIONS,
            policy: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_transitions(mut self, transitions: TransitionTable) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_trigger(mut self, trigger: PolicyTrigger) -> Self {
        self.policy.push(trigger);
        self
    }
}

impl ActivityDataType for SimpleDataType {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    fn policy(&self) -> &[PolicyTrigger] {
        &self.policy
    }
}

/// Name-to-type lookup, built once at startup and shared as `Arc<TypeRegistry>`.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<dyn ActivityDataType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data type under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the name is already registered and
    /// [`CoreError::Validation`] if it is blank.
    pub fn register(&mut self, data_type: impl ActivityDataType + 'static) -> CoreResult<()> {
        self.register_arc(Arc::new(data_type))
    }

    pub fn register_arc(&mut self, data_type: Arc<dyn ActivityDataType>) -> CoreResult<()> {
        let name = data_type.name().trim().to_owned();
        if name.is_empty() {
            return Err(CoreError::Validation("data type name cannot be empty".into()));
        }
        if self.types.contains_key(&name) {
            return Err(CoreError::Conflict(format!(
                "data type '{name}' is already registered"
            )));
        }
        self.types.insert(name, data_type);
        Ok(())
    }

    /// Resolve a data type by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> CoreResult<Arc<dyn ActivityDataType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownType(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ActivityDataType>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.types.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Action, ActivityState};

    #[test]
    fn register_and_resolve() {
        let mut registry = TypeRegistry::new();
        registry
            .register(SimpleDataType::new("T").with_description("Test Activity"))
            .unwrap();

        let data_type = registry.get("T").unwrap();
        assert_eq!(data_type.description(), "Test Activity");
        assert!(data_type.policy().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let registry = TypeRegistry::new();
        let err = registry.get("nh.clinical.unknown").err().unwrap();
        assert!(matches!(err, CoreError::UnknownType(ref name) if name == "nh.clinical.unknown"));
    }

    #[test]
    fn duplicate_and_blank_names_are_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register(SimpleDataType::new("T")).unwrap();
        assert!(matches!(
            registry.register(SimpleDataType::new("T")),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            registry.register(SimpleDataType::new("  ")),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn undeclared_description_and_table_fall_back() {
        let data_type = SimpleDataType::new("T");
        assert_eq!(data_type.description(), UNDEFINED_DESCRIPTION);
        assert!(data_type
            .transitions()
            .is_action_allowed(ActivityState::New, Action::Start));
    }
}
