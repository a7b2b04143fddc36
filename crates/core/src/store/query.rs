//! Filters understood by the stores.

use crate::activity::{Activity, ActivityState, DataRef, Fields};
use careflow_types::{ActivityId, LocationId, RecordId};
use serde_json::Value;
use std::cmp::Ordering;

// ============================================================================
// Activity queries
// ============================================================================

/// State restriction of an [`ActivityQuery`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateFilter {
    In(Vec<ActivityState>),
    NotIn(Vec<ActivityState>),
}

impl StateFilter {
    fn matches(&self, state: ActivityState) -> bool {
        match self {
            StateFilter::In(states) => states.contains(&state),
            StateFilter::NotIn(states) => !states.contains(&state),
        }
    }
}

/// Result ordering of an [`ActivityQuery`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryOrder {
    #[default]
    IdAsc,
    IdDesc,
    /// Most recent state switch first. Activities that never switched state sort last.
    SequenceDesc,
}

/// Conjunctive filter over activity envelopes. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivityQuery {
    pub data_model: Option<String>,
    pub states: Option<StateFilter>,
    pub parent_id: Option<ActivityId>,
    pub creator_id: Option<ActivityId>,
    pub patient_id: Option<RecordId>,
    pub location_id: Option<LocationId>,
    pub spell_activity_id: Option<ActivityId>,
    pub data_ref: Option<DataRef>,
    pub exclude_id: Option<ActivityId>,
    pub order: QueryOrder,
}

impl ActivityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_model(mut self, data_model: impl Into<String>) -> Self {
        self.data_model = Some(data_model.into());
        self
    }

    pub fn states(mut self, states: &[ActivityState]) -> Self {
        self.states = Some(StateFilter::In(states.to_vec()));
        self
    }

    pub fn not_states(mut self, states: &[ActivityState]) -> Self {
        self.states = Some(StateFilter::NotIn(states.to_vec()));
        self
    }

    /// Restrict to activities that are neither completed nor cancelled.
    pub fn open(self) -> Self {
        self.not_states(&ActivityState::TERMINAL)
    }

    pub fn parent(mut self, parent_id: ActivityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn created_by(mut self, creator_id: ActivityId) -> Self {
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

    pub fn spell(mut self, spell_activity_id: ActivityId) -> Self {
        self.spell_activity_id = Some(spell_activity_id);
        self
    }

    pub fn data_ref(mut self, data_ref: DataRef) -> Self {
        self.data_ref = Some(data_ref);
        self
    }

    pub fn excluding(mut self, id: ActivityId) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn order(mut self, order: QueryOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        fn eq<T: PartialEq>(wanted: &Option<T>, actual: Option<&T>) -> bool {
            wanted.as_ref().is_none_or(|wanted| Some(wanted) == actual)
        }

        eq(&self.data_model, Some(&activity.data_model))
            && self
                .states
                .as_ref()
                .is_none_or(|filter| filter.matches(activity.state))
            && eq(&self.parent_id, activity.parent_id.as_ref())
            && eq(&self.creator_id, activity.creator_id.as_ref())
            && eq(&self.patient_id, activity.patient_id.as_ref())
            && eq(&self.location_id, activity.location_id.as_ref())
            && eq(&self.spell_activity_id, activity.spell_activity_id.as_ref())
            && eq(&self.data_ref, activity.data_ref.as_ref())
            && self.exclude_id != Some(activity.id)
    }

    /// Sort matched activities according to [`ActivityQuery::order`].
    pub fn sort(&self, activities: &mut [&Activity]) {
        match self.order {
            QueryOrder::IdAsc => activities.sort_by_key(|a| a.id),
            QueryOrder::IdDesc => activities.sort_by(|a, b| b.id.cmp(&a.id)),
            QueryOrder::SequenceDesc => {
                activities.sort_by(|a, b| b.sequence.cmp(&a.sequence).then(b.id.cmp(&a.id)))
            }
        }
    }
}

// ============================================================================
// Record domains
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
}

/// A single `field op value` term. `In`/`NotIn` expect an array value.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    fn matches(&self, fields: &Fields) -> bool {
        let actual = fields.get(&self.field).unwrap_or(&Value::Null);
        let listed = || match &self.value {
            Value::Array(values) => values.contains(actual),
            _ => false,
        };
        match self.op {
            Operator::Eq => *actual == self.value,
            Operator::Ne => *actual != self.value,
            Operator::In => listed(),
            Operator::NotIn => !listed(),
        }
    }
}

/// Conjunctive filter over data records with an optional ordering field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Domain {
    pub conditions: Vec<Condition>,
    /// Field to order by and whether to order descending. Ties and the default fall back to
    /// ascending record id.
    pub order_by: Option<(String, bool)>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, field: &str, op: Operator, value: Value) -> Self {
        self.conditions.push(Condition {
            field: field.to_owned(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Eq, value.into())
    }

    pub fn ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Ne, value.into())
    }

    pub fn is_in(self, field: &str, values: Vec<Value>) -> Self {
        self.with(field, Operator::In, Value::Array(values))
    }

    pub fn not_in(self, field: &str, values: Vec<Value>) -> Self {
        self.with(field, Operator::NotIn, Value::Array(values))
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some((field.to_owned(), descending));
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.conditions.iter().all(|c| c.matches(fields))
    }

    /// Compare two records by the ordering field.
    pub fn compare(&self, a: &Fields, b: &Fields) -> Ordering {
        let Some((field, descending)) = &self.order_by else {
            return Ordering::Equal;
        };
        let ordering = compare_values(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
        );
        if *descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Total order over JSON scalars: null < bool < number < string < anything else.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[test]
    fn domain_combines_conditions() {
        let record = fields(json!({"patient_id": 4, "state": "completed"}));
        let domain = Domain::new()
            .eq("patient_id", 4)
            .not_in("state", vec![json!("new"), json!("cancelled")]);
        assert!(domain.matches(&record));

        let domain = Domain::new().eq("patient_id", 4).ne("state", "completed");
        assert!(!domain.matches(&record));
    }

    #[test]
    fn missing_field_compares_as_null() {
        let record = fields(json!({"name": "Bed 1"}));
        assert!(Domain::new().eq("location_id", Value::Null).matches(&record));
        assert!(!Domain::new().is_in("location_id", vec![json!(1)]).matches(&record));
    }

    #[test]
    fn ordering_by_field() {
        let a = fields(json!({"frequency": 15}));
        let b = fields(json!({"frequency": 240}));
        let asc = Domain::new().order_by("frequency", false);
        let desc = Domain::new().order_by("frequency", true);
        assert_eq!(asc.compare(&a, &b), Ordering::Less);
        assert_eq!(desc.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn state_filter_in_and_not_in() {
        let open = StateFilter::NotIn(ActivityState::TERMINAL.to_vec());
        assert!(open.matches(ActivityState::Scheduled));
        assert!(!open.matches(ActivityState::Cancelled));
        assert!(StateFilter::In(vec![ActivityState::Started]).matches(ActivityState::Started));
    }
}
