use crate::activity::{Activity, ActivityPatch, Fields};
use crate::store::{ActivityQuery, ActivityStore, Domain, RecordStore};
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, RecordId};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;

/// In-process store backed by ordered maps.
///
/// Activity and record ids are allocated from independent counters starting at 1. Record ids
/// are unique across models.
#[derive(Debug, Default)]
pub struct MemoryStore {
    activities: BTreeMap<ActivityId, Activity>,
    records: HashMap<String, BTreeMap<RecordId, Fields>>,
    last_activity_id: u64,
    last_record_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(counter: &mut u64) -> CoreResult<NonZeroU64> {
        *counter += 1;
        NonZeroU64::new(*counter).ok_or_else(|| CoreError::Store("id counter overflowed".into()))
    }

    fn records(&self, model: &str) -> CoreResult<&BTreeMap<RecordId, Fields>> {
        self.records
            .get(model)
            .ok_or_else(|| CoreError::NotFound(format!("no '{model}' records exist")))
    }
}

impl ActivityStore for MemoryStore {
    fn next_activity_id(&mut self) -> CoreResult<ActivityId> {
        Self::next_id(&mut self.last_activity_id).map(ActivityId::from_non_zero)
    }

    fn insert_activity(&mut self, activity: Activity) -> CoreResult<()> {
        if self.activities.contains_key(&activity.id) {
            return Err(CoreError::Conflict(format!(
                "activity {} already exists",
                activity.id
            )));
        }
        if let Some(data_ref) = &activity.data_ref {
            if self
                .activities
                .values()
                .any(|other| other.data_ref.as_ref() == Some(data_ref))
            {
                return Err(CoreError::Conflict("Data reference must be unique!".into()));
            }
        }
        self.activities.insert(activity.id, activity);
        Ok(())
    }

    fn activity(&self, id: ActivityId) -> CoreResult<Activity> {
        self.activities
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("activity {id} does not exist")))
    }

    fn update_activity(&mut self, id: ActivityId, patch: &ActivityPatch) -> CoreResult<()> {
        if let Some(data_ref) = &patch.data_ref {
            if self
                .activities
                .values()
                .any(|other| other.id != id && other.data_ref.as_ref() == Some(data_ref))
            {
                return Err(CoreError::Conflict("Data reference must be unique!".into()));
            }
        }
        let activity = self
            .activities
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("activity {id} does not exist")))?;
        activity.apply(patch);
        Ok(())
    }

    fn search_activities(&self, query: &ActivityQuery) -> CoreResult<Vec<ActivityId>> {
        let mut matched: Vec<&Activity> = self
            .activities
            .values()
            .filter(|activity| query.matches(activity))
            .collect();
        query.sort(&mut matched);
        Ok(matched.into_iter().map(|activity| activity.id).collect())
    }

    fn max_sequence(&self) -> CoreResult<u64> {
        Ok(self
            .activities
            .values()
            .filter_map(|activity| activity.sequence)
            .max()
            .unwrap_or(0))
    }
}

impl RecordStore for MemoryStore {
    fn create_record(&mut self, model: &str, fields: Fields) -> CoreResult<RecordId> {
        let id = Self::next_id(&mut self.last_record_id).map(RecordId::from_non_zero)?;
        self.records
            .entry(model.to_owned())
            .or_default()
            .insert(id, fields);
        Ok(id)
    }

    fn read_record(&self, model: &str, id: RecordId) -> CoreResult<Fields> {
        self.records(model)?
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("{model} record {id} does not exist")))
    }

    fn write_record(&mut self, model: &str, id: RecordId, fields: &Fields) -> CoreResult<()> {
        let record = self
            .records
            .get_mut(model)
            .and_then(|records| records.get_mut(&id))
            .ok_or_else(|| CoreError::NotFound(format!("{model} record {id} does not exist")))?;
        for (key, value) in fields {
            record.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn search_records(&self, model: &str, domain: &Domain) -> CoreResult<Vec<RecordId>> {
        let Some(records) = self.records.get(model) else {
            return Ok(Vec::new());
        };
        let mut matched: Vec<(&RecordId, &Fields)> = records
            .iter()
            .filter(|(_, fields)| domain.matches(fields))
            .collect();
        matched.sort_by(|(a_id, a), (b_id, b)| domain.compare(a, b).then(a_id.cmp(b_id)));
        Ok(matched.into_iter().map(|(id, _)| *id).collect())
    }

    fn browse_records(&self, model: &str, ids: &[RecordId]) -> CoreResult<Vec<(RecordId, Fields)>> {
        ids.iter()
            .map(|id| Ok((*id, self.read_record(model, *id)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityState, DataRef};
    use careflow_types::UserId;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn activity(store: &mut MemoryStore, data_ref: Option<DataRef>) -> Activity {
        let now = Utc::now();
        let uid = UserId::new(1).unwrap();
        Activity {
            id: store.next_activity_id().unwrap(),
            summary: "Test".into(),
            state: ActivityState::New,
            notes: None,
            parent_id: None,
            creator_id: None,
            data_model: "test.model".into(),
            data_ref,
            user_id: None,
            user_ids: BTreeSet::new(),
            assign_locked: false,
            patient_id: None,
            location_id: None,
            pos_id: None,
            spell_activity_id: None,
            cancel_reason_id: None,
            ward_manager_id: None,
            date_planned: None,
            date_scheduled: None,
            date_started: None,
            date_terminated: None,
            date_deadline: None,
            date_expiry: None,
            create_date: now,
            write_date: now,
            create_uid: uid,
            write_uid: uid,
            terminate_uid: None,
            sequence: None,
        }
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut store = MemoryStore::new();
        let first = store.next_activity_id().unwrap();
        let second = store.next_activity_id().unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
    }

    #[test]
    fn data_ref_is_unique_across_activities() {
        let mut store = MemoryStore::new();
        let record = store.create_record("test.model", Fields::new()).unwrap();
        let data_ref = DataRef::new("test.model", record);

        let a = activity(&mut store, Some(data_ref.clone()));
        store.insert_activity(a).unwrap();

        let b = activity(&mut store, None);
        let b_id = b.id;
        store.insert_activity(b).unwrap();

        let err = store
            .update_activity(
                b_id,
                &ActivityPatch {
                    data_ref: Some(data_ref),
                    ..ActivityPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(store.activity(b_id).unwrap().data_ref, None);
    }

    #[test]
    fn rebinding_own_data_ref_is_allowed() {
        let mut store = MemoryStore::new();
        let record = store.create_record("test.model", Fields::new()).unwrap();
        let data_ref = DataRef::new("test.model", record);
        let a = activity(&mut store, Some(data_ref.clone()));
        let id = a.id;
        store.insert_activity(a).unwrap();

        let patch = ActivityPatch {
            data_ref: Some(data_ref),
            ..ActivityPatch::default()
        };
        assert!(store.update_activity(id, &patch).is_ok());
    }

    #[test]
    fn unknown_activity_is_not_found() {
        let store = MemoryStore::new();
        let err = store.activity(ActivityId::new(42).unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn max_sequence_tracks_highest_value() {
        let mut store = MemoryStore::new();
        assert_eq!(store.max_sequence().unwrap(), 0);

        let a = activity(&mut store, None);
        let id = a.id;
        store.insert_activity(a).unwrap();
        store
            .update_activity(
                id,
                &ActivityPatch {
                    state: Some(ActivityState::Started),
                    sequence: Some(7),
                    ..ActivityPatch::default()
                },
            )
            .unwrap();
        assert_eq!(store.max_sequence().unwrap(), 7);
    }

    #[test]
    fn write_record_merges_fields() {
        let mut store = MemoryStore::new();
        let id = store
            .create_record("nh.clinical.patient", fields(json!({"name": "Wren", "ward": 1})))
            .unwrap();
        store
            .write_record("nh.clinical.patient", id, &fields(json!({"ward": 2})))
            .unwrap();

        let record = store.read_record("nh.clinical.patient", id).unwrap();
        assert_eq!(record, fields(json!({"name": "Wren", "ward": 2})));
    }

    #[test]
    fn search_records_filters_and_orders() {
        let mut store = MemoryStore::new();
        let model = "nh.clinical.patient.move";
        let first = store
            .create_record(model, fields(json!({"patient_id": 3, "rank": 2})))
            .unwrap();
        let second = store
            .create_record(model, fields(json!({"patient_id": 3, "rank": 9})))
            .unwrap();
        store
            .create_record(model, fields(json!({"patient_id": 4, "rank": 5})))
            .unwrap();

        let domain = Domain::new().eq("patient_id", 3).order_by("rank", true);
        assert_eq!(store.search_records(model, &domain).unwrap(), vec![second, first]);
        assert!(store
            .search_records("unknown.model", &Domain::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn browse_fails_on_missing_record() {
        let mut store = MemoryStore::new();
        let id = store.create_record("m", Fields::new()).unwrap();
        assert_eq!(store.browse_records("m", &[id]).unwrap().len(), 1);
        let missing = RecordId::new(99).unwrap();
        assert!(store.browse_records("m", &[id, missing]).is_err());
    }
}
