//! Location and user lookups.
//!
//! The engine needs a handful of facts about the hospital's locations and staff: who is
//! responsible for a location, which contexts a location carries, who follows a patient and who
//! manages a ward. These come from outside the engine through the [`Directory`] trait.

use careflow_types::{LocationId, RecordId, UserId};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of a hospital location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationUsage {
    Hospital,
    Ward,
    Bay,
    Bed,
}

/// Read access to locations and staff allocations.
pub trait Directory: Send + Sync {
    /// Users allocated to `location_id` who hold responsibility for activities of `data_model`.
    fn responsible_user_ids(&self, location_id: LocationId, data_model: &str) -> BTreeSet<UserId>;

    /// Parent chain of `location_id`, nearest first, excluding the location itself.
    fn location_ancestors(&self, location_id: LocationId) -> Vec<LocationId>;

    /// Context names attached to `location_id`.
    fn location_contexts(&self, location_id: LocationId) -> BTreeSet<String>;

    /// Users following `patient_id` regardless of location.
    fn patient_follower_ids(&self, patient_id: RecordId) -> BTreeSet<UserId>;

    /// Manager of the ward that contains `location_id`, if any.
    fn ward_manager_id(&self, location_id: LocationId) -> Option<UserId>;
}

#[derive(Clone, Debug)]
struct LocationEntry {
    name: String,
    usage: LocationUsage,
    parent_id: Option<LocationId>,
    contexts: BTreeSet<String>,
    user_ids: BTreeSet<UserId>,
    ward_manager_id: Option<UserId>,
}

/// A [`Directory`] held in memory. Suitable for tests, demos and small deployments.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    locations: BTreeMap<LocationId, LocationEntry>,
    /// Users missing from this map are responsible for every data model.
    responsibilities: BTreeMap<UserId, BTreeSet<String>>,
    followers: BTreeMap<RecordId, BTreeSet<UserId>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(
        &mut self,
        id: LocationId,
        name: impl Into<String>,
        usage: LocationUsage,
        parent_id: Option<LocationId>,
    ) -> &mut Self {
        self.locations.insert(
            id,
            LocationEntry {
                name: name.into(),
                usage,
                parent_id,
                contexts: BTreeSet::new(),
                user_ids: BTreeSet::new(),
                ward_manager_id: None,
            },
        );
        self
    }

    pub fn add_context(&mut self, location_id: LocationId, context: impl Into<String>) -> &mut Self {
        if let Some(entry) = self.locations.get_mut(&location_id) {
            entry.contexts.insert(context.into());
        }
        self
    }

    pub fn allocate_user(&mut self, user_id: UserId, location_id: LocationId) -> &mut Self {
        if let Some(entry) = self.locations.get_mut(&location_id) {
            entry.user_ids.insert(user_id);
        }
        self
    }

    /// Restrict `user_id` to activities of the listed data models.
    pub fn restrict_responsibility<I, S>(&mut self, user_id: UserId, data_models: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responsibilities
            .entry(user_id)
            .or_default()
            .extend(data_models.into_iter().map(Into::into));
        self
    }

    pub fn add_follower(&mut self, patient_id: RecordId, user_id: UserId) -> &mut Self {
        self.followers.entry(patient_id).or_default().insert(user_id);
        self
    }

    pub fn set_ward_manager(&mut self, ward_id: LocationId, user_id: UserId) -> &mut Self {
        if let Some(entry) = self.locations.get_mut(&ward_id) {
            entry.ward_manager_id = Some(user_id);
        }
        self
    }

    pub fn location_name(&self, location_id: LocationId) -> Option<&str> {
        self.locations.get(&location_id).map(|entry| entry.name.as_str())
    }

    fn is_responsible(&self, user_id: UserId, data_model: &str) -> bool {
        self.responsibilities
            .get(&user_id)
            .is_none_or(|models| models.contains(data_model))
    }
}

impl Directory for MemoryDirectory {
    fn responsible_user_ids(&self, location_id: LocationId, data_model: &str) -> BTreeSet<UserId> {
        self.locations
            .get(&location_id)
            .map(|entry| {
                entry
                    .user_ids
                    .iter()
                    .copied()
                    .filter(|user_id| self.is_responsible(*user_id, data_model))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn location_ancestors(&self, location_id: LocationId) -> Vec<LocationId> {
        let mut ancestors = Vec::new();
        let mut current = self
            .locations
            .get(&location_id)
            .and_then(|entry| entry.parent_id);
        while let Some(parent_id) = current {
            if parent_id == location_id || ancestors.contains(&parent_id) {
                break;
            }
            ancestors.push(parent_id);
            current = self.locations.get(&parent_id).and_then(|entry| entry.parent_id);
        }
        ancestors
    }

    fn location_contexts(&self, location_id: LocationId) -> BTreeSet<String> {
        self.locations
            .get(&location_id)
            .map(|entry| entry.contexts.clone())
            .unwrap_or_default()
    }

    fn patient_follower_ids(&self, patient_id: RecordId) -> BTreeSet<UserId> {
        self.followers.get(&patient_id).cloned().unwrap_or_default()
    }

    fn ward_manager_id(&self, location_id: LocationId) -> Option<UserId> {
        std::iter::once(location_id)
            .chain(self.location_ancestors(location_id))
            .filter_map(|id| self.locations.get(&id))
            .find(|entry| entry.usage == LocationUsage::Ward)
            .and_then(|ward| ward.ward_manager_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(id: i64) -> LocationId {
        LocationId::new(id).unwrap()
    }

    fn user(id: i64) -> UserId {
        UserId::new(id).unwrap()
    }

    fn hospital() -> MemoryDirectory {
        let mut directory = MemoryDirectory::new();
        directory
            .add_location(loc(1), "Hospital", LocationUsage::Hospital, None)
            .add_location(loc(2), "Ward A", LocationUsage::Ward, Some(loc(1)))
            .add_location(loc(3), "Bay 1", LocationUsage::Bay, Some(loc(2)))
            .add_location(loc(4), "Bed 1", LocationUsage::Bed, Some(loc(3)))
            .add_context(loc(4), "eobs")
            .allocate_user(user(10), loc(4))
            .allocate_user(user(11), loc(4))
            .restrict_responsibility(user(11), ["nh.clinical.patient.placement"])
            .set_ward_manager(loc(2), user(20));
        directory
    }

    #[test]
    fn responsibility_filters_by_data_model() {
        let directory = hospital();
        let ews = directory.responsible_user_ids(loc(4), "nh.clinical.patient.observation.ews");
        assert_eq!(ews, BTreeSet::from([user(10)]));

        let placement = directory.responsible_user_ids(loc(4), "nh.clinical.patient.placement");
        assert_eq!(placement, BTreeSet::from([user(10), user(11)]));
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let directory = hospital();
        assert_eq!(directory.location_ancestors(loc(4)), vec![loc(3), loc(2), loc(1)]);
        assert!(directory.location_ancestors(loc(1)).is_empty());
    }

    #[test]
    fn ward_manager_is_found_from_bed() {
        let directory = hospital();
        assert_eq!(directory.ward_manager_id(loc(4)), Some(user(20)));
        assert_eq!(directory.ward_manager_id(loc(1)), None);
    }

    #[test]
    fn contexts_and_unknown_locations() {
        let directory = hospital();
        assert!(directory.location_contexts(loc(4)).contains("eobs"));
        assert!(directory.location_contexts(loc(99)).is_empty());
        assert!(directory.responsible_user_ids(loc(99), "x").is_empty());
        assert_eq!(directory.location_name(loc(3)), Some("Bay 1"));
    }
}
