//! Lineage and lookup queries over the two activity hierarchies.

use crate::activity::{Activity, ActivityState};
use crate::engine::ActivityEngine;
use crate::store::{ActivityQuery, QueryOrder};
use crate::{CoreError, CoreResult};
use careflow_types::{ActivityId, RecordId};
use std::collections::BTreeSet;

impl ActivityEngine {
    /// Activities whose parent is `id`, in id order.
    pub fn child_ids(&self, id: ActivityId) -> CoreResult<Vec<ActivityId>> {
        self.store()
            .search_activities(&ActivityQuery::new().parent(id))
    }

    /// Activities whose creator is `id`, in id order.
    pub fn created_ids(&self, id: ActivityId) -> CoreResult<Vec<ActivityId>> {
        self.store()
            .search_activities(&ActivityQuery::new().created_by(id))
    }

    /// `id` followed by everything it created, transitively, depth first.
    ///
    /// Creator links are fixed at creation, so the walk always terminates.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `id` does not exist.
    pub fn get_recursive_created_ids(&self, id: ActivityId) -> CoreResult<Vec<ActivityId>> {
        self.activity(id)?;
        let mut ids = vec![id];
        for created in self.created_ids(id)? {
            ids.extend(self.get_recursive_created_ids(created)?);
        }
        Ok(ids)
    }

    /// `id` followed by all of its descendants in the business hierarchy, depth first. Each
    /// activity is visited at most once even if parent links form a cycle.
    pub fn get_recursive_child_ids(&self, id: ActivityId) -> CoreResult<Vec<ActivityId>> {
        self.activity(id)?;
        let mut visited = BTreeSet::new();
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            ids.push(current);
            let mut children = self.child_ids(current)?;
            children.reverse();
            stack.extend(children);
        }
        Ok(ids)
    }

    /// The single open activity of `data_model` under `spell_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if more than one is open.
    pub fn get_open_activity(
        &self,
        data_model: &str,
        spell_id: ActivityId,
    ) -> CoreResult<Option<ActivityId>> {
        let query = ActivityQuery::new()
            .data_model(data_model)
            .parent(spell_id)
            .open();
        let ids = self.store().search_activities(&query)?;
        match ids.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(CoreError::Conflict(format!(
                "expected at most one open {data_model} activity under spell {spell_id}, found {}",
                ids.len()
            ))),
        }
    }

    /// Most recently created open activity of `data_model` under `spell_id`.
    pub fn get_latest_activity(
        &self,
        data_model: &str,
        spell_id: ActivityId,
    ) -> CoreResult<Option<ActivityId>> {
        let query = ActivityQuery::new()
            .data_model(data_model)
            .parent(spell_id)
            .open()
            .order(QueryOrder::IdDesc);
        Ok(self.store().search_activities(&query)?.into_iter().next())
    }

    /// Every open activity of `data_model`, or only those of `spell_id` when given.
    pub fn get_open_activities_for_all_spells(
        &self,
        data_model: &str,
        spell_id: Option<ActivityId>,
    ) -> CoreResult<Vec<ActivityId>> {
        let mut query = ActivityQuery::new().data_model(data_model).open();
        query.spell_activity_id = spell_id;
        self.store().search_activities(&query)
    }

    /// The patient's started spell, if any.
    pub fn get_spell_activity(&self, patient_id: RecordId) -> CoreResult<Option<Activity>> {
        let query = ActivityQuery::new()
            .data_model(self.config().spell_model())
            .states(&[ActivityState::Started])
            .patient(patient_id)
            .order(QueryOrder::IdDesc);
        match self.store().search_activities(&query)?.first() {
            Some(id) => self.activity(*id).map(Some),
            None => Ok(None),
        }
    }
}
