use crate::activity::{Activity, Fields};
use crate::config::CoreConfig;
use crate::constants::DATETIME_FORMAT;
use crate::directory::Directory;
use crate::engine::ActivityEngine;
use crate::fields::read_id;
use crate::registry::ActivityDataType;
use crate::CoreResult;
use careflow_types::{LocationId, UserId};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;

/// A patient's visit, from admission to discharge. Every clinical activity of the visit hangs
/// off the spell.
#[derive(Clone, Debug)]
pub struct Spell {
    name: String,
}

impl Spell {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            name: cfg.spell_model().to_owned(),
        }
    }
}

impl ActivityDataType for Spell {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Spell / Visit"
    }

    /// Staff of the spell's location and of every enclosing location can see the spell.
    fn visible_user_ids(&self, directory: &dyn Directory, activity: &Activity) -> BTreeSet<UserId> {
        let mut user_ids = BTreeSet::new();
        if let Some(location_id) = activity.location_id {
            for id in std::iter::once(location_id).chain(directory.location_ancestors(location_id)) {
                user_ids.extend(directory.responsible_user_ids(id, &self.name));
            }
        }
        if let Some(patient_id) = activity.patient_id {
            user_ids.extend(directory.patient_follower_ids(patient_id));
        }
        user_ids
    }

    fn prepare_submit(
        &self,
        _engine: &ActivityEngine,
        _activity: &Activity,
        values: &mut Fields,
    ) -> CoreResult<()> {
        if read_id::<LocationId>(values, "location_id")?.is_some() {
            let move_date = Utc::now().format(DATETIME_FORMAT).to_string();
            values.insert("move_date".into(), Value::String(move_date));
        }
        Ok(())
    }
}
