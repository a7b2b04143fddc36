use crate::config::CoreConfig;
use crate::constants::EWS_MODEL;
use crate::fields::{fields, read_i64};
use crate::policy::{PolicyTrigger, TriggerAction};
use crate::registry::ActivityDataType;
use serde_json::Value;

/// Early warning score observation. Each completed observation schedules its successor.
#[derive(Debug)]
pub struct EwsObservation {
    policy: Vec<PolicyTrigger>,
}

impl EwsObservation {
    pub fn new(cfg: &CoreConfig) -> Self {
        let default_frequency = cfg.ews_frequency_minutes();
        let next = PolicyTrigger::new(EWS_MODEL, TriggerAction::Recurring)
            .cancel_others()
            .with_create_data(move |observation| {
                let frequency = read_i64(observation, "frequency")
                    .ok()
                    .flatten()
                    .filter(|frequency| *frequency > 0)
                    .unwrap_or(default_frequency);
                fields([("frequency", Value::from(frequency))])
            });
        Self { policy: vec![next] }
    }
}

impl ActivityDataType for EwsObservation {
    fn name(&self) -> &str {
        EWS_MODEL
    }

    fn description(&self) -> &str {
        "NEWS Observation"
    }

    fn policy(&self) -> &[PolicyTrigger] {
        &self.policy
    }
}
