//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the engine as an `Arc<CoreConfig>`. Binaries decide where the YAML comes from
//! (file path from the environment, or built-in defaults); the core never reads environment
//! variables itself.

use crate::constants::{
    DEFAULT_EWS_CONTEXT, DEFAULT_EWS_FREQUENCY_MINUTES, DEFAULT_SCHEDULE_OFFSET_MINUTES,
    DEFAULT_SUPERUSER_ID, SPELL_MODEL,
};
use crate::{CoreError, CoreResult};
use careflow_types::{RecordId, UserId};
use chrono::Duration;
use serde::Deserialize;
use std::num::NonZeroU64;
use std::path::Path;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    superuser_id: UserId,
    schedule_offset_minutes: i64,
    spell_model: String,
    ews_context: String,
    ews_frequency_minutes: i64,
    placement_cancel_reason_id: Option<RecordId>,
}

/// On-disk shape of the configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoreConfigFile {
    superuser_id: Option<i64>,
    schedule_offset_minutes: Option<i64>,
    spell_model: Option<String>,
    ews_context: Option<String>,
    ews_frequency_minutes: Option<i64>,
    placement_cancel_reason_id: Option<i64>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if an offset or frequency is not positive, or if a
    /// name is blank.
    pub fn new(
        superuser_id: UserId,
        schedule_offset_minutes: i64,
        spell_model: String,
        ews_context: String,
        ews_frequency_minutes: i64,
    ) -> CoreResult<Self> {
        if schedule_offset_minutes < 1 {
            return Err(CoreError::Validation(
                "schedule_offset_minutes must be > 0".into(),
            ));
        }
        if ews_frequency_minutes < 1 {
            return Err(CoreError::Validation(
                "ews_frequency_minutes must be > 0".into(),
            ));
        }
        if spell_model.trim().is_empty() {
            return Err(CoreError::Validation("spell_model cannot be empty".into()));
        }
        if ews_context.trim().is_empty() {
            return Err(CoreError::Validation("ews_context cannot be empty".into()));
        }

        Ok(Self {
            superuser_id,
            schedule_offset_minutes,
            spell_model,
            ews_context,
            ews_frequency_minutes,
            placement_cancel_reason_id: None,
        })
    }

    /// Record observations cancelled by a new placement under this cancellation reason.
    pub fn with_placement_cancel_reason(mut self, reason_id: RecordId) -> Self {
        self.placement_cancel_reason_id = Some(reason_id);
        self
    }

    /// Parse a configuration from YAML text, filling absent keys with defaults.
    pub fn from_yaml_str(yaml_text: &str) -> CoreResult<Self> {
        let file: CoreConfigFile = if yaml_text.trim().is_empty() {
            CoreConfigFile::default()
        } else {
            serde_yaml::from_str(yaml_text).map_err(CoreError::YamlDeserialization)?
        };

        let superuser_id = UserId::new(file.superuser_id.unwrap_or(DEFAULT_SUPERUSER_ID))?;
        let placement_cancel_reason_id = file
            .placement_cancel_reason_id
            .map(RecordId::new)
            .transpose()?;
        let cfg = Self::new(
            superuser_id,
            file.schedule_offset_minutes
                .unwrap_or(DEFAULT_SCHEDULE_OFFSET_MINUTES),
            file.spell_model.unwrap_or_else(|| SPELL_MODEL.into()),
            file.ews_context
                .unwrap_or_else(|| DEFAULT_EWS_CONTEXT.into()),
            file.ews_frequency_minutes
                .unwrap_or(DEFAULT_EWS_FREQUENCY_MINUTES),
        )?;
        Ok(match placement_cancel_reason_id {
            Some(reason_id) => cfg.with_placement_cancel_reason(reason_id),
            None => cfg,
        })
    }

    /// Read and parse a YAML configuration file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(CoreError::ConfigRead)?;
        Self::from_yaml_str(&text)
    }

    /// User the engine acts as when cascading policy activities.
    pub fn superuser_id(&self) -> UserId {
        self.superuser_id
    }

    /// Delay before a plainly scheduled policy activity falls due.
    pub fn schedule_offset(&self) -> Duration {
        Duration::minutes(self.schedule_offset_minutes)
    }

    pub fn spell_model(&self) -> &str {
        &self.spell_model
    }

    pub fn ews_context(&self) -> &str {
        &self.ews_context
    }

    pub fn ews_frequency_minutes(&self) -> i64 {
        self.ews_frequency_minutes
    }

    pub fn placement_cancel_reason_id(&self) -> Option<RecordId> {
        self.placement_cancel_reason_id
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            superuser_id: UserId::from_non_zero(NonZeroU64::MIN),
            schedule_offset_minutes: DEFAULT_SCHEDULE_OFFSET_MINUTES,
            spell_model: SPELL_MODEL.into(),
            ews_context: DEFAULT_EWS_CONTEXT.into(),
            ews_frequency_minutes: DEFAULT_EWS_FREQUENCY_MINUTES,
            placement_cancel_reason_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg = CoreConfig::from_yaml_str("").unwrap();
        assert_eq!(cfg.superuser_id().get(), 1);
        assert_eq!(cfg.schedule_offset(), Duration::minutes(60));
        assert_eq!(cfg.spell_model(), SPELL_MODEL);
        assert_eq!(cfg.ews_context(), "eobs");
    }

    #[test]
    fn yaml_overrides_selected_keys() {
        let cfg =
            CoreConfig::from_yaml_str("schedule_offset_minutes: 30\nsuperuser_id: 5\n").unwrap();
        assert_eq!(cfg.schedule_offset(), Duration::minutes(30));
        assert_eq!(cfg.superuser_id().get(), 5);
        assert_eq!(cfg.ews_frequency_minutes(), DEFAULT_EWS_FREQUENCY_MINUTES);
    }

    #[test]
    fn placement_cancel_reason_is_optional() {
        assert_eq!(CoreConfig::default().placement_cancel_reason_id(), None);
        let cfg = CoreConfig::from_yaml_str("placement_cancel_reason_id: 3\n").unwrap();
        assert_eq!(cfg.placement_cancel_reason_id(), Some(RecordId::new(3).unwrap()));
        let err = CoreConfig::from_yaml_str("placement_cancel_reason_id: 0\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidId(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoreConfig::from_yaml_str("schedule_offset: 30\n").unwrap_err();
        assert!(matches!(err, CoreError::YamlDeserialization(_)));
    }

    #[test]
    fn non_positive_offset_is_rejected() {
        let err = CoreConfig::from_yaml_str("schedule_offset_minutes: 0\n").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ews_context: critical_care").unwrap();

        let cfg = CoreConfig::load(file.path()).unwrap();
        assert_eq!(cfg.ews_context(), "critical_care");
    }

    #[test]
    fn load_missing_file_fails() {
        let err = CoreConfig::load(Path::new("/nonexistent/careflow.yaml")).unwrap_err();
        assert!(matches!(err, CoreError::ConfigRead(_)));
    }
}
