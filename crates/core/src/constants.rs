//! Constants used throughout the careflow core crate.
//!
//! Registered type names live here so the clinical types, their policies and the
//! configuration defaults all agree on spelling.

/// Type name of the spell (admission-to-discharge visit) data model.
pub const SPELL_MODEL: &str = "nh.clinical.spell";

/// Type name of the patient admission data model.
pub const ADMISSION_MODEL: &str = "nh.clinical.patient.admission";

/// Type name of the patient placement data model.
pub const PLACEMENT_MODEL: &str = "nh.clinical.patient.placement";

/// Type name of the patient move data model.
pub const MOVE_MODEL: &str = "nh.clinical.patient.move";

/// Type name of the early warning score observation data model.
pub const EWS_MODEL: &str = "nh.clinical.patient.observation.ews";

/// Record model holding patient demographics and current location.
pub const PATIENT_MODEL: &str = "nh.clinical.patient";

/// Location context under which early warning observations are scheduled.
pub const DEFAULT_EWS_CONTEXT: &str = "eobs";

/// Description given to data types that do not declare one.
pub const UNDEFINED_DESCRIPTION: &str = "Undefined Activity";

/// User id the engine acts as when cascading policy activities.
pub const DEFAULT_SUPERUSER_ID: i64 = 1;

/// Minutes between now and the due time of a plainly scheduled policy activity.
pub const DEFAULT_SCHEDULE_OFFSET_MINUTES: i64 = 60;

/// Minutes between early warning observations when none is given.
pub const DEFAULT_EWS_FREQUENCY_MINUTES: i64 = 15;

/// Server datetime format used for dates written into data records.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Datetime formats accepted for schedule dates, most specific first. Hour-only and
/// date-only strings are accepted as well.
pub const SCHEDULE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Date format for date-only and hour-only schedule strings.
pub const SCHEDULE_DATE_FORMAT: &str = "%Y-%m-%d";
