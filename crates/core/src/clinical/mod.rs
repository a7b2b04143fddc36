//! Clinical data types.
//!
//! These types give the engine's policy cascade something to drive: admitting a patient opens a
//! spell and schedules a placement, placing the patient in a bed with the early-warning context
//! schedules an observation, and each observation schedules the next.

mod admission;
mod movement;
mod observation;
mod placement;
mod spell;

pub use admission::Admission;
pub use movement::Move;
pub use observation::EwsObservation;
pub use placement::Placement;
pub use spell::Spell;

use crate::config::CoreConfig;
use crate::registry::TypeRegistry;
use crate::CoreResult;

/// Register the spell, admission, placement, move and EWS observation types.
///
/// # Errors
///
/// Returns [`crate::CoreError::Conflict`] if any of the names is already taken.
pub fn register_clinical_types(registry: &mut TypeRegistry, cfg: &CoreConfig) -> CoreResult<()> {
    registry.register(Spell::new(cfg))?;
    registry.register(Admission::new())?;
    registry.register(Placement::new(cfg))?;
    registry.register(Move)?;
    registry.register(EwsObservation::new(cfg))?;
    Ok(())
}
