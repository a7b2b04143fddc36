use crate::dto::HealthRes;

/// Liveness report shared by every API surface.
///
/// An engine with no registered data types cannot run any activity, so it reports not ok.
pub struct HealthService;

impl HealthService {
    /// # Arguments
    /// * `registered_types` - Number of data types in the engine's registry.
    ///
    /// # Returns
    /// A `HealthRes`, ok when at least one data type is registered.
    pub fn check_health(registered_types: usize) -> HealthRes {
        if registered_types == 0 {
            return HealthRes {
                ok: false,
                message: "careflow is up but no activity types are registered".into(),
            };
        }
        HealthRes {
            ok: true,
            message: format!("careflow is alive, {registered_types} activity types registered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_with_registered_types() {
        let res = HealthService::check_health(5);
        assert!(res.ok);
        assert_eq!(res.message, "careflow is alive, 5 activity types registered");
    }

    #[test]
    fn empty_registry_is_not_ok() {
        assert!(!HealthService::check_health(0).ok);
    }
}
