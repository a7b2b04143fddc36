//! Typed access to data record fields.
//!
//! Record fields are untyped JSON. A missing key, `null` and `false` all read as "not set".

use crate::activity::Fields;
use crate::{CoreError, CoreResult};
use careflow_types::TypesError;
use serde_json::Value;

fn present<'a>(fields: &'a Fields, key: &str) -> Option<&'a Value> {
    match fields.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(value) => Some(value),
    }
}

/// Read an integer field.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the field is set to something other than an integer.
pub fn read_i64(fields: &Fields, key: &str) -> CoreResult<Option<i64>> {
    present(fields, key)
        .map(|value| {
            value.as_i64().ok_or_else(|| {
                CoreError::Validation(format!("{key} must be an integer, found to be {value}"))
            })
        })
        .transpose()
}

/// Read an identifier field into one of the validated id types.
pub fn read_id<T>(fields: &Fields, key: &str) -> CoreResult<Option<T>>
where
    T: TryFrom<i64, Error = TypesError>,
{
    read_i64(fields, key)?
        .map(T::try_from)
        .transpose()
        .map_err(CoreError::from)
}

/// Build a [`Fields`] map from key/value pairs.
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Fields {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use careflow_types::LocationId;
    use serde_json::json;

    #[test]
    fn unset_values_read_as_none() {
        let record = fields([("a", Value::Null), ("b", json!(false))]);
        assert_eq!(read_i64(&record, "a").unwrap(), None);
        assert_eq!(read_i64(&record, "b").unwrap(), None);
        assert_eq!(read_i64(&record, "c").unwrap(), None);
    }

    #[test]
    fn ids_are_validated() {
        let record = fields([("location_id", json!(4)), ("pos_id", json!(-1))]);
        let location: Option<LocationId> = read_id(&record, "location_id").unwrap();
        assert_eq!(location, Some(LocationId::new(4).unwrap()));
        assert!(read_id::<LocationId>(&record, "pos_id").is_err());
    }

    #[test]
    fn wrong_type_is_a_validation_error() {
        let record = fields([("frequency", json!("often"))]);
        let err = read_i64(&record, "frequency").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
