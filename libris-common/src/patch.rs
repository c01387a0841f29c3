//! Serde helpers for partial updates

use serde::{Deserialize, Deserializer};

/// Deserialize a present key as `Some(value)`, where `value` may be `None`
///
/// Pair with `#[serde(default)]` so an absent key stays `None` and an
/// explicit `null` becomes `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Probe {
        #[serde(deserialize_with = "double_option")]
        value: Option<Option<i64>>,
    }

    #[test]
    fn test_absent_null_and_value() {
        let absent: Probe = serde_json::from_str("{}").unwrap();
        let null: Probe = serde_json::from_str(r#"{"value": null}"#).unwrap();
        let set: Probe = serde_json::from_str(r#"{"value": 3}"#).unwrap();

        assert_eq!(absent.value, None);
        assert_eq!(null.value, Some(None));
        assert_eq!(set.value, Some(Some(3)));
    }
}
