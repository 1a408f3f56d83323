// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lenient deserializers for request payloads.
//!
//! Clients send unset references as `null`, `""` or the nil UUID, and unset
//! states as `null` or `""`. All of them decode to `None`.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use uuid::Uuid;

/// Decode an optional entity reference.
pub fn reference<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let id = Uuid::parse_str(value).map_err(de::Error::custom)?;
            Ok((!id.is_nil()).then_some(id))
        }
    }
}

/// Decode an optional enum value, treating an empty string as absent.
pub fn optional_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Decode an optional enum value, treating unknown values as absent.
///
/// Used where the caller reports a missing value with its own error.
pub fn lenient_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[serde(default, deserialize_with = "reference")]
        vpc: Option<Uuid>,
    }

    #[test]
    fn test_reference_variants() {
        let id = Uuid::new_v4();

        let parsed: Payload = serde_json::from_value(serde_json::json!({ "vpc": id })).unwrap();
        assert_eq!(parsed.vpc, Some(id));

        for empty in [
            serde_json::json!({}),
            serde_json::json!({ "vpc": null }),
            serde_json::json!({ "vpc": "" }),
            serde_json::json!({ "vpc": Uuid::nil() }),
        ] {
            let parsed: Payload = serde_json::from_value(empty).unwrap();
            assert_eq!(parsed.vpc, None);
        }
    }

    #[derive(Debug, Deserialize)]
    struct StatePayload {
        #[serde(default, deserialize_with = "lenient_enum")]
        state: Option<crate::disk::DiskState>,
    }

    #[test]
    fn test_lenient_enum_drops_unknown_values() {
        let parsed: StatePayload =
            serde_json::from_value(serde_json::json!({ "state": "backup" })).unwrap();
        assert_eq!(parsed.state, Some(crate::disk::DiskState::Backup));

        for unset in [
            serde_json::json!({}),
            serde_json::json!({ "state": "" }),
            serde_json::json!({ "state": "frozen" }),
        ] {
            let parsed: StatePayload = serde_json::from_value(unset).unwrap();
            assert_eq!(parsed.state, None);
        }
    }

    #[test]
    fn test_reference_rejects_garbage() {
        let result: Result<Payload, _> =
            serde_json::from_value(serde_json::json!({ "vpc": "not-a-uuid" }));
        assert!(result.is_err());
    }
}
