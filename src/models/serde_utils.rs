// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

//! Serde helpers for SurrealDB compatibility.
//!
//! SurrealDB returns record ids as `Thing` values (`table:id` strings or
//! `{ "tb": ..., "id": ... }` objects) while the model structs carry plain
//! string ids. The deserializer below accepts both shapes and keeps only the
//! id portion.

use serde::{Deserialize, Deserializer};

/// Deserializes a SurrealDB record id (Thing or string) into a plain String.
///
/// Handles three wire shapes:
/// - `"table:id"` strings (the table prefix is stripped)
/// - bare `"id"` strings (queries that project `meta::id(id) AS id`)
/// - `{ "tb": "table", "id": "..." }` Thing objects
pub fn deserialize_thing_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ThingOrString {
        Thing { id: ThingId },
        String(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ThingId {
        String(String),
        // Field name must match the JSON key emitted by the SDK
        #[allow(non_snake_case)]
        Object { String: String },
    }

    match ThingOrString::deserialize(deserializer)? {
        ThingOrString::Thing { id } => match id {
            ThingId::String(s) => Ok(s),
            ThingId::Object { String: s } => Ok(s),
        },
        ThingOrString::String(s) => match s.split_once(':') {
            Some((_table, id)) => Ok(id.to_string()),
            None => Ok(s),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Record {
        #[serde(deserialize_with = "deserialize_thing_id")]
        id: String,
    }

    #[test]
    fn test_plain_string_id() {
        let r: Record = serde_json::from_str(r#"{"id": "abc-123"}"#).unwrap();
        assert_eq!(r.id, "abc-123");
    }

    #[test]
    fn test_table_prefixed_id() {
        let r: Record = serde_json::from_str(r#"{"id": "campaign_event:evt_1"}"#).unwrap();
        assert_eq!(r.id, "evt_1");
    }

    #[test]
    fn test_thing_object_id() {
        let r: Record =
            serde_json::from_str(r#"{"id": {"tb": "campaign_event", "id": {"String": "evt_2"}}}"#)
                .unwrap();
        assert_eq!(r.id, "evt_2");
    }
}
