//! User records and their append-only message history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A counterparty the bot talks to.
///
/// Created lazily on the first send or receive that references an unknown
/// id. The history is append-only and ordered by processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Free-form profile, typically filled in by strategy logic.
    #[serde(default = "empty_object")]
    pub profile: serde_json::Value,
    /// Strategy-owned state carried alongside the user.
    #[serde(default = "empty_object")]
    pub custom_state: serde_json::Value,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl User {
    /// A brand-new user with empty profile, state, and history.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            profile: empty_object(),
            custom_state: empty_object(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an inbound entry with this link is already recorded.
    pub fn has_inbound(&self, link: &str) -> bool {
        self.history
            .iter()
            .any(|e| e.direction == Direction::Inbound && e.link.as_deref() == Some(link))
    }
}

/// Which way a history entry travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            other => Err(format!("invalid direction: '{other}'")),
        }
    }
}

/// One message wrapper in a user's history.
///
/// Outbound entries hold the delivery record returned by the transport;
/// inbound entries hold the received wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub direction: Direction,
    pub wrapper: serde_json::Value,
    /// Message link, when the wrapper carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn inbound(wrapper: serde_json::Value, link: Option<String>) -> Self {
        Self {
            direction: Direction::Inbound,
            wrapper,
            link,
            recorded_at: Utc::now(),
        }
    }

    pub fn outbound(wrapper: serde_json::Value) -> Self {
        let link = wrapper
            .get("link")
            .and_then(|l| l.as_str())
            .map(str::to_string);
        Self {
            direction: Direction::Outbound,
            wrapper,
            link,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_user_has_empty_history_and_profile() {
        let user = User::new("ted");
        assert_eq!(user.id, "ted");
        assert!(user.history.is_empty());
        assert_eq!(user.profile, json!({}));
    }

    #[test]
    fn user_deserializes_without_optional_fields() {
        let user: User = serde_json::from_value(json!({
            "id": "bill",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(user.custom_state, json!({}));
        assert!(user.history.is_empty());
    }

    #[test]
    fn has_inbound_matches_only_inbound_links() {
        let mut user = User::new("ted");
        user.history
            .push(HistoryEntry::outbound(json!({"link": "abc"})));
        assert!(!user.has_inbound("abc"));

        user.history
            .push(HistoryEntry::inbound(json!({}), Some("abc".to_string())));
        assert!(user.has_inbound("abc"));
        assert!(!user.has_inbound("def"));
    }

    #[test]
    fn direction_parses_and_displays() {
        assert_eq!("inbound".parse::<Direction>().unwrap(), Direction::Inbound);
        assert_eq!(Direction::Outbound.to_string(), "outbound");
        assert!("sideways".parse::<Direction>().is_err());
    }
}
