use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TicketError;

/// Identity attributes every inbound ticket must carry.
pub const IDENTITY_ATTRIBUTES: [&str; 4] = ["id", "link", "title", "description"];

/// Mutable field keys in canonical display order.
pub const FIELD_NAMES: [&str; 4] = ["requester", "status", "agent", "priority"];

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The four mutable fields. An unset field is the empty string; a field is never absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFields {
    #[serde(default)]
    pub requester: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub priority: String,
}

impl TicketFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "requester" => Some(&self.requester),
            "status" => Some(&self.status),
            "agent" => Some(&self.agent),
            "priority" => Some(&self.priority),
            _ => None,
        }
    }

    /// `(key, value)` pairs in [`FIELD_NAMES`] order.
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            (FIELD_NAMES[0], self.requester.as_str()),
            (FIELD_NAMES[1], self.status.as_str()),
            (FIELD_NAMES[2], self.agent.as_str()),
            (FIELD_NAMES[3], self.priority.as_str()),
        ]
    }

    fn slot_mut(&mut self, field: UpdatableField) -> &mut String {
        match field {
            UpdatableField::Agent => &mut self.agent,
            UpdatableField::Priority => &mut self.priority,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub link: String,
    pub title: String,
    pub description: String,
    pub fields: TicketFields,
}

impl Ticket {
    /// Builds a ticket from an inbound record, keeping only recognised field keys.
    pub fn from_raw(raw: &RawTicket) -> Result<Self, TicketError> {
        let missing: Vec<&str> = IDENTITY_ATTRIBUTES
            .iter()
            .copied()
            .filter(|attr| raw.get(attr).map(|value| value.trim().is_empty()).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(TicketError::Validation(format!(
                "missing required ticket attributes: {}",
                missing.join(", ")
            )));
        }

        let text = |key: &str| raw.get(key).unwrap_or_default().to_owned();
        Ok(Self {
            id: TicketId(text("id")),
            link: text("link"),
            title: text("title"),
            description: text("description"),
            fields: TicketFields {
                requester: text("requester"),
                status: text("status"),
                agent: text("agent"),
                priority: text("priority"),
            },
        })
    }

    /// Slack link markup for the ticket title, `<link|title>`.
    pub fn title_link(&self) -> String {
        format!("<{}|{}>", self.link, self.title)
    }

    /// Returns a copy with one updatable field replaced. Identity attributes are untouched.
    pub fn with_field(&self, field: UpdatableField, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        *next.fields.slot_mut(field) = value.into();
        next
    }
}

/// Fields that interactive actions may change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdatableField {
    Agent,
    Priority,
}

impl UpdatableField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Priority => "priority",
        }
    }
}

impl fmt::Display for UpdatableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatableField {
    type Err = TicketError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "agent" => Ok(Self::Agent),
            "priority" => Ok(Self::Priority),
            other => Err(TicketError::UnsupportedField(other.to_owned())),
        }
    }
}

/// Priority labels offered by the "set priority" selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|priority| priority.label() == label)
    }
}

/// An inbound ticket record as received from the ticketing webhook, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawTicket {
    entries: BTreeMap<String, String>,
}

impl RawTicket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Accepts a JSON object. Strings are taken as-is, numbers and booleans by their textual
    /// form; nulls, arrays and nested objects are ignored.
    pub fn from_json(value: &Value) -> Result<Self, TicketError> {
        let Some(object) = value.as_object() else {
            return Err(TicketError::Validation("ticket payload must be a JSON object".to_owned()));
        };

        let mut raw = Self::new();
        for (key, value) in object {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            raw.insert(key.clone(), text);
        }
        Ok(raw)
    }
}

impl<K, V> FromIterator<(K, V)> for RawTicket
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut raw = Self::new();
        for (key, value) in iter {
            raw.insert(key, value);
        }
        raw
    }
}
