//! Interactive message payloads.
//!
//! Slack posts `payload=<json>` as a form body. The action names its target in one of two
//! encodings:
//! - Block Kit: `action_id` is `<field>.<ticket id>`
//! - legacy attachments: `callback_id` is the ticket id and the action `name` is the field
//!
//! A `claim` action is an agent assignment to the acting user.

use serde::Deserialize;
use thiserror::Error;
use url::form_urlencoded;

use ticketrelay_core::domain::ticket::{TicketId, UpdatableField};
use ticketrelay_core::render::CLAIM_ACTION;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionDecodeError {
    #[error("action id is empty")]
    Empty,
    #[error("action id `{0}` has no `.` separator")]
    MissingSeparator(String),
    #[error("action id `{0}` has an empty field name")]
    EmptyField(String),
    #[error("action id `{0}` has an empty ticket id")]
    EmptyTicketId(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("form body has no `payload` field")]
    MissingPayload,
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("payload carries no actions")]
    NoActions,
    #[error("action has neither an action id nor a callback id and name")]
    MissingActionReference,
    #[error(transparent)]
    Action(#[from] ActionDecodeError),
    #[error("action on `{field}` carries no selected value")]
    MissingValue { field: String },
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InteractivePayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: ActingUser,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub callback_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<PayloadAction>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActingUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PayloadAction {
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_user: Option<String>,
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SelectedOption {
    pub value: String,
}

/// A decoded `<field>.<ticket id>` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRef {
    pub field: String,
    pub ticket_id: TicketId,
}

/// What the user asked for, ready for `find` then `update_field`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketAction {
    pub ticket_id: TicketId,
    pub field: String,
    pub value: String,
    pub response_url: Option<String>,
}

/// Splits at the first `.`; everything after it is the ticket id.
pub fn decode_action_id(raw: &str) -> Result<ActionRef, ActionDecodeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ActionDecodeError::Empty);
    }
    let (field, ticket_id) =
        raw.split_once('.').ok_or_else(|| ActionDecodeError::MissingSeparator(raw.to_owned()))?;
    if field.is_empty() {
        return Err(ActionDecodeError::EmptyField(raw.to_owned()));
    }
    if ticket_id.is_empty() {
        return Err(ActionDecodeError::EmptyTicketId(raw.to_owned()));
    }
    Ok(ActionRef { field: field.to_owned(), ticket_id: TicketId(ticket_id.to_owned()) })
}

/// Extracts the JSON `payload` field from a form-encoded body.
pub fn parse_form(body: &[u8]) -> Result<InteractivePayload, PayloadError> {
    let payload = form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or(PayloadError::MissingPayload)?;
    serde_json::from_str(&payload).map_err(|error| PayloadError::Json(error.to_string()))
}

impl InteractivePayload {
    pub fn resolve_action(&self) -> Result<TicketAction, PayloadError> {
        let action = self.actions.first().ok_or(PayloadError::NoActions)?;
        let reference = match (&action.action_id, &self.callback_id, &action.name) {
            (Some(action_id), _, _) => decode_action_id(action_id)?,
            (None, Some(callback_id), Some(name)) if !callback_id.is_empty() && !name.is_empty() => {
                ActionRef { field: name.clone(), ticket_id: TicketId(callback_id.clone()) }
            }
            _ => return Err(PayloadError::MissingActionReference),
        };

        let (field, value) = if reference.field == CLAIM_ACTION {
            (UpdatableField::Agent.as_str().to_owned(), Some(self.user.id.clone()))
        } else {
            let value = action.selected_value().map(str::to_owned);
            (reference.field, value)
        };
        let value = value
            .filter(|value| !value.is_empty())
            .ok_or_else(|| PayloadError::MissingValue { field: field.clone() })?;

        Ok(TicketAction {
            ticket_id: reference.ticket_id,
            field,
            value,
            response_url: self.response_url.clone(),
        })
    }
}

impl PayloadAction {
    fn selected_value(&self) -> Option<&str> {
        self.selected_user
            .as_deref()
            .or(self.selected_option.as_ref().map(|option| option.value.as_str()))
            .or(self.selected_options.first().map(|option| option.value.as_str()))
            .or(self.value.as_deref())
    }
}
