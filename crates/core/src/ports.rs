//! Collaborator seams consumed by the ticket service.
//!
//! - `TicketStore` - key-value persistence keyed by ticket id
//! - `Directory` - resolves an opaque user reference to a display identity
//! - `NotificationSink` - delivers rendered messages to an endpoint or a user's DM

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::MessagePayload;
use crate::domain::ticket::{Ticket, TicketId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("stored ticket could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user `{0}` is not known to the directory")]
    UnknownUser(String),
    #[error("directory request failed: {0}")]
    Request(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("notification request to {destination} failed: {reason}")]
    Request { destination: String, reason: String },
    #[error("notification rejected by {destination}: {reason}")]
    Rejected { destination: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

/// Where a rendered message goes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// An incoming-webhook or `response_url` endpoint.
    Endpoint(String),
    /// A direct message to the user with this id.
    DirectMessage(String),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(url) => write!(f, "endpoint {url}"),
            Self::DirectMessage(user_id) => write!(f, "dm:{user_id}"),
        }
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError>;
    /// Writes the full record, replacing any previous one for the same id.
    async fn put(&self, ticket: &Ticket) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn resolve(&self, user_ref: &str) -> Result<Identity, DirectoryError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        destination: &Destination,
        payload: &MessagePayload,
    ) -> Result<(), DispatchError>;
}
