//! Slack plumbing for the ticket relay.
//!
//! - `client` - Web API and webhook client; the directory and notification sink in production
//! - `endpoints` - API base URL resolution and outbound URL rewriting
//! - `signature` - verification token and `X-Slack-Signature` checks
//! - `interactive` - interactive payload parsing and action id decoding

pub mod client;
pub mod endpoints;
pub mod interactive;
pub mod signature;

pub use client::{SlackApiClient, SlackApiError};
pub use endpoints::{EndpointError, SlackEndpoints};
pub use interactive::{
    decode_action_id, parse_form, ActionDecodeError, ActionRef, InteractivePayload, PayloadError,
    TicketAction,
};
pub use signature::{RequestProof, RequestVerifier, VerificationError};
