//! Inbound HTTP surface: the helpdesk webhook and Slack's interactivity callback.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use ticketrelay_core::{
    InterfaceError, RawTicket, TicketError, TicketErrorKind, TicketId, TicketService,
};
use ticketrelay_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use ticketrelay_slack::{
    parse_form, RequestProof, RequestVerifier, TicketAction, VerificationError,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

pub const BANNER: &str = "<h2>The ticket relay is running</h2> <p>Point the helpdesk webhook at \
     <code>/incoming</code> and the Slack app's interactivity URL at \
     <code>/interactive-message</code>.</p>";
pub const TICKET_NOT_CREATED: &str = "The ticket was not created";

#[derive(Clone)]
pub struct RelayState {
    service: TicketService,
    verifier: Arc<RequestVerifier>,
    in_flight: InFlight,
}

impl RelayState {
    pub fn new(service: TicketService, verifier: RequestVerifier) -> Self {
        Self { service, verifier: Arc::new(verifier), in_flight: InFlight::default() }
    }

    /// Handle on the transitions still running after their request was acknowledged.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }
}

/// Background work spawned by handlers. Drained on shutdown before the pool closes.
#[derive(Clone, Default)]
pub struct InFlight {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl InFlight {
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Waits for every spawned task; returns how many were still tracked.
    pub async fn drain(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let mut drained = 0;
        while let Some(joined) = tasks.join_next().await {
            drained += 1;
            if let Err(join_error) = joined {
                error!(
                    event_name = "system.server.task_failed",
                    correlation_id = "shutdown",
                    error = %join_error,
                    "background action did not finish"
                );
            }
        }
        drained
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/incoming", post(incoming))
        .route("/interactive-message", post(interactive_message))
        .with_state(state)
}

/// JSON error body; never carries internal error text.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    correlation_id: &'a str,
}

#[derive(Debug)]
pub struct HttpError(InterfaceError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody { error: self.0.user_message(), correlation_id: self.0.correlation_id() };
        (status, Json(body)).into_response()
    }
}

async fn banner() -> Html<&'static str> {
    Html(BANNER)
}

async fn incoming(State(state): State<RelayState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    debug!(
        event_name = "http.incoming.received",
        correlation_id = %correlation_id,
        bytes = body.len(),
        "incoming ticket received"
    );

    match ingest(&state.service, &headers, &body).await {
        Ok(ticket_id) => {
            info!(
                event_name = "http.incoming.relayed",
                correlation_id = %correlation_id,
                ticket_id = %ticket_id,
                "ticket stored and posted to channel"
            );
            StatusCode::OK.into_response()
        }
        Err(ticket_error) => {
            warn!(
                event_name = "http.incoming.rejected",
                correlation_id = %correlation_id,
                kind = ?ticket_error.kind(),
                error = %ticket_error,
                "incoming ticket was not relayed"
            );
            (StatusCode::BAD_REQUEST, TICKET_NOT_CREATED).into_response()
        }
    }
}

async fn ingest(
    service: &TicketService,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<TicketId, TicketError> {
    let raw = read_ticket(headers, body)?;
    let ticket = service.create(&raw).await?;
    service.post_to_channel(&ticket, None).await?;
    Ok(ticket.id)
}

fn read_ticket(headers: &HeaderMap, body: &[u8]) -> Result<RawTicket, TicketError> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        return Ok(form_urlencoded::parse(body).into_owned().collect());
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|error| TicketError::Validation(format!("ticket body is not JSON: {error}")))?;
    RawTicket::from_json(&value)
}

/// Verifies and acknowledges at once; the transition and re-render run afterwards.
async fn interactive_message(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    let correlation_id = Uuid::new_v4().to_string();
    let bad_request = |message: String| {
        HttpError(InterfaceError::BadRequest { message, correlation_id: correlation_id.clone() })
    };

    let unauthorized = |verification_error: VerificationError| {
        warn!(
            event_name = "http.interactive.unverified",
            correlation_id = %correlation_id,
            error = %verification_error,
            "interactive request failed verification"
        );
        HttpError(InterfaceError::Unauthorized {
            message: verification_error.to_string(),
            correlation_id: correlation_id.clone(),
        })
    };

    // The signature covers the raw body, so nothing is parsed before it passes.
    let proof = RequestProof {
        timestamp: header_text(&headers, TIMESTAMP_HEADER),
        signature: header_text(&headers, SIGNATURE_HEADER),
        body: &body,
        token: None,
    };
    state.verifier.verify_signature(&proof).map_err(unauthorized)?;

    let payload = match parse_form(&body) {
        Ok(payload) => payload,
        // Without a signature the token inside the payload is the only proof.
        Err(_) if state.verifier.expects_token() => {
            return Err(unauthorized(VerificationError::Missing("token")));
        }
        Err(payload_error) => {
            warn!(
                event_name = "http.interactive.malformed",
                correlation_id = %correlation_id,
                error = %payload_error,
                "interactive payload could not be parsed"
            );
            return Err(bad_request(payload_error.to_string()));
        }
    };
    state.verifier.verify_token(payload.token.as_deref()).map_err(unauthorized)?;

    let action = payload.resolve_action().map_err(|payload_error| {
        warn!(
            event_name = "http.interactive.unresolved",
            correlation_id = %correlation_id,
            error = %payload_error,
            "interactive action could not be resolved"
        );
        bad_request(payload_error.to_string())
    })?;

    info!(
        event_name = "http.interactive.accepted",
        correlation_id = %correlation_id,
        ticket_id = %action.ticket_id,
        field = %action.field,
        acting_user = %payload.user.id,
        "interactive action accepted"
    );
    state.in_flight.spawn(apply_action(state.service.clone(), action, correlation_id));

    Ok(StatusCode::OK)
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn apply_action(service: TicketService, action: TicketAction, correlation_id: String) {
    match transition(&service, &action, &correlation_id).await {
        Ok(()) => debug!(
            event_name = "ticket.action.completed",
            correlation_id = %correlation_id,
            ticket_id = %action.ticket_id,
            "interactive action completed"
        ),
        Err(ticket_error) => log_action_failure(&ticket_error, &action, &correlation_id),
    }
}

async fn transition(
    service: &TicketService,
    action: &TicketAction,
    correlation_id: &str,
) -> Result<(), TicketError> {
    let mut ticket = service.find(&action.ticket_id).await?;
    let report = service.update_field(&mut ticket, &action.field, &action.value).await?;
    debug!(
        event_name = "ticket.action.transitioned",
        correlation_id = %correlation_id,
        ticket_id = %ticket.id,
        delivered = report.all_delivered(),
        "transition applied"
    );

    service.post_to_channel(&ticket, action.response_url.as_deref()).await
}

fn log_action_failure(ticket_error: &TicketError, action: &TicketAction, correlation_id: &str) {
    match ticket_error.kind() {
        TicketErrorKind::NotFound => warn!(
            event_name = "ticket.action.stale_reference",
            correlation_id = %correlation_id,
            ticket_id = %action.ticket_id,
            "action refers to a ticket that is not stored"
        ),
        TicketErrorKind::Validation | TicketErrorKind::UnsupportedField => warn!(
            event_name = "ticket.action.rejected",
            correlation_id = %correlation_id,
            ticket_id = %action.ticket_id,
            field = %action.field,
            error = %ticket_error,
            "action was rejected"
        ),
        TicketErrorKind::Dispatch => warn!(
            event_name = "ticket.action.rerender_failed",
            correlation_id = %correlation_id,
            ticket_id = %action.ticket_id,
            error = %ticket_error,
            "updated ticket message was not delivered"
        ),
        TicketErrorKind::DirectoryLookup | TicketErrorKind::Persistence => error!(
            event_name = "ticket.action.failed",
            correlation_id = %correlation_id,
            ticket_id = %action.ticket_id,
            field = %action.field,
            error = %ticket_error,
            "action could not be applied"
        ),
    }
}
