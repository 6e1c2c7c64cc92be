use thiserror::Error;

use crate::domain::ticket::TicketId;
use crate::ports::{DirectoryError, DispatchError, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("invalid ticket: {0}")]
    Validation(String),
    #[error("ticket `{0}` was not found")]
    NotFound(TicketId),
    #[error("`{0}` is not an updatable ticket field")]
    UnsupportedField(String),
    #[error(transparent)]
    DirectoryLookup(#[from] DirectoryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TicketErrorKind {
    Validation,
    NotFound,
    UnsupportedField,
    DirectoryLookup,
    Dispatch,
    Persistence,
}

impl TicketError {
    pub fn kind(&self) -> TicketErrorKind {
        match self {
            Self::Validation(_) => TicketErrorKind::Validation,
            Self::NotFound(_) => TicketErrorKind::NotFound,
            Self::UnsupportedField(_) => TicketErrorKind::UnsupportedField,
            Self::DirectoryLookup(_) => TicketErrorKind::DirectoryLookup,
            Self::Dispatch(_) => TicketErrorKind::Dispatch,
            Self::Persistence(_) => TicketErrorKind::Persistence,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("upstream failure: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Request verification failed.",
            Self::NotFound { .. } => "The referenced ticket does not exist.",
            Self::BadGateway { .. } => "A chat platform call failed. The ticket state was kept.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<TicketError> for InterfaceError {
    fn from(value: TicketError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            TicketError::Validation(_) | TicketError::UnsupportedField(_) => {
                Self::BadRequest { message, correlation_id }
            }
            TicketError::NotFound(_) => Self::NotFound { message, correlation_id },
            TicketError::DirectoryLookup(_) | TicketError::Dispatch(_) => {
                Self::BadGateway { message, correlation_id }
            }
            TicketError::Persistence(_) => Self::ServiceUnavailable { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::ticket::TicketId;
    use crate::errors::{InterfaceError, TicketError, TicketErrorKind};
    use crate::ports::{DirectoryError, DispatchError, StoreError};

    #[test]
    fn validation_error_maps_to_bad_request_with_correlation_id() {
        let interface =
            TicketError::Validation("missing required ticket attributes: id".to_owned())
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let interface =
            TicketError::NotFound(TicketId("does-not-exist".to_owned())).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        let directory = TicketError::from(DirectoryError::UnknownUser("U1".to_owned()));
        let dispatch = TicketError::from(DispatchError::Rejected {
            destination: "endpoint https://hooks".to_owned(),
            reason: "invalid_payload".to_owned(),
        });

        assert!(matches!(directory.into_interface("req-3"), InterfaceError::BadGateway { .. }));
        assert!(matches!(dispatch.into_interface("req-4"), InterfaceError::BadGateway { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = TicketError::from(StoreError::Backend("database is locked".to_owned()))
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn every_error_reports_a_distinct_kind() {
        let errors = [
            TicketError::Validation(String::new()),
            TicketError::NotFound(TicketId::from("x")),
            TicketError::UnsupportedField("status".to_owned()),
            TicketError::from(DirectoryError::Request("timeout".to_owned())),
            TicketError::from(DispatchError::Request {
                destination: "dm:U1".to_owned(),
                reason: "timeout".to_owned(),
            }),
            TicketError::from(StoreError::Decode("bad row".to_owned())),
        ];
        let kinds: std::collections::HashSet<TicketErrorKind> =
            errors.iter().map(TicketError::kind).collect();

        assert_eq!(kinds.len(), errors.len());
    }
}
