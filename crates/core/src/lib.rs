pub mod blocks;
pub mod config;
pub mod domain;
pub mod errors;
#[cfg(any(test, feature = "test-support"))]
pub mod fakes;
pub mod ports;
#[cfg(test)]
mod properties;
pub mod render;
pub mod service;

pub use blocks::MessagePayload;
pub use domain::ticket::{Priority, RawTicket, Ticket, TicketFields, TicketId, UpdatableField};
pub use errors::{InterfaceError, TicketError, TicketErrorKind};
pub use ports::{
    Destination, Directory, DirectoryError, DispatchError, Identity, NotificationSink, StoreError,
    TicketStore,
};
pub use service::{NotificationOutcome, TicketService, TransitionReport};
