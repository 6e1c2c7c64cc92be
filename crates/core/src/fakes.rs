//! In-process collaborators for tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::blocks::MessagePayload;
use crate::domain::ticket::{Ticket, TicketId};
use crate::ports::{
    Destination, Directory, DirectoryError, DispatchError, Identity, NotificationSink, StoreError,
    TicketStore,
};

#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<String, Ticket>>,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl InMemoryTicketStore {
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every later `put` sleeps this long before writing.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(id.as_str()).cloned())
    }

    async fn put(&self, ticket: &Ticket) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".to_owned()));
        }
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0.clone(), ticket.clone());
        Ok(())
    }
}

/// Resolves only the users registered with [`StaticDirectory::with_user`].
#[derive(Default)]
pub struct StaticDirectory {
    users: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn with_user(mut self, id: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.users.insert(id.into(), display_name.into());
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn resolve(&self, user_ref: &str) -> Result<Identity, DirectoryError> {
        self.users
            .get(user_ref)
            .map(|display_name| Identity {
                id: user_ref.to_owned(),
                display_name: display_name.clone(),
            })
            .ok_or_else(|| DirectoryError::UnknownUser(user_ref.to_owned()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(Destination, MessagePayload)>>,
    fail_endpoints: AtomicBool,
    fail_direct_messages: AtomicBool,
}

impl RecordingSink {
    pub fn set_fail_endpoints(&self, fail: bool) {
        self.fail_endpoints.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_direct_messages(&self, fail: bool) {
        self.fail_direct_messages.store(fail, Ordering::SeqCst);
    }

    /// Every attempted send, including ones that were made to fail.
    pub fn sent(&self) -> Vec<(Destination, MessagePayload)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, destination: &Destination) -> Vec<MessagePayload> {
        self.sent()
            .into_iter()
            .filter(|(sent_to, _)| sent_to == destination)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(
        &self,
        destination: &Destination,
        payload: &MessagePayload,
    ) -> Result<(), DispatchError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push((destination.clone(), payload.clone())),
            Err(poisoned) => poisoned.into_inner().push((destination.clone(), payload.clone())),
        }

        let fail = match destination {
            Destination::Endpoint(_) => self.fail_endpoints.load(Ordering::SeqCst),
            Destination::DirectMessage(_) => self.fail_direct_messages.load(Ordering::SeqCst),
        };
        if fail {
            return Err(DispatchError::Request {
                destination: destination.to_string(),
                reason: "connection refused".to_owned(),
            });
        }
        Ok(())
    }
}
