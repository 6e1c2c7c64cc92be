//! Ticket lifecycle: creation, lookup and the field-update transition.
//!
//! A transition computes the updated ticket in memory, sends the notifications derived from
//! that new state and waits for them, then writes the full record. Notification failures are
//! reported in the [`TransitionReport`] but never undo the write; a directory failure aborts
//! before anything is sent or written.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::domain::ticket::{Priority, RawTicket, Ticket, TicketId, UpdatableField};
use crate::errors::TicketError;
use crate::ports::{Destination, Directory, DispatchError, NotificationSink, TicketStore};
use crate::render;

#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    directory: Arc<dyn Directory>,
    sink: Arc<dyn NotificationSink>,
    channel_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub destination: Destination,
    pub result: Result<(), DispatchError>,
}

/// What a successful transition changed and how its notifications fared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionReport {
    pub field: UpdatableField,
    pub previous: String,
    pub current: String,
    pub notifications: Vec<NotificationOutcome>,
}

impl TransitionReport {
    pub fn all_delivered(&self) -> bool {
        self.notifications.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &DispatchError> {
        self.notifications.iter().filter_map(|outcome| outcome.result.as_ref().err())
    }
}

impl TicketService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        directory: Arc<dyn Directory>,
        sink: Arc<dyn NotificationSink>,
        channel_url: impl Into<String>,
    ) -> Self {
        Self { store, directory, sink, channel_url: channel_url.into() }
    }

    pub fn channel_url(&self) -> &str {
        &self.channel_url
    }

    /// Validates and persists an inbound ticket. An existing record with the same id is
    /// overwritten.
    pub async fn create(&self, raw: &RawTicket) -> Result<Ticket, TicketError> {
        let ticket = Ticket::from_raw(raw)?;
        self.store.put(&ticket).await?;

        info!(
            event_name = "ticket.created",
            ticket_id = %ticket.id,
            "ticket stored"
        );
        Ok(ticket)
    }

    pub async fn find(&self, id: &TicketId) -> Result<Ticket, TicketError> {
        self.store.get(id).await?.ok_or_else(|| TicketError::NotFound(id.clone()))
    }

    /// Changes one updatable field. On success `ticket` holds the persisted state.
    pub async fn update_field(
        &self,
        ticket: &mut Ticket,
        name: &str,
        value: &str,
    ) -> Result<TransitionReport, TicketError> {
        let field: UpdatableField = name.parse()?;
        let (updated, notifications) = match field {
            UpdatableField::Agent => self.assign_agent(ticket, value).await?,
            UpdatableField::Priority => self.set_priority(ticket, value).await,
        };

        self.store.put(&updated).await.map_err(|store_error| {
            error!(
                event_name = "ticket.transition.persist_failed",
                ticket_id = %ticket.id,
                field = %field,
                error = %store_error,
                "ticket transition could not be persisted"
            );
            TicketError::from(store_error)
        })?;

        let report = TransitionReport {
            field,
            previous: ticket.fields.get(field.as_str()).unwrap_or_default().to_owned(),
            current: updated.fields.get(field.as_str()).unwrap_or_default().to_owned(),
            notifications,
        };
        for failure in report.failures() {
            warn!(
                event_name = "ticket.notification.failed",
                ticket_id = %ticket.id,
                field = %field,
                error = %failure,
                "transition notification was not delivered"
            );
        }
        info!(
            event_name = "ticket.transition.applied",
            ticket_id = %ticket.id,
            field = %field,
            previous = %report.previous,
            current = %report.current,
            "ticket field updated"
        );

        *ticket = updated;
        Ok(report)
    }

    /// Renders the interactive message for `ticket` and sends it to `url`, or to the default
    /// channel endpoint.
    pub async fn post_to_channel(&self, ticket: &Ticket, url: Option<&str>) -> Result<(), TicketError> {
        let destination = Destination::Endpoint(url.unwrap_or(&self.channel_url).to_owned());
        let payload = render::render(ticket, true).replacing_original();

        self.sink.send(&destination, &payload).await.map_err(|dispatch_error| {
            warn!(
                event_name = "ticket.channel_post.failed",
                ticket_id = %ticket.id,
                error = %dispatch_error,
                "ticket message was not delivered"
            );
            TicketError::from(dispatch_error)
        })?;

        debug!(event_name = "ticket.channel_post.sent", ticket_id = %ticket.id, "ticket message sent");
        Ok(())
    }

    async fn assign_agent(
        &self,
        ticket: &Ticket,
        user_ref: &str,
    ) -> Result<(Ticket, Vec<NotificationOutcome>), TicketError> {
        let identity = self.directory.resolve(user_ref).await.map_err(|directory_error| {
            error!(
                event_name = "ticket.directory.lookup_failed",
                ticket_id = %ticket.id,
                user_ref = %user_ref,
                error = %directory_error,
                "agent could not be resolved"
            );
            TicketError::from(directory_error)
        })?;

        let updated = ticket.with_field(UpdatableField::Agent, identity.display_name.as_str());
        let direct = Destination::DirectMessage(identity.id);
        let channel = self.channel();
        let dm_payload = render::assignment_dm(&updated);
        let notice = render::agent_assigned_notice(&updated);

        let (dm_result, channel_result) = tokio::join!(
            self.sink.send(&direct, &dm_payload),
            self.sink.send(&channel, &notice),
        );

        Ok((
            updated,
            vec![
                NotificationOutcome { destination: direct, result: dm_result },
                NotificationOutcome { destination: channel, result: channel_result },
            ],
        ))
    }

    async fn set_priority(&self, ticket: &Ticket, value: &str) -> (Ticket, Vec<NotificationOutcome>) {
        if Priority::from_label(value).is_none() {
            debug!(
                event_name = "ticket.priority.unlisted",
                ticket_id = %ticket.id,
                priority = %value,
                "priority is not one of the offered labels"
            );
        }

        let updated = ticket.with_field(UpdatableField::Priority, value);
        let channel = self.channel();
        let result = self.sink.send(&channel, &render::priority_changed_notice(&updated)).await;
        (updated, vec![NotificationOutcome { destination: channel, result }])
    }

    fn channel(&self) -> Destination {
        Destination::Endpoint(self.channel_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::TicketService;
    use crate::blocks::{Block, MessagePayload};
    use crate::domain::ticket::{RawTicket, TicketId, UpdatableField};
    use crate::errors::{TicketError, TicketErrorKind};
    use crate::fakes::{InMemoryTicketStore, RecordingSink, StaticDirectory};
    use crate::ports::{Destination, TicketStore};
    use crate::render;

    const CHANNEL: &str = "https://hooks.slack.test/services/T/B/X";

    struct Harness {
        store: Arc<InMemoryTicketStore>,
        sink: Arc<RecordingSink>,
        service: TicketService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryTicketStore::default());
        let sink = Arc::new(RecordingSink::default());
        let directory = Arc::new(StaticDirectory::default().with_user("U024BE7LH", "Jane Doe"));
        let service = TicketService::new(store.clone(), directory, sink.clone(), CHANNEL);
        Harness { store, sink, service }
    }

    fn sample_raw() -> RawTicket {
        RawTicket::new()
            .with("id", "1234")
            .with("link", "https://x")
            .with("title", "Test ticket")
            .with("description", "fire")
            .with("requester", "Bob")
            .with("status", "Open")
            .with("agent", "Jane")
            .with("priority", "High")
    }

    fn channel() -> Destination {
        Destination::Endpoint(CHANNEL.to_owned())
    }

    fn texts(payloads: &[MessagePayload]) -> Vec<&str> {
        payloads.iter().map(|payload| payload.text.as_str()).collect()
    }

    #[tokio::test]
    async fn create_then_find_round_trips_recognised_fields() {
        let h = harness();
        let created = h.service.create(&sample_raw().with("severity", "sev1")).await.expect("create");

        let found = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(found, created);
        assert_eq!(found.fields.requester, "Bob");
        assert_eq!(found.fields.get("severity"), None);
    }

    #[tokio::test]
    async fn create_rejects_missing_identity_without_persisting() {
        let h = harness();
        let error = h
            .service
            .create(&RawTicket::new().with("id", "1").with("title", "t"))
            .await
            .expect_err("invalid");

        assert_eq!(error.kind(), TicketErrorKind::Validation);
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn create_overwrites_existing_record() {
        let h = harness();
        h.service.create(&sample_raw()).await.expect("first create");
        h.service.create(&sample_raw().with("status", "Closed")).await.expect("second create");

        let found = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(found.fields.status, "Closed");
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn find_unknown_id_is_not_found() {
        let h = harness();
        h.service.create(&sample_raw()).await.expect("create");

        let error = h.service.find(&TicketId::from("does-not-exist")).await.expect_err("missing");
        assert_eq!(error, TicketError::NotFound(TicketId::from("does-not-exist")));
    }

    #[tokio::test]
    async fn status_is_not_an_updatable_field() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");

        for value in ["Closed", "", "Open"] {
            let error =
                h.service.update_field(&mut ticket, "status", value).await.expect_err("unsupported");
            assert_eq!(error.kind(), TicketErrorKind::UnsupportedField);
        }
        assert_eq!(ticket.fields.status, "Open");
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn new_ticket_posts_exact_interactive_render_to_channel() {
        let h = harness();
        let ticket = h.service.create(&sample_raw()).await.expect("create");

        h.service.post_to_channel(&ticket, None).await.expect("post");

        let sent = h.sink.sent_to(&channel());
        assert_eq!(sent, vec![render::render(&ticket, true).replacing_original()]);
        assert_eq!(sent[0].action_ids().len(), 3);
    }

    #[tokio::test]
    async fn post_to_channel_honours_explicit_url() {
        let h = harness();
        let ticket = h.service.create(&sample_raw()).await.expect("create");
        let response_url = Destination::Endpoint("https://hooks.slack.test/actions/1".to_owned());

        h.service
            .post_to_channel(&ticket, Some("https://hooks.slack.test/actions/1"))
            .await
            .expect("post");

        assert_eq!(h.sink.sent_to(&response_url).len(), 1);
        assert!(h.sink.sent_to(&channel()).is_empty());
    }

    #[tokio::test]
    async fn post_to_channel_surfaces_dispatch_failure() {
        let h = harness();
        let ticket = h.service.create(&sample_raw()).await.expect("create");
        h.sink.set_fail_endpoints(true);

        let error = h.service.post_to_channel(&ticket, None).await.expect_err("dispatch fails");
        assert_eq!(error.kind(), TicketErrorKind::Dispatch);
    }

    #[tokio::test]
    async fn priority_transition_persists_and_announces_new_value() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");

        let report = h.service.update_field(&mut ticket, "priority", "Low").await.expect("update");

        assert_eq!(report.field, UpdatableField::Priority);
        assert_eq!((report.previous.as_str(), report.current.as_str()), ("High", "Low"));
        assert!(report.all_delivered());
        assert_eq!(ticket.fields.priority, "Low");

        let stored = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(stored.fields.priority, "Low");
        let announcements = h.sink.sent_to(&channel());
        assert!(texts(&announcements).iter().any(|text| text.contains("Priority is now Low")));
    }

    #[tokio::test]
    async fn priority_accepts_values_outside_offered_labels() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");

        h.service.update_field(&mut ticket, "priority", "Urgent").await.expect("update");

        let stored = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(stored.fields.priority, "Urgent");
    }

    #[tokio::test]
    async fn agent_transition_resolves_directory_and_notifies_both_destinations() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");

        let report = h.service.update_field(&mut ticket, "agent", "U024BE7LH").await.expect("update");

        assert_eq!(report.current, "Jane Doe");
        assert_eq!(report.notifications.len(), 2);
        let stored = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(stored.fields.agent, "Jane Doe");

        let direct = h.sink.sent_to(&Destination::DirectMessage("U024BE7LH".to_owned()));
        assert_eq!(direct, vec![render::assignment_dm(&stored)]);
        assert!(direct[0].action_ids().is_empty());

        let announcements = h.sink.sent_to(&channel());
        assert_eq!(
            texts(&announcements),
            vec!["<https://x|Test ticket> updated! Agent Jane Doe is now assigned"]
        );
    }

    #[tokio::test]
    async fn notifications_reference_new_value_not_previous() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");

        h.service.update_field(&mut ticket, "agent", "U024BE7LH").await.expect("update");

        let direct = h.sink.sent_to(&Destination::DirectMessage("U024BE7LH".to_owned()));
        let agent_entry = direct[0].blocks.iter().find_map(|block| match block {
            Block::Section { block_id, fields, .. } if block_id == render::FIELDS_BLOCK_ID => {
                fields.get(2).map(|field| field.text().to_owned())
            }
            _ => None,
        });
        assert_eq!(agent_entry.as_deref(), Some("*Agent*\nJane Doe"));

        let notice = h.sink.sent_to(&channel());
        assert_eq!(
            texts(&notice),
            vec!["<https://x|Test ticket> updated! Agent Jane Doe is now assigned"]
        );
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_roll_back_agent_assignment() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");
        h.sink.set_fail_endpoints(true);
        h.sink.set_fail_direct_messages(true);

        let report = h.service.update_field(&mut ticket, "agent", "U024BE7LH").await.expect("update");

        assert!(!report.all_delivered());
        assert_eq!(report.failures().count(), 2);
        let stored = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(stored.fields.agent, "Jane Doe");
    }

    #[tokio::test]
    async fn directory_failure_leaves_stored_and_caller_ticket_unchanged() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");

        let error =
            h.service.update_field(&mut ticket, "agent", "U_UNKNOWN").await.expect_err("lookup");

        assert_eq!(error.kind(), TicketErrorKind::DirectoryLookup);
        assert_eq!(ticket.fields.agent, "Jane");
        let stored = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(stored.fields.agent, "Jane");
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_leaves_caller_ticket_unchanged() {
        let h = harness();
        let mut ticket = h.service.create(&sample_raw()).await.expect("create");
        h.store.set_fail_writes(true);

        let error = h.service.update_field(&mut ticket, "priority", "Low").await.expect_err("write");

        assert_eq!(error.kind(), TicketErrorKind::Persistence);
        assert_eq!(ticket.fields.priority, "High");
        let stored = h.store.get(&TicketId::from("1234")).await.expect("get").expect("present");
        assert_eq!(stored.fields.priority, "High");
    }

    #[tokio::test]
    async fn concurrent_stale_updates_resolve_to_last_write() {
        let h = harness();
        h.service.create(&sample_raw()).await.expect("create");
        let mut first = h.service.find(&TicketId::from("1234")).await.expect("find");
        let mut second = h.service.find(&TicketId::from("1234")).await.expect("find");

        h.service.update_field(&mut first, "priority", "Low").await.expect("first update");
        h.service.update_field(&mut second, "agent", "U024BE7LH").await.expect("second update");

        let stored = h.service.find(&TicketId::from("1234")).await.expect("find");
        assert_eq!(stored, second);
        assert_eq!(stored.fields.priority, "High");
        assert_eq!(stored.fields.agent, "Jane Doe");
    }
}
