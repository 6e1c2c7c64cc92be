//! Ticket → Block Kit message rendering.
//!
//! Rendering is pure: the same ticket and flag always produce the same payload, and the
//! field order follows [`FIELD_NAMES`].

use crate::blocks::{Element, MessageBuilder, MessagePayload, SelectOption, TextObject};
use crate::domain::ticket::{Priority, Ticket, UpdatableField, FIELD_NAMES};

pub const NEW_TICKET_TEXT: &str = "You have a new ticket";
pub const ASSIGNMENT_HEADER: &str = "You've been assigned a ticket";

pub const HEADER_BLOCK_ID: &str = "ticket.header.v1";
pub const FIELDS_BLOCK_ID: &str = "ticket.fields.v1";
pub const ACTIONS_BLOCK_ID: &str = "ticket.actions.v1";
pub const ASSIGNMENT_BLOCK_ID: &str = "ticket.assignment.v1";

/// Field segment of the claim button's action id.
pub const CLAIM_ACTION: &str = "claim";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayField {
    pub title: String,
    pub value: String,
}

impl DisplayField {
    fn to_text(&self) -> TextObject {
        TextObject::mrkdwn(format!("*{}*\n{}", self.title, self.value))
    }
}

/// One entry per mutable field, labels capitalised, unset values left empty.
pub fn display_fields(ticket: &Ticket) -> Vec<DisplayField> {
    ticket
        .fields
        .entries()
        .into_iter()
        .map(|(key, value)| DisplayField { title: capitalize(key), value: value.to_owned() })
        .collect()
}

/// Action id for an interactive element, `<field>.<ticket id>`.
pub fn action_id(field: &str, ticket: &Ticket) -> String {
    format!("{field}.{}", ticket.id)
}

pub fn render(ticket: &Ticket, interactive: bool) -> MessagePayload {
    let header = format!("{}\n{}", ticket.title_link(), ticket.description);
    let fields = display_fields(ticket);

    let mut builder = MessageBuilder::new(NEW_TICKET_TEXT)
        .section(HEADER_BLOCK_ID, |section| {
            section.mrkdwn(header);
            if interactive {
                section.accessory(Element::button(action_id(CLAIM_ACTION, ticket), "Claim"));
            }
        })
        .section(FIELDS_BLOCK_ID, |section| {
            for field in &fields {
                section.field(field.to_text());
            }
        });

    if interactive {
        builder = builder.actions(ACTIONS_BLOCK_ID, |actions| {
            actions
                .element(Element::users_select(
                    action_id(UpdatableField::Agent.as_str(), ticket),
                    "Assign agent",
                ))
                .element(Element::static_select(
                    action_id(UpdatableField::Priority.as_str(), ticket),
                    "Set a priority",
                    priority_options(),
                ));
        });
    }

    builder.build()
}

/// The direct message sent to a newly assigned agent.
pub fn assignment_dm(ticket: &Ticket) -> MessagePayload {
    MessageBuilder::new(NEW_TICKET_TEXT)
        .section(ASSIGNMENT_BLOCK_ID, |section| {
            section.plain(ASSIGNMENT_HEADER);
        })
        .divider()
        .extend(render(ticket, false).blocks)
        .build()
}

pub fn agent_assigned_notice(ticket: &Ticket) -> MessagePayload {
    MessagePayload::text(format!(
        "{} updated! Agent {} is now assigned",
        ticket.title_link(),
        ticket.fields.agent
    ))
}

pub fn priority_changed_notice(ticket: &Ticket) -> MessagePayload {
    MessagePayload::text(format!(
        "{} updated! Priority is now {}",
        ticket.title_link(),
        ticket.fields.priority
    ))
}

fn priority_options() -> Vec<SelectOption> {
    Priority::ALL.iter().map(|priority| SelectOption::new(priority.label(), priority.label())).collect()
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
