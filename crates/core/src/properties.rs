//! Property checks over arbitrary inbound tickets.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::collection::btree_map;
use proptest::prelude::*;

use crate::blocks::Block;
use crate::domain::ticket::{
    RawTicket, Ticket, TicketFields, TicketId, FIELD_NAMES, IDENTITY_ATTRIBUTES,
};
use crate::errors::TicketError;
use crate::fakes::{InMemoryTicketStore, RecordingSink, StaticDirectory};
use crate::ports::TicketStore;
use crate::render::{self, FIELDS_BLOCK_ID};
use crate::service::TicketService;

const CHANNEL: &str = "https://hooks.slack.test/services/T/B/X";
const FIELD_LABELS: [&str; 4] = ["Requester", "Status", "Agent", "Priority"];

#[derive(Clone, Debug)]
struct Inbound {
    identity: [String; 4],
    fields: [Option<String>; 4],
    extra: BTreeMap<String, String>,
}

impl Inbound {
    fn raw(&self) -> RawTicket {
        let mut raw: RawTicket = self
            .extra
            .iter()
            .filter(|(key, _)| {
                !IDENTITY_ATTRIBUTES.contains(&key.as_str()) && !FIELD_NAMES.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in IDENTITY_ATTRIBUTES.iter().zip(&self.identity) {
            raw.insert(*key, value.clone());
        }
        for (key, value) in FIELD_NAMES.iter().zip(&self.fields) {
            if let Some(value) = value {
                raw.insert(*key, value.clone());
            }
        }
        raw
    }

    fn expected(&self) -> Ticket {
        let field = |index: usize| self.fields[index].clone().unwrap_or_default();
        Ticket {
            id: TicketId(self.identity[0].clone()),
            link: self.identity[1].clone(),
            title: self.identity[2].clone(),
            description: self.identity[3].clone(),
            fields: TicketFields {
                requester: field(0),
                status: field(1),
                agent: field(2),
                priority: field(3),
            },
        }
    }
}

fn identity_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ._:/#-]{0,24}"
}

fn field_value() -> impl Strategy<Value = Option<String>> {
    proptest::option::of(prop_oneof![
        Just(String::new()),
        Just("   ".to_owned()),
        "[ -~]{0,24}",
    ])
}

fn inbound() -> impl Strategy<Value = Inbound> {
    (
        proptest::array::uniform4(identity_value()),
        proptest::array::uniform4(field_value()),
        btree_map("[a-z_]{1,10}", "[ -~]{0,16}", 0..4),
    )
        .prop_map(|(identity, fields, extra)| Inbound { identity, fields, extra })
}

fn non_updatable_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("status".to_owned()),
        Just("requester".to_owned()),
        Just("Agent".to_owned()),
        Just(String::new()),
        "[a-zA-Z_.]{1,12}".prop_filter("updatable field", |name| {
            name != "agent" && name != "priority"
        }),
    ]
}

fn harness() -> (Arc<InMemoryTicketStore>, Arc<RecordingSink>, TicketService) {
    let store = Arc::new(InMemoryTicketStore::default());
    let sink = Arc::new(RecordingSink::default());
    let directory = Arc::new(StaticDirectory::default().with_user("U024BE7LH", "Jane Doe"));
    let service = TicketService::new(store.clone(), directory, sink.clone(), CHANNEL);
    (store, sink, service)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().build().expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn create_then_find_returns_recognised_subset(inbound in inbound()) {
        let (_, _, service) = harness();
        let expected = inbound.expected();

        let found = runtime().block_on(async {
            service.create(&inbound.raw()).await?;
            service.find(&expected.id).await
        });

        prop_assert_eq!(found, Ok(expected));
    }

    #[test]
    fn non_updatable_names_are_rejected_without_side_effects(
        inbound in inbound(),
        name in non_updatable_name(),
        value in "\\PC{0,24}"
    ) {
        let (store, sink, service) = harness();
        let rt = runtime();
        let created = rt.block_on(service.create(&inbound.raw())).expect("create");
        let mut working = created.clone();

        let result = rt.block_on(service.update_field(&mut working, &name, &value));

        prop_assert_eq!(result, Err(TicketError::UnsupportedField(name.clone())));
        prop_assert_eq!(&working, &created);
        let stored = rt.block_on(store.get(&created.id)).expect("get");
        prop_assert_eq!(stored, Some(created));
        prop_assert!(sink.sent().is_empty());
    }

    #[test]
    fn render_is_stable_and_keeps_field_order(inbound in inbound(), interactive in any::<bool>()) {
        let ticket = inbound.expected();

        let first = serde_json::to_string(&render::render(&ticket, interactive)).expect("serialize");
        let second = serde_json::to_string(&render::render(&ticket, interactive)).expect("serialize");
        prop_assert_eq!(first, second);

        let payload = render::render(&ticket, interactive);
        let rendered: Vec<String> = payload
            .blocks
            .iter()
            .find_map(|block| match block {
                Block::Section { block_id, fields, .. } if block_id == FIELDS_BLOCK_ID => {
                    Some(fields.iter().map(|field| field.text().to_owned()).collect())
                }
                _ => None,
            })
            .unwrap_or_default();
        let expected: Vec<String> = FIELD_NAMES
            .iter()
            .zip(FIELD_LABELS)
            .map(|(key, label)| format!("*{label}*\n{}", ticket.fields.get(key).unwrap_or_default()))
            .collect();
        prop_assert_eq!(rendered, expected);
    }
}
