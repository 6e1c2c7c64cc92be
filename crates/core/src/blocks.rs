use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub text: TextObject,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { text: TextObject::plain(label), value: value.into() }
    }
}

/// Interactive elements. Every variant carries the `action_id` Slack echoes back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Button {
        action_id: String,
        text: TextObject,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    UsersSelect {
        action_id: String,
        placeholder: TextObject,
    },
    StaticSelect {
        action_id: String,
        placeholder: TextObject,
        options: Vec<SelectOption>,
    },
}

impl Element {
    pub fn button(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Button { action_id: action_id.into(), text: TextObject::plain(label), value: None }
    }

    pub fn users_select(action_id: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self::UsersSelect { action_id: action_id.into(), placeholder: TextObject::plain(placeholder) }
    }

    pub fn static_select(
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self::StaticSelect {
            action_id: action_id.into(),
            placeholder: TextObject::plain(placeholder),
            options,
        }
    }

    pub fn action_id(&self) -> &str {
        match self {
            Self::Button { action_id, .. }
            | Self::UsersSelect { action_id, .. }
            | Self::StaticSelect { action_id, .. } => action_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        block_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<TextObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        accessory: Option<Element>,
    },
    Actions {
        block_id: String,
        elements: Vec<Element>,
    },
    Divider,
}

/// A chat message: fallback text plus Block Kit layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_original: Option<bool>,
}

impl MessagePayload {
    /// A text-only message.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), blocks: Vec::new(), replace_original: None }
    }

    /// Marks the payload as a replacement for the message an action came from.
    pub fn replacing_original(mut self) -> Self {
        self.replace_original = Some(true);
        self
    }

    /// Action ids of every interactive element, in layout order.
    pub fn action_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Section { accessory: Some(element), .. } => ids.push(element.action_id()),
                Block::Actions { elements, .. } => {
                    ids.extend(elements.iter().map(Element::action_id));
                }
                Block::Section { accessory: None, .. } | Block::Divider => {}
            }
        }
        ids
    }
}

pub struct MessageBuilder {
    text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(builder.build(block_id.into()));
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn extend(mut self, blocks: impl IntoIterator<Item = Block>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn build(self) -> MessagePayload {
        MessagePayload { text: self.text, blocks: self.blocks, replace_original: None }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
    fields: Vec<TextObject>,
    accessory: Option<Element>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    pub fn field(&mut self, field: TextObject) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn accessory(&mut self, element: Element) -> &mut Self {
        self.accessory = Some(element);
        self
    }

    fn build(self, block_id: String) -> Block {
        Block::Section { block_id, text: self.text, fields: self.fields, accessory: self.accessory }
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<Element>,
}

impl ActionsBuilder {
    pub fn element(&mut self, element: Element) -> &mut Self {
        self.elements.push(element);
        self
    }

    fn build(self) -> Vec<Element> {
        self.elements
    }
}
