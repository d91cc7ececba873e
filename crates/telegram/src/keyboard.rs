use rosterbot_core::conversation::{Menu, Reply};
use serde::Serialize;
use tracing::warn;

/// Bot API limit on `callback_data`.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;
pub const DEFAULT_ROW_WIDTH: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self { text: text.into(), callback_data: callback_data.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn button_count(&self) -> usize {
        self.inline_keyboard.iter().map(Vec::len).sum()
    }
}

/// Body of a `sendMessage` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

pub struct MessageBuilder {
    chat_id: i64,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
}

impl MessageBuilder {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self { chat_id, text: text.into(), keyboard: None }
    }

    pub fn keyboard<F>(mut self, row_width: usize, build: F) -> Self
    where
        F: FnOnce(&mut KeyboardBuilder),
    {
        let mut builder = KeyboardBuilder::new(row_width);
        build(&mut builder);
        self.keyboard = Some(builder.build());
        self
    }

    pub fn build(self) -> OutgoingMessage {
        OutgoingMessage { chat_id: self.chat_id, text: self.text, reply_markup: self.keyboard }
    }
}

pub struct KeyboardBuilder {
    row_width: usize,
    buttons: Vec<InlineKeyboardButton>,
}

impl KeyboardBuilder {
    fn new(row_width: usize) -> Self {
        Self { row_width: row_width.max(1), buttons: Vec::new() }
    }

    pub fn button(&mut self, label: impl Into<String>, data: impl Into<String>) -> &mut Self {
        let data = data.into();
        if data.len() > MAX_CALLBACK_DATA_BYTES {
            warn!(
                event_name = "egress.telegram.button_dropped",
                bytes = data.len(),
                "menu token exceeds callback data limit; button omitted"
            );
            return self;
        }
        self.buttons.push(InlineKeyboardButton::new(label, data));
        self
    }

    fn build(self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup {
            inline_keyboard: self.buttons.chunks(self.row_width).map(<[_]>::to_vec).collect(),
        }
    }
}

/// One outgoing message per reply message, menus laid out as inline keyboards.
pub fn render_reply(chat_id: i64, reply: &Reply) -> Vec<OutgoingMessage> {
    reply
        .messages
        .iter()
        .map(|message| {
            let builder = MessageBuilder::new(chat_id, message.text.clone());
            match &message.menu {
                Some(menu) => builder.keyboard(DEFAULT_ROW_WIDTH, |keys| add_menu(keys, menu)),
                None => builder,
            }
            .build()
        })
        .collect()
}

fn add_menu(keys: &mut KeyboardBuilder, menu: &Menu) {
    for option in &menu.options {
        keys.button(option.label.clone(), option.token.clone());
    }
}
