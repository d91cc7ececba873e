use serde::{Deserialize, Serialize};

use crate::errors::ConversationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    AwaitingBuilding,
    AwaitingBlock,
    AwaitingUnitOrName,
}

/// Where a user is in the selection funnel. Each stage carries exactly the selections made so
/// far, so a later stage cannot be reached without them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    AwaitingBuilding,
    AwaitingBlock { building: String },
    AwaitingUnitOrName { building: String, block: String },
}

impl ConversationState {
    pub fn stage(&self) -> Stage {
        match self {
            Self::AwaitingBuilding => Stage::AwaitingBuilding,
            Self::AwaitingBlock { .. } => Stage::AwaitingBlock,
            Self::AwaitingUnitOrName { .. } => Stage::AwaitingUnitOrName,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Menu,
    Cancel,
    Help,
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationInput {
    Command(Command),
    /// A button press carrying its menu token.
    Selection(String),
    /// Free text typed by the user.
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    Success,
    Cancelled,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    Continue(ConversationState),
    Terminal(Terminal),
    /// No conversation exists and none was started.
    Idle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuOption {
    pub label: String,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Menu {
    pub options: Vec<MenuOption>,
}

impl Menu {
    pub fn tokens(&self) -> Vec<&str> {
        self.options.iter().map(|option| option.token.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplyMessage {
    pub text: String,
    pub menu: Option<Menu>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub messages: Vec<ReplyMessage>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { messages: vec![ReplyMessage { text: text.into(), menu: None }] }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self { messages: vec![ReplyMessage { text: text.into(), menu: Some(menu) }] }
    }

    pub fn then(mut self, next: Reply) -> Self {
        self.messages.extend(next.messages);
        self
    }

    /// All message texts joined; convenient for logs and assertions.
    pub fn joined_text(&self) -> String {
        self.messages.iter().map(|message| message.text.as_str()).collect::<Vec<_>>().join("\n")
    }

    pub fn menu(&self) -> Option<&Menu> {
        self.messages.iter().rev().find_map(|message| message.menu.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: Option<Stage>,
    pub next: Next,
    pub reply: Reply,
    pub error: Option<ConversationError>,
}
