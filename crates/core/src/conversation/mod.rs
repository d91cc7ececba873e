pub mod engine;
pub mod service;
pub mod states;

pub use engine::{block_menu, building_menu, ConversationEngine};
pub use service::{ConversationService, SessionStore};
pub use states::{
    Command, ConversationInput, ConversationState, Menu, MenuOption, Next, Reply, ReplyMessage,
    Stage, Terminal, TransitionOutcome,
};
