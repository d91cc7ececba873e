use rosterbot_core::conversation::{Command, ConversationInput};

/// Commands registered with the Bot API when the transport connects.
pub const KNOWN_COMMANDS: [(&str, &str); 4] = [
    ("start", "start a new search"),
    ("menu", "start a new search"),
    ("cancel", "stop the current search"),
    ("help", "show usage"),
];

/// Maps message text onto a conversation input: `/command` (optionally `/command@botname`)
/// becomes a command, anything else is free text.
pub fn parse_input(text: &str) -> ConversationInput {
    match parse_command(text) {
        Some(command) => ConversationInput::Command(command),
        None => ConversationInput::Text(text.to_owned()),
    }
}

pub fn parse_command(text: &str) -> Option<Command> {
    let token = text.split_whitespace().next()?;
    let name = token.strip_prefix('/')?;
    let name = name.split_once('@').map_or(name, |(name, _bot)| name);
    if name.is_empty() {
        return None;
    }

    Some(match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "menu" => Command::Menu,
        "cancel" => Command::Cancel,
        "help" => Command::Help,
        other => Command::Unknown(other.to_owned()),
    })
}
