use thiserror::Error;

use crate::access::UserId;
use crate::conversation::states::Stage;
use crate::dataset::DatasetError;

/// Every way a conversation step can go wrong. None of these are fatal to the process; each
/// maps to a user-visible message and a well-defined next state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error(transparent)]
    DatasetUnavailable(#[from] DatasetError),
    #[error("selection `{token}` is not offered at stage {stage:?}")]
    InvalidSelection { stage: Stage, token: String },
    #[error("no records for building `{building}`, block `{block}`, term `{term}`")]
    NoMatch { building: String, block: String, term: String },
    #[error("conversation state is missing its selections: {0}")]
    StateCorruption(String),
    #[error("user {0} is not on the access list")]
    UnauthorizedAccess(UserId),
    #[error("access list unavailable: {0}")]
    AccessUnavailable(String),
}

impl ConversationError {
    /// Whether the conversation ends after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DatasetUnavailable(_) | Self::StateCorruption(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::DatasetUnavailable(_) => {
                "Subscriber data is not available right now. Please try again later.".to_owned()
            }
            Self::InvalidSelection { .. } => {
                "That option is not available. Please choose one of the buttons below.".to_owned()
            }
            Self::NoMatch { building, block, term } => format!(
                "No subscriber found (building: {building}, block: {block}, search: {term}). \
                 Please try again."
            ),
            Self::StateCorruption(_) => {
                "Something went wrong with this conversation. Please start again with /menu."
                    .to_owned()
            }
            Self::UnauthorizedAccess(user_id) => format!(
                "Access denied. Your chat id ({user_id}) is not on the allow list. \
                 Please contact the administrator."
            ),
            Self::AccessUnavailable(_) => {
                "The access list is unavailable right now. Please contact the administrator."
                    .to_owned()
            }
        }
    }
}
