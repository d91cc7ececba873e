use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::access::{AccessDecision, AccessGate, AccessStore, UserId};
use crate::conversation::engine::ConversationEngine;
use crate::conversation::states::{
    ConversationInput, ConversationState, Next, Reply, Stage, Terminal,
};
use crate::dataset::DatasetCatalog;
use crate::errors::ConversationError;

type Slot = Arc<tokio::sync::Mutex<Option<ConversationState>>>;

/// Per-user conversation slots. Two events for the same user never interleave; different users
/// proceed independently.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<UserId, Slot>>,
}

impl SessionStore {
    fn slot(&self, user: UserId) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(user).or_default())
    }

    pub async fn stage(&self, user: UserId) -> Option<Stage> {
        let slot = self.slot(user);
        let state = slot.lock().await;
        state.as_ref().map(ConversationState::stage)
    }

    pub async fn active(&self) -> usize {
        let slots: Vec<Slot> = match self.slots.lock() {
            Ok(slots) => slots.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        let mut active = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                active += 1;
            }
        }
        active
    }
}

pub struct ConversationService {
    engine: ConversationEngine,
    catalog: Arc<DatasetCatalog>,
    gate: Arc<AccessGate<Arc<dyn AccessStore>>>,
    sessions: SessionStore,
}

impl ConversationService {
    pub fn new(
        engine: ConversationEngine,
        catalog: Arc<DatasetCatalog>,
        access: Arc<dyn AccessStore>,
    ) -> Self {
        Self {
            engine,
            catalog,
            gate: Arc::new(AccessGate::new(access)),
            sessions: SessionStore::default(),
        }
    }

    pub fn catalog(&self) -> &Arc<DatasetCatalog> {
        &self.catalog
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs one input for `user`. Every outcome, including access-list failures, is a reply.
    pub async fn handle(&self, user: UserId, input: ConversationInput) -> Reply {
        let decision = match self.check_access(user).await {
            Ok(decision) => decision,
            Err(error) => return Reply::text(error.user_message()),
        };
        if !decision.is_allowed() {
            return Reply::text(ConversationError::UnauthorizedAccess(user).user_message());
        }

        let slot = self.sessions.slot(user);
        let mut state = slot.lock().await;
        let outcome = self.engine.step(&self.catalog, state.as_ref(), &input);

        if let Some(error) = &outcome.error {
            if error.is_terminal() {
                warn!(
                    event_name = "conversation.step.failed",
                    correlation_id = %user,
                    error = %error,
                    "conversation ended with an error"
                );
            } else {
                debug!(
                    event_name = "conversation.step.rejected",
                    correlation_id = %user,
                    error = %error,
                    "input rejected; stage kept"
                );
            }
        }

        match &outcome.next {
            Next::Continue(next) => *state = Some(next.clone()),
            Next::Terminal(terminal) => {
                *state = None;
                info!(
                    event_name = "conversation.ended",
                    correlation_id = %user,
                    outcome = match terminal {
                        Terminal::Success => "success",
                        Terminal::Cancelled => "cancelled",
                        Terminal::Error => "error",
                    },
                    "conversation ended"
                );
            }
            Next::Idle => {}
        }
        debug!(
            event_name = "conversation.transition",
            correlation_id = %user,
            from = ?outcome.from,
            to = ?state.as_ref().map(ConversationState::stage),
            "conversation step applied"
        );

        if decision == AccessDecision::Bootstrapped {
            let welcome = Reply::text(format!(
                "Welcome! You have been registered as the administrator (chat id: {user})."
            ));
            return welcome.then(outcome.reply);
        }
        outcome.reply
    }

    /// The file-backed store writes through on bootstrap, so the check runs on the blocking pool.
    async fn check_access(&self, user: UserId) -> Result<AccessDecision, ConversationError> {
        let gate = Arc::clone(&self.gate);
        let checked = tokio::task::spawn_blocking(move || gate.check(user)).await;
        let failure = match checked {
            Ok(Ok(decision)) => return Ok(decision),
            Ok(Err(store_error)) => store_error.to_string(),
            Err(join_error) => join_error.to_string(),
        };
        error!(
            event_name = "access.store_failed",
            correlation_id = %user,
            error = %failure,
            "access list could not be consulted; no conversation state changed"
        );
        Err(ConversationError::AccessUnavailable(failure))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ConversationService;
    use crate::access::{
        AccessStore, AccessStoreError, FileAccessStore, InMemoryAccessStore, UserId,
    };
    use crate::conversation::engine::ConversationEngine;
    use crate::conversation::states::{Command, ConversationInput, Stage};
    use crate::dataset::{Dataset, DatasetCatalog, Record};

    fn service(store: Arc<dyn AccessStore>) -> ConversationService {
        let catalog = DatasetCatalog::ready(Dataset::new(vec![Record {
            building: "A".to_owned(),
            block: "1".to_owned(),
            unit: "12".to_owned(),
            full_name: "Ali Rezaei".to_owned(),
            ..Record::default()
        }]));
        ConversationService::new(ConversationEngine::default(), Arc::new(catalog), store)
    }

    fn menu() -> ConversationInput {
        ConversationInput::Command(Command::Menu)
    }

    #[tokio::test]
    async fn first_user_gets_welcome_then_menu() {
        let service = service(Arc::new(InMemoryAccessStore::default()));

        let reply = service.handle(UserId(1), menu()).await;

        assert!(reply.messages[0].text.contains("administrator"));
        assert!(reply.menu().is_some());
        assert_eq!(service.sessions().stage(UserId(1)).await, Some(Stage::AwaitingBuilding));
    }

    #[tokio::test]
    async fn denied_users_never_get_a_conversation() {
        let service = service(Arc::new(InMemoryAccessStore::with_members([UserId(1)])));

        let reply = service.handle(UserId(2), menu()).await;

        assert!(reply.joined_text().contains("Access denied"));
        assert_eq!(service.sessions().stage(UserId(2)).await, None);
        assert_eq!(service.sessions().active().await, 0);
    }

    #[tokio::test]
    async fn conversations_are_isolated_per_user() {
        let store = Arc::new(InMemoryAccessStore::with_members([UserId(1), UserId(2)]));
        let service = service(store);

        service.handle(UserId(1), menu()).await;
        service.handle(UserId(1), ConversationInput::Selection("A".to_owned())).await;
        service.handle(UserId(2), menu()).await;

        assert_eq!(service.sessions().stage(UserId(1)).await, Some(Stage::AwaitingBlock));
        assert_eq!(service.sessions().stage(UserId(2)).await, Some(Stage::AwaitingBuilding));
    }

    #[tokio::test]
    async fn concurrent_events_for_one_user_are_serialized() {
        let store = Arc::new(InMemoryAccessStore::with_members([UserId(1)]));
        let service = Arc::new(service(store));
        service.handle(UserId(1), menu()).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .handle(UserId(1), ConversationInput::Selection("A".to_owned()))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join");
        }

        // The first selection advances; later ones arrive at the block stage and are rejected.
        assert_eq!(service.sessions().stage(UserId(1)).await, Some(Stage::AwaitingBlock));
    }

    struct BrokenStore;

    impl AccessStore for BrokenStore {
        fn contains(&self, _user: UserId) -> Result<bool, AccessStoreError> {
            Err(AccessStoreError::Poisoned)
        }

        fn try_bootstrap(&self, _user: UserId) -> Result<bool, AccessStoreError> {
            Err(AccessStoreError::Poisoned)
        }

        fn grant(&self, _user: UserId) -> Result<(), AccessStoreError> {
            Err(AccessStoreError::Poisoned)
        }

        fn members(&self) -> Result<Vec<UserId>, AccessStoreError> {
            Err(AccessStoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn access_store_failure_still_answers_the_user() {
        let service = service(Arc::new(BrokenStore));

        let reply = service.handle(UserId(1), menu()).await;

        assert!(reply.joined_text().contains("access list is unavailable"));
        assert!(reply.menu().is_none());
        assert_eq!(service.sessions().stage(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn unwritable_access_file_answers_every_attempt() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let store = FileAccessStore::open(dir.path().join("missing-dir").join("access.json"))
            .expect("open only reads");
        let service = service(Arc::new(store));

        for _ in 0..3 {
            let reply = service.handle(UserId(1), menu()).await;
            assert!(reply.joined_text().contains("contact the administrator"));
        }
        assert_eq!(service.sessions().active().await, 0);
    }
}
