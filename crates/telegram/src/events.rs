use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rosterbot_core::conversation::{ConversationInput, ConversationService, Reply};
use rosterbot_core::UserId;
use thiserror::Error;

use crate::{
    commands::parse_input,
    keyboard::{render_reply, OutgoingMessage},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateEnvelope {
    pub update_id: i64,
    pub event: BotEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotEvent {
    Message(MessageEvent),
    CallbackQuery(CallbackQueryEvent),
    Unsupported { kind: String },
}

impl BotEvent {
    pub fn event_type(&self) -> BotEventType {
        match self {
            Self::Message(_) => BotEventType::Message,
            Self::CallbackQuery(_) => BotEventType::CallbackQuery,
            Self::Unsupported { .. } => BotEventType::Unsupported,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Message(event) => Some(event.user_id),
            Self::CallbackQuery(event) => Some(event.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BotEventType {
    Message,
    CallbackQuery,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub chat_id: i64,
    pub user_id: UserId,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQueryEvent {
    pub callback_query_id: String,
    pub chat_id: i64,
    pub user_id: UserId,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Vec<OutgoingMessage>),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("conversation service failure: {0}")]
    Service(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

/// The conversation seam the handlers drive. `ConversationService` is the production
/// implementation; tests substitute their own.
#[async_trait]
pub trait ConversationPort: Send + Sync {
    async fn converse(
        &self,
        user: UserId,
        input: ConversationInput,
        ctx: &EventContext,
    ) -> Result<Reply, EventHandlerError>;
}

#[async_trait]
impl ConversationPort for ConversationService {
    async fn converse(
        &self,
        user: UserId,
        input: ConversationInput,
        _ctx: &EventContext,
    ) -> Result<Reply, EventHandlerError> {
        Ok(self.handle(user, input).await)
    }
}

#[async_trait]
impl<T> ConversationPort for Arc<T>
where
    T: ConversationPort + ?Sized,
{
    async fn converse(
        &self,
        user: UserId,
        input: ConversationInput,
        ctx: &EventContext,
    ) -> Result<Reply, EventHandlerError> {
        (**self).converse(user, input, ctx).await
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> BotEventType;
    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<BotEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with the message and button handlers wired to one conversation port.
pub fn conversation_dispatcher<S>(port: Arc<S>) -> EventDispatcher
where
    S: ConversationPort + ?Sized + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(Arc::clone(&port)));
    dispatcher.register(CallbackQueryHandler::new(port));
    dispatcher
}

pub struct MessageHandler<S> {
    port: S,
}

impl<S> MessageHandler<S>
where
    S: ConversationPort,
{
    pub fn new(port: S) -> Self {
        Self { port }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: ConversationPort + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::Message
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.port.converse(event.user_id, parse_input(&event.text), ctx).await?;
        Ok(responded(event.chat_id, &reply))
    }
}

pub struct CallbackQueryHandler<S> {
    port: S,
}

impl<S> CallbackQueryHandler<S>
where
    S: ConversationPort,
{
    pub fn new(port: S) -> Self {
        Self { port }
    }
}

#[async_trait]
impl<S> EventHandler for CallbackQueryHandler<S>
where
    S: ConversationPort + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::CallbackQuery
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::CallbackQuery(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let input = ConversationInput::Selection(event.data.clone());
        let reply = self.port.converse(event.user_id, input, ctx).await?;
        Ok(responded(event.chat_id, &reply))
    }
}

fn responded(chat_id: i64, reply: &Reply) -> HandlerResult {
    let messages = render_reply(chat_id, reply);
    if messages.is_empty() {
        HandlerResult::Processed
    } else {
        HandlerResult::Responded(messages)
    }
}
