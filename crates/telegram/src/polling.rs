use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{BotEvent, EventContext, EventDispatcher, HandlerResult, UpdateEnvelope};
use crate::keyboard::OutgoingMessage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// `max_retries: None` keeps reconnecting for as long as the process runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: None, base_delay_ms: 250, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries.is_some_and(|max_retries| attempt >= max_retries)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollingState {
    Starting,
    Connected,
    Reconnecting,
    Stopped,
}

impl PollingState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingSnapshot {
    pub state: PollingState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl Default for PollingSnapshot {
    fn default() -> Self {
        Self { state: PollingState::Starting, consecutive_failures: 0, last_error: None }
    }
}

/// Liveness of the polling loop, shared with the ops endpoint.
#[derive(Clone, Debug, Default)]
pub struct PollingHealth {
    inner: Arc<Mutex<PollingSnapshot>>,
}

impl PollingHealth {
    pub fn snapshot(&self) -> PollingSnapshot {
        match self.inner.lock() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn record_connected(&self) {
        self.update(|snapshot| {
            snapshot.state = PollingState::Connected;
            snapshot.consecutive_failures = 0;
        });
    }

    pub fn record_failure(&self, error: &TransportError) {
        self.update(|snapshot| {
            snapshot.state = PollingState::Reconnecting;
            snapshot.consecutive_failures += 1;
            snapshot.last_error = Some(error.to_string());
        });
    }

    pub fn record_stopped(&self) {
        self.update(|snapshot| snapshot.state = PollingState::Stopped);
    }

    fn update(&self, apply: impl FnOnce(&mut PollingSnapshot)) {
        match self.inner.lock() {
            Ok(mut snapshot) => apply(&mut *snapshot),
            Err(poisoned) => apply(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
pub trait BotTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next update, or `None` once the stream is closed.
    async fn next_envelope(&self) -> Result<Option<UpdateEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope: &UpdateEnvelope) -> Result<(), TransportError>;
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopBotTransport;

#[async_trait]
impl BotTransport for NoopBotTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<UpdateEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope: &UpdateEnvelope) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, _message: &OutgoingMessage) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct PollingRunner {
    transport: Arc<dyn BotTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    health: PollingHealth,
}

impl Default for PollingRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopBotTransport),
            dispatcher: EventDispatcher::default(),
            reconnect_policy: ReconnectPolicy::default(),
            health: PollingHealth::default(),
        }
    }
}

impl PollingRunner {
    pub fn new(
        transport: Arc<dyn BotTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, health: PollingHealth::default() }
    }

    pub fn health(&self) -> PollingHealth {
        self.health.clone()
    }

    /// Pumps updates until the stream closes or a bounded retry budget runs out. A connection
    /// that delivered at least one update resets the budget.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let mut delivered = false;
            match self.connect_and_pump(attempt, &mut delivered).await {
                Ok(()) => {
                    self.health.record_stopped();
                    return Ok(());
                }
                Err(transport_error) => {
                    self.health.record_failure(&transport_error);
                    if delivered {
                        attempt = 0;
                    }
                    warn!(
                        event_name = "ingress.telegram.transport_failed",
                        attempt,
                        max_retries = ?self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "bot transport failed"
                    );

                    if self.reconnect_policy.exhausted(attempt) {
                        warn!(
                            event_name = "ingress.telegram.retries_exhausted",
                            max_retries = ?self.reconnect_policy.max_retries,
                            "bot transport retries exhausted; continuing process without crash"
                        );
                        self.health.record_stopped();
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        delivered: &mut bool,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening bot transport connection");
        self.transport.connect().await?;
        self.health.record_connected();
        info!(attempt, "bot transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "bot transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            *delivered = true;
            let correlation_id = correlation_id(&envelope);

            info!(
                event_name = "ingress.telegram.update_received",
                update_id = envelope.update_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %correlation_id,
                "received telegram update"
            );

            if let Err(error) = self.transport.acknowledge(&envelope).await {
                warn!(
                    event_name = "ingress.telegram.ack_sent",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "failed to acknowledge telegram update"
                );
            } else {
                debug!(
                    event_name = "ingress.telegram.ack_sent",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    "acknowledged telegram update"
                );
            }

            let context = EventContext { correlation_id: correlation_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(messages)) => {
                    self.deliver(&messages, &correlation_id).await;
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        update_id = envelope.update_id,
                        correlation_id = %correlation_id,
                        error = %error,
                        "event dispatch failed; continuing polling loop"
                    );
                }
            }
        }
    }

    async fn deliver(&self, messages: &[OutgoingMessage], correlation_id: &str) {
        for message in messages {
            match self.transport.send(message).await {
                Ok(()) => debug!(
                    event_name = "egress.telegram.message_sent",
                    correlation_id,
                    chat_id = message.chat_id,
                    "reply delivered"
                ),
                Err(error) => warn!(
                    event_name = "egress.telegram.message_failed",
                    correlation_id,
                    chat_id = message.chat_id,
                    error = %error,
                    "reply delivery failed"
                ),
            }
        }
    }
}

fn correlation_id(envelope: &UpdateEnvelope) -> String {
    match (&envelope.event, envelope.event.user_id()) {
        (BotEvent::Unsupported { .. }, _) | (_, None) => format!("update-{}", envelope.update_id),
        (_, Some(user)) => format!("user-{user}-update-{}", envelope.update_id),
    }
}
