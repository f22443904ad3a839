//! `meshbridge listen`: answer text messages from the radio bridge.

use std::sync::Arc;

use anyhow::Context;
use meshbridge_config::AppConfig;
use meshbridge_core::event::{DomainEvent, EventBus};
use meshbridge_core::transport::Transport;
use meshbridge_providers::build_provider;
use meshbridge_relay::{Dispatcher, DispatcherConfig, SessionStore};
use meshbridge_transport::StdioTransport;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let provider =
        build_provider(&config.provider).context("Failed to build generation provider")?;

    match provider.health_check().await {
        Ok(true) => {}
        Ok(false) => warn!(provider = provider.name(), "Provider is not answering yet"),
        Err(e) => warn!(provider = provider.name(), error = %e, "Provider health check failed"),
    }

    let mut sessions = SessionStore::new(config.session.history_cap);
    if let Some(max) = config.session.max_sessions {
        sessions = sessions.with_max_sessions(max);
    }

    let transport = Arc::new(StdioTransport::new(&config.transport));
    let event_bus = Arc::new(EventBus::default());
    let tally = tokio::spawn(tally_events(event_bus.subscribe()));

    let mut dispatcher = Dispatcher::new(
        provider,
        transport.clone(),
        sessions,
        DispatcherConfig::from_app_config(&config)?,
    )
    .with_event_bus(event_bus.clone());

    let inbound = transport
        .start()
        .await
        .context("Failed to start stdio transport")?;

    let result = tokio::select! {
        result = dispatcher.run(inbound) => result.context("Dispatcher stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    if let Err(e) = transport.stop().await {
        warn!(error = %e, "Transport did not stop cleanly");
    }

    let senders = dispatcher.sessions().len();
    drop(dispatcher);
    drop(event_bus);

    match tally.await {
        Ok(tally) => info!(
            senders,
            received = tally.received,
            filtered = tally.filtered,
            rejected = tally.rejected,
            replies = tally.replies,
            frames_sent = tally.frames_sent,
            frames_failed = tally.frames_failed,
            generation_failures = tally.generation_failures,
            "Session summary"
        ),
        Err(e) => warn!(error = %e, "Event tally task failed"),
    }

    result
}

/// Running counts of dispatcher events, reported on shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventTally {
    pub received: usize,
    pub filtered: usize,
    pub rejected: usize,
    pub replies: usize,
    pub frames_sent: usize,
    pub frames_failed: usize,
    pub generation_failures: usize,
}

impl EventTally {
    pub fn record(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::MessageReceived { .. } => self.received += 1,
            DomainEvent::MessageFiltered { .. } => self.filtered += 1,
            DomainEvent::EnvelopeRejected { .. } => self.rejected += 1,
            DomainEvent::GenerationFailed { .. } => self.generation_failures += 1,
            DomainEvent::ReplySent {
                frames_sent,
                frames_failed,
                ..
            } => {
                self.replies += 1;
                self.frames_sent += frames_sent;
                self.frames_failed += frames_failed;
            }
        }
    }
}

/// Count events until every publisher is gone.
async fn tally_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) -> EventTally {
    let mut tally = EventTally::default();
    loop {
        match rx.recv().await {
            Ok(event) => tally.record(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event tally fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tally
}
