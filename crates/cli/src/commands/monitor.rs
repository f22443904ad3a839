//! `meshbridge monitor`: print text traffic on a channel, never reply.

use anyhow::Context;
use meshbridge_config::AppConfig;
use meshbridge_core::channel::ChannelSelector;
use meshbridge_core::transport::{InboundEnvelope, Transport};
use meshbridge_transport::StdioTransport;
use tracing::{debug, info, warn};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let transport = StdioTransport::new(&config.transport);
    let mut inbound = transport
        .start()
        .await
        .context("Failed to start stdio transport")?;

    info!("Monitoring {}", config.channel);

    loop {
        tokio::select! {
            item = inbound.recv() => match item {
                Some(Ok(envelope)) => {
                    if let Some(line) = render(envelope, config.channel) {
                        println!("{line}");
                    }
                }
                Some(Err(e)) if e.is_fatal() => return Err(e).context("Transport link lost"),
                Some(Err(e)) => warn!(error = %e, "Dropping unreadable packet"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Format a packet for display if it is a text message on a watched channel.
fn render(envelope: InboundEnvelope, target: ChannelSelector) -> Option<String> {
    let message = match envelope.decode() {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Skipping packet");
            return None;
        }
    };

    if !target.accepts(message.channel) {
        return None;
    }

    Some(format!("[Channel {}] {}", message.channel, message.text))
}
