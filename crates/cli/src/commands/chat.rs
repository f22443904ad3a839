//! `meshbridge chat`: talk to the configured model from the terminal.
//!
//! Every line is a fresh single-turn request, and replies are cut to the
//! radio frame length so you see what the first frame over the air would be.

use std::io::Write;

use anyhow::Context;
use meshbridge_config::AppConfig;
use meshbridge_core::error::GenerationError;
use meshbridge_core::message::ChatMessage;
use meshbridge_core::provider::{ChatRequest, Provider};
use meshbridge_providers::build_provider;
use tokio::io::{self, AsyncBufReadExt, BufReader};

pub async fn run(config: AppConfig, with_system_prompt: bool) -> anyhow::Result<()> {
    let provider =
        build_provider(&config.provider).context("Failed to build generation provider")?;

    println!();
    println!("  meshbridge chat: {} via {}", config.model, provider.name());
    println!("  Replies are cut to {} characters.", config.transport.max_frame_len);
    println!("  Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            break;
        }

        match ask(provider.as_ref(), &config, with_system_prompt, line).await {
            Ok(reply) => println!("  {reply}"),
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    Ok(())
}

/// Send one line as a single-turn request and return the shortened reply.
pub async fn ask(
    provider: &dyn Provider,
    config: &AppConfig,
    with_system_prompt: bool,
    line: &str,
) -> Result<String, GenerationError> {
    let mut messages = Vec::with_capacity(2);
    if with_system_prompt {
        messages.push(ChatMessage::system(config.system_prompt.as_str()));
    }
    messages.push(ChatMessage::user(line));

    let mut request = ChatRequest::new(config.model.as_str(), messages);
    request.think = Some(config.generation.think);
    request.temperature = config.generation.temperature;

    let reply = provider.chat(request).await?.content;
    Ok(truncate_chars(&reply, config.transport.max_frame_len))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
