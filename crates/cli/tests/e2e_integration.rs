//! End-to-end integration tests for the meshbridge relay.
//!
//! These tests drive the full pipeline: JSON packet lines in, through the
//! stdio transport, dispatcher, sessions and segmenter, to JSON frames out.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use meshbridge_config::{AppConfig, WireFormat};
use meshbridge_core::channel::ChannelSelector;
use meshbridge_core::error::GenerationError;
use meshbridge_core::event::{DomainEvent, EventBus};
use meshbridge_core::message::{Role, SenderId};
use meshbridge_core::provider::{ChatRequest, ChatResponse, Provider, Usage};
use meshbridge_core::transport::Transport;
use meshbridge_relay::{Dispatcher, DispatcherConfig, SessionStore};
use meshbridge_transport::{OutboundFrame, StdioTransport};
use tokio::io::{AsyncReadExt, BufReader, DuplexStream, duplex};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(ChatResponse {
                content,
                model,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
            }),
            Some(Err(e)) => Err(e),
            None => panic!("ScriptedProvider exhausted"),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn packet(text: &str, channel: u32, from: &str) -> String {
    let line = serde_json::json!({
        "portnum": "TEXT_MESSAGE_APP",
        "payload": text,
        "channel": channel,
        "from": from,
    });
    format!("{line}\n")
}

fn relay(
    config: &AppConfig,
    provider: Arc<ScriptedProvider>,
    input: impl Into<Vec<u8>>,
) -> (Dispatcher, Arc<StdioTransport>, DuplexStream) {
    let (writer, reader) = duplex(64 * 1024);
    let transport = Arc::new(StdioTransport::with_io(
        &config.transport,
        BufReader::new(std::io::Cursor::new(input.into())),
        writer,
    ));
    let dispatcher = Dispatcher::new(
        provider,
        transport.clone(),
        SessionStore::new(config.session.history_cap),
        DispatcherConfig::from_app_config(config).unwrap(),
    );
    (dispatcher, transport, reader)
}

async fn frames(transport: Arc<StdioTransport>, mut out: DuplexStream) -> Vec<OutboundFrame> {
    drop(transport);
    let mut written = String::new();
    out.read_to_string(&mut written).await.unwrap();
    written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_question_and_answer_on_default_channel() {
    let config = AppConfig::default();
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("QSL, loud and clear".into())]));
    let (mut dispatcher, transport, out) =
        relay(&config, provider.clone(), packet("radio check", 0, "!0a1b2c3d"));

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    drop(dispatcher);

    assert_eq!(
        frames(transport, out).await,
        vec![OutboundFrame { channel: 0, text: "QSL, loud and clear".into() }]
    );

    let request = &provider.requests()[0];
    assert_eq!(request.model, "deepseek-r1:8b");
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[1].content, "radio check");
    assert_eq!(request.think, Some(false));
}

#[tokio::test]
async fn e2e_long_reply_goes_out_in_three_frames() {
    let reply: String = "a".repeat(200) + &"b".repeat(200) + &"c".repeat(50);
    let config = AppConfig::default();
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(reply)]));
    let (mut dispatcher, transport, out) = relay(&config, provider, packet("story?", 0, "!a"));

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    drop(dispatcher);

    let frames = frames(transport, out).await;
    let lens: Vec<usize> = frames.iter().map(|f| f.text.chars().count()).collect();
    assert_eq!(lens, vec![200, 200, 50]);
    assert!(frames.iter().all(|f| f.channel == 0));
    assert!(frames[2].text.chars().all(|c| c == 'c'));
}

#[tokio::test]
async fn e2e_channel_filter_and_wildcard() {
    let input = packet("on one", 1, "!a") + &packet("on zero", 0, "!b");

    // Default channel 0: only the second packet is answered
    let config = AppConfig::default();
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("zero here".into())]));
    let (mut dispatcher, transport, out) = relay(&config, provider.clone(), input.clone());
    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    assert!(!dispatcher.sessions().contains(&SenderId::from("!a")));
    drop(dispatcher);
    assert_eq!(
        frames(transport, out).await,
        vec![OutboundFrame { channel: 0, text: "zero here".into() }]
    );
    assert_eq!(provider.requests().len(), 1);

    // Wildcard: both are answered, each on its own channel
    let mut config = AppConfig::default();
    config.channel = ChannelSelector::All;
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("r1".into()), Ok("r0".into())]));
    let (mut dispatcher, transport, out) = relay(&config, provider, input);
    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    drop(dispatcher);
    assert_eq!(
        frames(transport, out).await,
        vec![
            OutboundFrame { channel: 1, text: "r1".into() },
            OutboundFrame { channel: 0, text: "r0".into() },
        ]
    );
}

#[tokio::test]
async fn e2e_history_is_bounded_and_per_sender() {
    let mut input = String::new();
    let mut replies = Vec::new();
    for i in 0..6 {
        input += &packet(&format!("q{i}"), 0, "!alice");
        replies.push(Ok(format!("a{i}")));
    }
    input += &packet("hi", 0, "!bob");
    replies.push(Ok("hello bob".into()));

    let config = AppConfig::default();
    let provider = Arc::new(ScriptedProvider::new(replies));
    let (mut dispatcher, transport, _out) = relay(&config, provider.clone(), input);

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();

    let alice = dispatcher.sessions().history(&SenderId::from("!alice"));
    assert_eq!(alice.len(), 10);
    assert_eq!(alice[0].content(), "q1");
    assert_eq!(alice[9].content(), "a5");

    // The sixth request saw q0..a4 plus q5: eleven turns trimmed to nine
    let requests = provider.requests();
    let sixth = &requests[5];
    assert_eq!(sixth.messages.len(), 1 + 9);
    assert_eq!(sixth.messages[1].content, "q1");

    // Bob starts fresh with no trace of Alice
    let bob = &requests[6];
    assert_eq!(bob.messages.len(), 2);
    assert_eq!(bob.messages[1].content, "hi");
}

#[tokio::test]
async fn e2e_failures_are_skipped_and_reported() {
    let input = String::from("this is not json\n")
        + "{\"portnum\":\"POSITION_APP\",\"payload\":[1,2]}\n"
        + &packet("first", 0, "!a")
        + &packet("second", 0, "!a");

    let config = AppConfig::default();
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(GenerationError::Network("connection refused".into())),
        Ok("got it".into()),
    ]));
    let (dispatcher, transport, out) = relay(&config, provider.clone(), input);
    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();
    let mut dispatcher = dispatcher.with_event_bus(bus);

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();

    // user(first), user(second), assistant(got it)
    let history = dispatcher.sessions().history(&SenderId::from("!a")).to_vec();
    assert_eq!(history.len(), 3);
    assert!(history[0].is_user() && history[1].is_user() && history[2].is_assistant());

    // The retry carried the unanswered first message
    assert_eq!(provider.requests()[1].messages.len(), 3);

    drop(dispatcher);
    assert_eq!(
        frames(transport, out).await,
        vec![OutboundFrame { channel: 0, text: "got it".into() }]
    );

    let mut rejected = 0;
    let mut failed = 0;
    let mut sent = 0;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            DomainEvent::EnvelopeRejected { .. } => rejected += 1,
            DomainEvent::GenerationFailed { .. } => failed += 1,
            DomainEvent::ReplySent { .. } => sent += 1,
            _ => {}
        }
    }
    assert_eq!((rejected, failed, sent), (2, 1, 1));
}

#[tokio::test]
async fn e2e_invalid_utf8_line_is_skipped_in_json_mode() {
    let mut input = vec![0xff, 0xfe, b'\n'];
    input.extend_from_slice(packet("still there?", 0, "!a").as_bytes());

    let config = AppConfig::default();
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("still here".into())]));
    let (mut dispatcher, transport, out) = relay(&config, provider.clone(), input);

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    drop(dispatcher);

    assert_eq!(
        frames(transport, out).await,
        vec![OutboundFrame { channel: 0, text: "still here".into() }]
    );
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn e2e_invalid_utf8_line_is_skipped_in_text_mode() {
    let mut config = AppConfig::default();
    config.transport.format = WireFormat::Text;

    let mut input = vec![0xff, 0xfe, b'\n'];
    input.extend_from_slice(b"valid line\n");

    let provider = Arc::new(ScriptedProvider::new(vec![Ok("copy".into())]));
    let (mut dispatcher, transport, mut out) = relay(&config, provider.clone(), input);

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    drop(dispatcher);
    drop(transport);

    let mut written = String::new();
    out.read_to_string(&mut written).await.unwrap();
    assert_eq!(written, "copy\n");

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.last().unwrap().content, "valid line");
}

#[tokio::test]
async fn e2e_config_file_drives_the_pipeline() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
channel = -1
model = "llama3.2:3b"

[transport]
max_frame_len = 5
format = "text"
text_channel = 2
"#
    )
    .unwrap();

    let config = AppConfig::load_from(file.path()).unwrap();
    assert_eq!(config.transport.format, WireFormat::Text);

    let provider = Arc::new(ScriptedProvider::new(vec![Ok("abcdefghij".into())]));
    let (mut dispatcher, transport, mut out) =
        relay(&config, provider.clone(), "plain text line\n");

    dispatcher.run(transport.start().await.unwrap()).await.unwrap();
    drop(dispatcher);
    drop(transport);

    let mut written = String::new();
    out.read_to_string(&mut written).await.unwrap();
    assert_eq!(written, "abcde\nfghij\n");
    assert_eq!(provider.requests()[0].model, "llama3.2:3b");
}
