//! Stdio transport: packets in on stdin, frames out on stdout.
//!
//! The radio itself is driven by a separate bridge process (or a person at a
//! terminal in `text` mode). Logs go to stderr, so stdout carries nothing but
//! outbound frames.

use std::io::ErrorKind;
use std::sync::Mutex;

use async_trait::async_trait;
use meshbridge_config::{TransportConfig, WireFormat};
use meshbridge_core::error::TransportError;
use meshbridge_core::transport::{InboundEnvelope, Transport};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::wire::{OutboundFrame, parse_line};

type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;
type FrameWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line-oriented transport over a reader/writer pair, stdin/stdout by default.
pub struct StdioTransport {
    format: WireFormat,
    text_channel: u32,
    text_sender: String,
    input: Mutex<Option<LineReader>>,
    output: tokio::sync::Mutex<FrameWriter>,
}

impl StdioTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_io(config, BufReader::new(io::stdin()), io::stdout())
    }

    /// Use an arbitrary reader/writer pair instead of the process streams.
    pub fn with_io<R, W>(config: &TransportConfig, reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            format: config.format,
            text_channel: config.text_channel,
            text_sender: config.text_sender.clone(),
            input: Mutex::new(Some(Box::new(reader))),
            output: tokio::sync::Mutex::new(Box::new(writer)),
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    fn encode(&self, text: &str, channel: u32) -> Result<String, TransportError> {
        match self.format {
            WireFormat::Json => {
                let frame = OutboundFrame { channel, text: text.to_string() };
                serde_json::to_string(&frame).map_err(|e| TransportError::SendFailed {
                    channel,
                    reason: e.to_string(),
                })
            }
            WireFormat::Text => Ok(text.to_string()),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &str {
        "stdio"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundEnvelope, TransportError>>, TransportError> {
        let reader = self
            .input
            .lock()
            .ok()
            .and_then(|mut input| input.take())
            .ok_or_else(|| TransportError::NotStarted("input stream already claimed".into()))?;

        let (tx, rx) = mpsc::channel(32);
        let format = self.format;
        let text_channel = self.text_channel;
        let text_sender = self.text_sender.clone();

        tokio::spawn(async move {
            let mut lines = reader.split(b'\n');

            loop {
                match lines.next_segment().await {
                    Ok(Some(mut line)) => {
                        if line.last() == Some(&b'\r') {
                            line.pop();
                        }
                        if line.iter().all(u8::is_ascii_whitespace) {
                            continue;
                        }

                        let item = match format {
                            WireFormat::Json => match std::str::from_utf8(&line) {
                                Ok(line) => parse_line(line),
                                Err(e) => Err(TransportError::InvalidPayload(format!(
                                    "line is not valid UTF-8: {e}"
                                ))),
                            },
                            // Raw bytes; decode reports invalid UTF-8 per message
                            WireFormat::Text => {
                                Ok(InboundEnvelope::text(line, text_channel, &text_sender))
                            }
                        };

                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Input read failed");
                        let _ = tx.send(Err(TransportError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, text: &str, channel: u32) -> Result<(), TransportError> {
        let mut line = self.encode(text, channel)?;
        line.push('\n');

        let mut output = self.output.lock().await;
        let result = match output.write_all(line.as_bytes()).await {
            Ok(()) => output.flush().await,
            Err(e) => Err(e),
        };

        result.map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe => TransportError::ConnectionLost(e.to_string()),
            _ => TransportError::SendFailed { channel, reason: e.to_string() },
        })
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.output
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshbridge_core::error::EnvelopeError;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    fn json_config() -> TransportConfig {
        TransportConfig::default()
    }

    fn text_config() -> TransportConfig {
        TransportConfig {
            format: WireFormat::Text,
            text_channel: 4,
            text_sender: "operator".into(),
            ..TransportConfig::default()
        }
    }

    fn transport(
        config: &TransportConfig,
        input: impl Into<Vec<u8>>,
    ) -> (StdioTransport, DuplexStream) {
        let (writer, reader) = duplex(4096);
        let input = BufReader::new(std::io::Cursor::new(input.into()));
        let t = StdioTransport::with_io(config, input, writer);
        (t, reader)
    }

    async fn drain(
        mut rx: mpsc::Receiver<Result<InboundEnvelope, TransportError>>,
    ) -> Vec<Result<InboundEnvelope, TransportError>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn json_lines_become_envelopes_until_eof() {
        let input = concat!(
            r#"{"portnum":"TEXT_MESSAGE_APP","payload":"one","channel":0,"from":"!a"}"#,
            "\n\n",
            "garbage\n",
            r#"{"decoded":{"portnum":"TEXT_MESSAGE_APP","payload":"two"},"channel":1}"#,
            "\r\n",
        );
        let (t, _out) = transport(&json_config(), input);

        let items = drain(t.start().await.unwrap()).await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().clone().decode().unwrap().text, "one");
        assert!(matches!(items[1], Err(TransportError::InvalidPayload(_))));
        let second = items[2].as_ref().unwrap().clone().decode().unwrap();
        assert_eq!((second.text.as_str(), second.channel), ("two", 1));
    }

    #[tokio::test]
    async fn text_lines_use_configured_channel_and_sender() {
        let (t, _out) = transport(&text_config(), "hello there\n   \nsecond line\n");

        let items = drain(t.start().await.unwrap()).await;
        let messages: Vec<_> = items
            .into_iter()
            .map(|item| item.unwrap().decode().unwrap())
            .collect();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "hello there");
        assert_eq!(messages[0].channel, 4);
        assert_eq!(messages[1].sender.as_str(), "operator");
    }

    #[tokio::test]
    async fn invalid_utf8_text_line_does_not_end_input() {
        let mut input = vec![0xff, 0xfe, b'\n'];
        input.extend_from_slice(b"valid line\n");
        let (t, _out) = transport(&text_config(), input);

        let items = drain(t.start().await.unwrap()).await;

        assert_eq!(items.len(), 2);
        let first = items[0].as_ref().unwrap().clone();
        assert!(matches!(first.decode(), Err(EnvelopeError::InvalidUtf8(_))));
        let second = items[1].as_ref().unwrap().clone().decode().unwrap();
        assert_eq!((second.text.as_str(), second.channel), ("valid line", 4));
    }

    #[tokio::test]
    async fn invalid_utf8_json_line_is_not_fatal() {
        let mut input = vec![b'{', 0xc3, 0x28, b'}', b'\n'];
        input.extend_from_slice(
            br#"{"portnum":"TEXT_MESSAGE_APP","payload":"after","channel":0,"from":"!a"}"#,
        );
        input.push(b'\n');
        let (t, _out) = transport(&json_config(), input);

        let items = drain(t.start().await.unwrap()).await;

        assert_eq!(items.len(), 2);
        match &items[0] {
            Err(e @ TransportError::InvalidPayload(_)) => assert!(!e.is_fatal()),
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
        assert_eq!(items[1].as_ref().unwrap().clone().decode().unwrap().text, "after");
    }

    struct FailingInput;

    impl tokio::io::AsyncRead for FailingInput {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::from(ErrorKind::ConnectionReset)))
        }
    }

    #[tokio::test]
    async fn read_error_is_connection_lost() {
        let (writer, _out) = duplex(64);
        let t = StdioTransport::with_io(&json_config(), BufReader::new(FailingInput), writer);

        let items = drain(t.start().await.unwrap()).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TransportError::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn non_text_packets_pass_through_for_decode() {
        let (t, _out) = transport(&json_config(), "{\"portnum\":\"TELEMETRY_APP\"}\n");
        let items = drain(t.start().await.unwrap()).await;
        let err = items[0].as_ref().unwrap().clone().decode().unwrap_err();
        assert_eq!(err, EnvelopeError::NotTextMessage("TELEMETRY_APP".into()));
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let (t, _out) = transport(&json_config(), "");
        let _rx = t.start().await.unwrap();
        assert!(matches!(t.start().await, Err(TransportError::NotStarted(_))));
    }

    #[tokio::test]
    async fn json_frames_are_written_one_per_line() {
        let (t, mut out) = transport(&json_config(), "");
        t.send("first", 2).await.unwrap();
        t.send("say \"73\"", 2).await.unwrap();
        drop(t);

        let mut written = String::new();
        out.read_to_string(&mut written).await.unwrap();
        let frames: Vec<OutboundFrame> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(
            frames,
            vec![
                OutboundFrame { channel: 2, text: "first".into() },
                OutboundFrame { channel: 2, text: "say \"73\"".into() },
            ]
        );
    }

    #[tokio::test]
    async fn text_frames_are_written_raw() {
        let (t, mut out) = transport(&text_config(), "");
        t.send("plain reply", 0).await.unwrap();
        drop(t);

        let mut written = String::new();
        out.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "plain reply\n");
    }

    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::from(ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn broken_pipe_is_fatal() {
        let t = StdioTransport::with_io(&json_config(), BufReader::new(&b""[..]), ClosedPipe);
        let err = t.send("anyone?", 0).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
