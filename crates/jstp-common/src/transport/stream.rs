//! Framing for byte-stream transports.
//!
//! A stream carries packets back to back with no length prefix; the reader
//! finds message boundaries by scanning for a balanced top-level `{...}`
//! record, skipping over string literals and comments so embedded braces
//! do not confuse the count.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::protocol::JstpError;
use crate::record::{self, ParseOptions};

use super::{Transport, TransportCommand, TransportEvent};

const READ_CHUNK: usize = 4096;

/// Tuning for a stream transport.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Wall-clock cap on parsing one record.
    pub parse_timeout: Duration,
    /// Largest accepted record, in bytes.
    pub max_frame: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            parse_timeout: Duration::from_millis(30),
            max_frame: 8 * 1024 * 1024,
        }
    }
}

/// Spawns the reader and writer tasks for any tokio byte stream and
/// returns the transport handle over them. This is the building block for
/// TCP and for TLS or Unix sockets supplied by the embedder.
pub fn spawn<S>(stream: S, remote_address: String, options: StreamOptions) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (transport, mut commands, events) = Transport::channel(remote_address.clone());
    let (mut reader, mut writer) = tokio::io::split(stream);

    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                TransportCommand::Send(text) => {
                    if writer.write_all(text.as_bytes()).await.is_err()
                        || writer.flush().await.is_err()
                    {
                        break;
                    }
                }
                TransportCommand::End(text) => {
                    if let Some(text) = text {
                        let _ = writer.write_all(text.as_bytes()).await;
                    }
                    let _ = writer.flush().await;
                    let _ = writer.shutdown().await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        let parse_options = ParseOptions {
            timeout: options.parse_timeout,
        };
        let mut scanner = RecordScanner::new(options.max_frame);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    debug!(peer = %remote_address, "stream transport closed by peer");
                    let _ = events.send(TransportEvent::Closed).await;
                    return;
                }
                Ok(n) => {
                    scanner.push(&chunk[..n]);
                    loop {
                        match scanner.next_record() {
                            Ok(Some(text)) => {
                                match record::parse_with(&text, &parse_options) {
                                    Ok(value) => {
                                        if events
                                            .send(TransportEvent::Packet(value))
                                            .await
                                            .is_err()
                                        {
                                            return;
                                        }
                                    }
                                    Err(err) => {
                                        let _ = events
                                            .send(TransportEvent::Error(err.into()))
                                            .await;
                                        let _ =
                                            events.send(TransportEvent::Closed).await;
                                        return;
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                let _ =
                                    events.send(TransportEvent::Error(err)).await;
                                let _ = events.send(TransportEvent::Closed).await;
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    let _ = events.send(TransportEvent::Error(err.into())).await;
                    let _ = events.send(TransportEvent::Closed).await;
                    return;
                }
            }
        }
    });

    transport
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanState {
    Plain,
    SlashSeen,
    LineComment,
    BlockComment,
    BlockCommentStar,
    Str(u8),
    Escape(u8),
}

/// Incremental scanner extracting balanced top-level records from a byte
/// stream. Byte oriented: every delimiter it cares about is ASCII, so
/// multi-byte UTF-8 sequences pass through untouched.
pub(crate) struct RecordScanner {
    buf: Vec<u8>,
    cursor: usize,
    start: Option<usize>,
    depth: usize,
    state: ScanState,
    max_frame: usize,
}

impl RecordScanner {
    pub(crate) fn new(max_frame: usize) -> Self {
        RecordScanner {
            buf: Vec::new(),
            cursor: 0,
            start: None,
            depth: 0,
            state: ScanState::Plain,
            max_frame,
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Scans forward and returns the next complete record, if any.
    pub(crate) fn next_record(&mut self) -> Result<Option<String>, JstpError> {
        while self.cursor < self.buf.len() {
            let byte = self.buf[self.cursor];
            let at = self.cursor;
            self.cursor += 1;

            match self.state {
                ScanState::Plain => match byte {
                    b'{' => {
                        if self.depth == 0 {
                            self.start = Some(at);
                        }
                        self.depth += 1;
                    }
                    b'}' => {
                        if self.depth == 0 {
                            return Err(JstpError::Transport(
                                "unbalanced '}' in stream".to_string(),
                            ));
                        }
                        self.depth -= 1;
                        if self.depth == 0 {
                            return Ok(Some(self.take_record(at)?));
                        }
                    }
                    b'/' => self.state = ScanState::SlashSeen,
                    b'\'' | b'"' if self.depth > 0 => {
                        self.state = ScanState::Str(byte);
                    }
                    _ if self.depth > 0 => {}
                    _ if byte.is_ascii_whitespace() => {}
                    other => {
                        return Err(JstpError::Transport(format!(
                            "unexpected byte 0x{other:02x} between packets"
                        )))
                    }
                },
                ScanState::SlashSeen => match byte {
                    b'/' => self.state = ScanState::LineComment,
                    b'*' => self.state = ScanState::BlockComment,
                    _ => {
                        return Err(JstpError::Transport(
                            "stray '/' in stream".to_string(),
                        ))
                    }
                },
                ScanState::LineComment => {
                    if byte == b'\n' {
                        self.state = ScanState::Plain;
                    }
                }
                ScanState::BlockComment => {
                    if byte == b'*' {
                        self.state = ScanState::BlockCommentStar;
                    }
                }
                ScanState::BlockCommentStar => {
                    self.state = match byte {
                        b'/' => ScanState::Plain,
                        b'*' => ScanState::BlockCommentStar,
                        _ => ScanState::BlockComment,
                    };
                }
                ScanState::Str(quote) => {
                    if byte == b'\\' {
                        self.state = ScanState::Escape(quote);
                    } else if byte == quote {
                        self.state = ScanState::Plain;
                    }
                }
                ScanState::Escape(quote) => {
                    self.state = ScanState::Str(quote);
                }
            }
        }

        if self.buf.len() > self.max_frame {
            return Err(JstpError::Transport(format!(
                "frame exceeds {} bytes",
                self.max_frame
            )));
        }
        Ok(None)
    }

    fn take_record(&mut self, end: usize) -> Result<String, JstpError> {
        let start = self.start.take().unwrap_or(0);
        let text = std::str::from_utf8(&self.buf[start..=end])
            .map_err(|_| JstpError::Transport("record is not UTF-8".to_string()))?
            .to_string();
        self.buf.drain(..=end);
        self.cursor = 0;
        self.state = ScanState::Plain;
        Ok(text)
    }
}
