// Newline-delimited JSON-RPC framing over a byte stream

use crate::error::ServerError;
use crate::protocol::JsonRpcResponse;
use bytes::{Buf, BytesMut};
use futures::{SinkExt, StreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest frame accepted from the client. Longer lines are discarded.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// One line received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The line was not valid UTF-8.
    InvalidUtf8,
    /// The line exceeded the frame limit and was dropped.
    TooLong,
}

/// Splits the input on `\n` without ever failing on the client's bytes.
///
/// Unlike `LinesCodec`, malformed lines come back as frames rather than
/// decoder errors, so the read half keeps going after them. Only I/O errors
/// end the stream.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_length: usize,
    /// Where to resume the newline search in the buffer.
    next_index: usize,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl FrameCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    fn frame(line: &[u8]) -> Frame {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(text) => Frame::Text(text.to_string()),
            Err(_) => Frame::InvalidUtf8,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        loop {
            let read_to = buf.len().min(self.max_length.saturating_add(1));
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.next_index = 0;
                    self.discarding = false;
                    return Ok(Some(Frame::TooLong));
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);
                    return Ok(Some(Self::frame(&line[..end])));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.next_index = 0;
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if self.discarding {
            self.discarding = false;
            buf.clear();
            return Ok(Some(Frame::TooLong));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        self.next_index = 0;
        let line = buf.split_to(buf.len());
        Ok(Some(Self::frame(&line)))
    }
}

fn codec_error(error: LinesCodecError) -> io::Error {
    match error {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "frame too long")
        }
    }
}

/// Cloneable handle used to emit responses.
///
/// Every response becomes exactly one line, written by a single writer task,
/// so responses of concurrent calls never interleave.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ResponseSink {
    pub fn send(&self, response: &JsonRpcResponse) -> Result<(), ServerError> {
        let frame = serde_json::to_string(response).map_err(io::Error::from)?;
        self.tx.send(frame).map_err(|_| {
            ServerError::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response writer has stopped",
            ))
        })
    }
}

async fn write_frames<W>(mut rx: mpsc::UnboundedReceiver<String>, writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedWrite::new(writer, LinesCodec::new());
    while let Some(frame) = rx.recv().await {
        frames.send(frame).await.map_err(codec_error)?;
    }
    SinkExt::<String>::close(&mut frames)
        .await
        .map_err(codec_error)
}

/// The connection's stream, owned by the server for its whole lifetime.
pub struct Transport<R> {
    frames: FramedRead<R, FrameCodec>,
    sink: Option<ResponseSink>,
    writer: Option<JoinHandle<io::Result<()>>>,
}

impl<R: AsyncRead + Unpin> Transport<R> {
    pub fn new<W>(reader: R, writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            frames: FramedRead::new(reader, FrameCodec::new(MAX_FRAME_LENGTH)),
            sink: Some(ResponseSink { tx }),
            writer: Some(tokio::spawn(write_frames(rx, writer))),
        }
    }

    /// Next incoming line, or `None` once the client closed its side.
    pub async fn next_frame(&mut self) -> Option<io::Result<Frame>> {
        self.frames.next().await
    }

    /// A handle for writing responses, or `None` after [`close`](Self::close).
    pub fn sink(&self) -> Option<ResponseSink> {
        self.sink.clone()
    }

    /// Flush pending responses and release the writer. Safe to call twice.
    ///
    /// Responses still queued by clones of the sink are written before the
    /// writer exits, so callers should drop those clones first.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        self.sink = None;
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };

        match writer.await {
            Ok(result) => result.map_err(ServerError::from),
            Err(e) => Err(ServerError::Task(e.to_string())),
        }
    }
}
