//! Process output channels
//!
//! A [`ProcessOutput`] wraps one raw byte source (a child's stdout or stderr
//! pipe, or an in-memory channel) and drains it into an unbounded queue as
//! soon as it is created. A child process whose output nobody is reading yet
//! therefore never blocks on a full pipe.
//!
//! The queued output can be taken exactly once, either as bytes
//! ([`ProcessOutput::bytes`]) or as incrementally decoded UTF-8 text
//! ([`ProcessOutput::text`]).

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use bytes::Bytes;
use encoding_rs::{Decoder, UTF_8};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Errors from the one-shot output API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    /// `.bytes()` or `.text()` was already called on this channel
    #[error("Only one stream can be opened via .bytes() or .text(). This stream has already been opened.")]
    AlreadyStarted,

    /// The channel finished draining before anyone opened it
    #[error("The output stream has already been closed.")]
    AlreadyDone,

    /// Reading the underlying source failed
    #[error("Failed to read process output: {0}")]
    Io(String),
}

/// Where a channel's bytes come from
enum ByteSource {
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Channel(mpsc::UnboundedReceiver<Bytes>),
}

impl ByteSource {
    async fn next_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<Option<Bytes>> {
        match self {
            Self::Reader(reader) => {
                let n = reader.read(buf).await?;
                if n == 0 {
                    Ok(None)
                } else {
                    Ok(Some(Bytes::copy_from_slice(&buf[..n])))
                }
            }
            Self::Channel(rx) => Ok(rx.recv().await),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DrainState {
    Draining,
    Finished,
    Cancelled,
    Failed(String),
}

struct Shared {
    started: bool,
    queue: Option<mpsc::UnboundedReceiver<Bytes>>,
}

/// A one-shot, dual-view channel over a single process stream
pub struct ProcessOutput<M> {
    metadata: M,
    shared: Mutex<Shared>,
    state: watch::Receiver<DrainState>,
    cancel: watch::Sender<bool>,
}

impl<M> ProcessOutput<M> {
    /// Wrap an async reader such as a child's stdout pipe
    pub fn from_reader<R>(reader: R, metadata: M) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (output, queue) = Self::spawn(ByteSource::Reader(Box::new(reader)), metadata);
        output.unopened(queue)
    }

    /// Wrap an in-memory stream of chunks; the channel ends when every sender is dropped
    pub fn from_receiver(receiver: mpsc::UnboundedReceiver<Bytes>, metadata: M) -> Self {
        let (output, queue) = Self::spawn(ByteSource::Channel(receiver), metadata);
        output.unopened(queue)
    }

    /// Like [`ProcessOutput::from_reader`], with the byte view already opened.
    ///
    /// Used where the consumer must be attached before the drain can finish.
    pub(crate) fn from_reader_opened<R>(reader: R, metadata: M) -> (Self, ByteStream)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (output, queue) = Self::spawn(ByteSource::Reader(Box::new(reader)), metadata);
        (output, ByteStream::new(queue))
    }

    /// Start draining `source`; the returned channel counts as opened
    fn spawn(source: ByteSource, metadata: M) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DrainState::Draining);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(drain(source, queue_tx, state_tx, cancel_rx));

        let output = Self {
            metadata,
            shared: Mutex::new(Shared {
                started: true,
                queue: None,
            }),
            state: state_rx,
            cancel: cancel_tx,
        };
        (output, queue_rx)
    }

    fn unopened(mut self, queue: mpsc::UnboundedReceiver<Bytes>) -> Self {
        let shared = self.shared.get_mut().unwrap_or_else(|e| e.into_inner());
        shared.started = false;
        shared.queue = Some(queue);
        self
    }

    /// Metadata attached to this channel
    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Open the raw byte view
    pub fn bytes(&self) -> Result<ByteStream, OutputError> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if *self.state.borrow() != DrainState::Draining {
            return Err(OutputError::AlreadyDone);
        }
        if shared.started {
            return Err(OutputError::AlreadyStarted);
        }
        shared.started = true;
        let queue = shared.queue.take().ok_or(OutputError::AlreadyStarted)?;
        Ok(ByteStream::new(queue))
    }

    /// Open the decoded text view
    pub fn text(&self) -> Result<TextStream, OutputError> {
        self.bytes().map(ByteStream::into_text)
    }

    /// Whether the drain has finished, successfully or not
    pub fn is_done(&self) -> bool {
        *self.state.borrow() != DrainState::Draining
    }

    /// Whether [`ProcessOutput::cancel`] stopped the drain
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow() == DrainState::Cancelled
    }

    /// Wait for the drain to finish.
    ///
    /// Resolves `Ok` at end of stream or after cancellation, `Err` when the
    /// source failed.
    pub async fn done(&self) -> Result<(), OutputError> {
        let mut state = self.state.clone();
        let result = state
            .wait_for(|s| *s != DrainState::Draining)
            .await
            .map(|s| s.clone());
        match result {
            Ok(DrainState::Failed(e)) => Err(OutputError::Io(e)),
            _ => Ok(()),
        }
    }

    /// Stop draining and drop the underlying source
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

async fn drain(
    mut source: ByteSource,
    queue: mpsc::UnboundedSender<Bytes>,
    state: watch::Sender<DrainState>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0usize;

    let outcome = loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_ok() && *cancel.borrow() {
                    break DrainState::Cancelled;
                }
                // cancel handle dropped, keep draining
                if changed.is_err() {
                    break drain_to_end(&mut source, &queue, &mut buf, &mut total).await;
                }
            }
            chunk = source.next_chunk(&mut buf) => match chunk {
                Ok(Some(bytes)) => {
                    total += bytes.len();
                    trace!(len = bytes.len(), "drained output chunk");
                    // a dropped consumer just discards
                    let _ = queue.send(bytes);
                }
                Ok(None) => break DrainState::Finished,
                Err(e) => break DrainState::Failed(e.to_string()),
            },
        }
    };

    drop(source);
    drop(queue);
    debug!(bytes = total, state = ?outcome, "output drain finished");
    let _ = state.send(outcome);
}

async fn drain_to_end(
    source: &mut ByteSource,
    queue: &mpsc::UnboundedSender<Bytes>,
    buf: &mut [u8],
    total: &mut usize,
) -> DrainState {
    loop {
        match source.next_chunk(buf).await {
            Ok(Some(bytes)) => {
                *total += bytes.len();
                let _ = queue.send(bytes);
            }
            Ok(None) => return DrainState::Finished,
            Err(e) => return DrainState::Failed(e.to_string()),
        }
    }
}

/// Raw byte view of a channel
pub struct ByteStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ByteStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Next chunk, `None` once the channel has ended
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Decode this stream as UTF-8 text
    pub fn into_text(self) -> TextStream {
        TextStream {
            bytes: self,
            decoder: Some(UTF_8.new_decoder_without_bom_handling()),
        }
    }
}

impl Stream for ByteStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Text view of a channel.
///
/// Multi-byte characters split across chunk boundaries are held back until
/// the rest of the sequence arrives; a trailing incomplete sequence is
/// flushed (as U+FFFD) when the stream ends. Chunks that decode to nothing
/// are not yielded.
pub struct TextStream {
    bytes: ByteStream,
    decoder: Option<Decoder>,
}

impl TextStream {
    /// Next decoded chunk, `None` once the channel has ended
    pub async fn next_text(&mut self) -> Option<String> {
        futures::StreamExt::next(self).await
    }
}

fn decode_into(decoder: &mut Decoder, src: &[u8], last: bool) -> String {
    let capacity = decoder
        .max_utf8_buffer_length(src.len())
        .unwrap_or(src.len() * 3 + 4);
    let mut out = String::with_capacity(capacity);
    let _ = decoder.decode_to_string(src, &mut out, last);
    out
}

impl Stream for TextStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            let Some(decoder) = this.decoder.as_mut() else {
                return Poll::Ready(None);
            };
            match this.bytes.rx.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(chunk)) => {
                    let text = decode_into(decoder, &chunk, false);
                    if !text.is_empty() {
                        return Poll::Ready(Some(text));
                    }
                }
                Poll::Ready(None) => {
                    let flushed = decode_into(decoder, &[], true);
                    this.decoder = None;
                    if !flushed.is_empty() {
                        return Poll::Ready(Some(flushed));
                    }
                }
            }
        }
    }
}
