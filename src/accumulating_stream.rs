//! Turns response chunks into text deltas while accumulating the full reply.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::oneshot;

use crate::types::{GenerateContentResponse, TextDelta};
use crate::{Error, Result};

/// A stream wrapper that maps `GenerateContentResponse` chunks to [`TextDelta`]s.
///
/// Chunks without answer text (usage-only or finish-only chunks) are skipped. A
/// chunk that reports a block reason ends the stream with [`Error::Blocked`].
/// When the inner stream ends cleanly, the concatenated reply is sent on the
/// oneshot channel returned by `new()`. If the stream fails or is dropped
/// before it ends, the sender is dropped instead, so the receiver only ever
/// sees complete replies.
pub struct AccumulatingStream {
    inner: Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>,
    reply_tx: Option<oneshot::Sender<String>>,
    reply: String,
    finished: bool,
}

impl AccumulatingStream {
    /// Wraps a chunk stream.
    ///
    /// Returns the delta stream and a receiver that will contain the full reply
    /// once the stream is fully drained.
    pub fn new<S>(stream: S) -> (Self, oneshot::Receiver<String>)
    where
        S: Stream<Item = Result<GenerateContentResponse>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            reply_tx: Some(tx),
            reply: String::new(),
            finished: false,
        };
        (this, rx)
    }

    fn fail(&mut self, err: Error) -> Poll<Option<Result<TextDelta>>> {
        self.finished = true;
        self.reply_tx = None;
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for AccumulatingStream {
    type Item = Result<TextDelta>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let text = chunk.text();
                    if let Some(reason) = chunk.block_reason() {
                        return self.fail(Error::blocked(reason));
                    }
                    if text.is_empty() {
                        continue;
                    }
                    self.reply.push_str(&text);
                    return Poll::Ready(Some(Ok(TextDelta::new(text))));
                }
                Poll::Ready(Some(Err(e))) => return self.fail(e),
                Poll::Ready(None) => {
                    self.finished = true;
                    if let Some(tx) = self.reply_tx.take() {
                        let reply = std::mem::take(&mut self.reply);
                        let _ = tx.send(reply);
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
