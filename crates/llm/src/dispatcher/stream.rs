use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{FutureExt, Stream};
use tokio::time::Sleep;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::Admitted;
use crate::{
    error::{ErrorKind, LlmError},
    messages::{StreamEvent, Usage},
    provider::EventStream,
    request::RequestContext,
};

/// Forwards the events of an adapter stream and accounts for the call when it ends.
///
/// Exactly one terminal event is delivered: the adapter's own, a synthesized `done` if
/// the adapter stopped without one, or an error when the call is cancelled or runs past
/// its deadline. Nothing follows the terminal event.
pub(super) struct MeteredStream {
    inner: EventStream,
    admitted: Admitted,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    deadline: Option<Pin<Box<Sleep>>>,
    last_usage: Option<Usage>,
}

impl MeteredStream {
    pub fn new(inner: EventStream, admitted: Admitted, context: &RequestContext) -> Self {
        let token = context.cancellation.clone();

        Self {
            inner,
            admitted,
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
            deadline: context
                .deadline
                .map(|deadline| Box::pin(tokio::time::sleep_until(deadline))),
            last_usage: None,
        }
    }

    fn usage(&self) -> Usage {
        self.last_usage.unwrap_or_default()
    }

    fn terminate(&mut self, error: LlmError) -> Poll<Option<StreamEvent>> {
        let usage = self.usage();
        self.admitted.fail(error.kind(), error.message(), usage);

        Poll::Ready(Some(StreamEvent::error(error.kind(), error.message())))
    }

    fn observe(&mut self, event: &StreamEvent) {
        if let Some(usage) = event.usage() {
            self.last_usage = Some(usage);
        }

        match event {
            StreamEvent::Delta { content, .. } => {
                if !content.is_empty() {
                    self.admitted.first_token();
                }
            }
            StreamEvent::Done { .. } => {
                let usage = self.usage();
                self.admitted.succeed(usage);
            }
            StreamEvent::Error { kind, message } => {
                let usage = self.usage();
                self.admitted.fail(*kind, message, usage);
            }
        }
    }
}

impl Stream for MeteredStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.admitted.is_finished() {
            return Poll::Ready(None);
        }

        if this.cancelled.poll_unpin(cx).is_ready() {
            return this.terminate(LlmError::cancelled());
        }

        if let Some(deadline) = &mut this.deadline
            && deadline.poll_unpin(cx).is_ready()
        {
            return this.terminate(LlmError::deadline_exceeded());
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(event)) => {
                this.observe(&event);
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                let usage = this.last_usage;
                this.admitted.succeed(usage.unwrap_or_default());

                Poll::Ready(Some(StreamEvent::Done {
                    finish_reason: None,
                    usage,
                }))
            }
        }
    }
}

impl Drop for MeteredStream {
    fn drop(&mut self) {
        if self.admitted.is_finished() {
            return;
        }

        self.token.cancel();

        let usage = self.usage();
        self.admitted
            .fail(ErrorKind::Cancelled, "the stream was closed by its consumer", usage);
    }
}
