//! Consumer side of a streamed pipeline run.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::report::PipelineEvent;

/// Lazy, finite, single-consumer sequence of [`PipelineEvent`]s for one run.
///
/// Ends right after the terminal event (success or failure). Dropping the
/// stream early closes the channel, which the producer observes at its next
/// suspension point and treats as cancellation.
pub struct ProgressStream {
    inner: ReceiverStream<PipelineEvent>,
    finished: bool,
}

impl ProgressStream {
    pub(crate) fn new(rx: mpsc::Receiver<PipelineEvent>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            finished: false,
        }
    }
}

impl Stream for ProgressStream {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                    self.inner.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
