//! Streaming response consumer.
//!
//! Runs the agent's reply stream to completion on its own task, forwarding
//! chunks to the coordinator in delivery order and closing with the full
//! accumulated text. The task is deliberately allowed to outlive the turn
//! that started it: the coordinator discards updates whose generation no
//! longer matches the active session.

use crate::error::Result;
use crate::service::ReplyStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

/// Progress of one reply stream, tagged with the session generation it was
/// started under.
#[derive(Debug)]
pub enum StreamUpdate {
    /// The next text chunk, in delivery order.
    Chunk { generation: u64, text: String },
    /// The stream finished: the full accumulated reply, or the failure that
    /// interrupted it.
    Ended {
        generation: u64,
        result: Result<String>,
    },
}

/// Drive `stream` to completion, forwarding every chunk and a final
/// [`StreamUpdate::Ended`] on `tx`. Chunks are never reordered or dropped.
pub async fn consume(mut stream: ReplyStream, tx: mpsc::UnboundedSender<StreamUpdate>, generation: u64) {
    let mut full = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                full.push_str(&text);
                if tx
                    .send(StreamUpdate::Chunk {
                        generation,
                        text,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                debug!("reply stream failed after {} bytes: {e}", full.len());
                let _ = tx.send(StreamUpdate::Ended {
                    generation,
                    result: Err(e),
                });
                return;
            }
        }
    }
    debug!("reply stream complete ({} bytes)", full.len());
    let _ = tx.send(StreamUpdate::Ended {
        generation,
        result: Ok(full),
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::ClientError;
    use crate::transcript::Transcript;
    use futures_util::stream;

    fn reply(chunks: Vec<Result<String>>) -> ReplyStream {
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn chunks_arrive_in_delivery_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chunks = reply(vec![
            Ok("Tell".to_owned()),
            Ok(" me".to_owned()),
            Ok(" more.".to_owned()),
        ]);
        consume(chunks, tx, 1).await;

        // Apply the updates the way the coordinator does and watch the
        // streaming turn pass through every intermediate state.
        let mut transcript = Transcript::new();
        let mut observed = Vec::new();
        let mut ended = None;
        while let Some(update) = rx.recv().await {
            match update {
                StreamUpdate::Chunk { text, .. } => {
                    transcript.append_streaming(&text);
                    observed.push(transcript.streaming_text().unwrap().to_owned());
                }
                StreamUpdate::Ended { result, .. } => ended = Some(result),
            }
        }
        assert_eq!(observed, vec!["Tell", "Tell me", "Tell me more."]);
        let full = ended.unwrap().unwrap();
        assert_eq!(full, "Tell me more.");
        assert_eq!(transcript.finish_streaming().unwrap(), "Tell me more.");
    }

    #[tokio::test]
    async fn failure_ends_the_stream_after_partial_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chunks = reply(vec![
            Ok("partial".to_owned()),
            Err(ClientError::ResponseFailed("connection reset".to_owned())),
            Ok("never delivered".to_owned()),
        ]);
        consume(chunks, tx, 7).await;

        let mut texts = Vec::new();
        let mut ended = None;
        while let Some(update) = rx.recv().await {
            match update {
                StreamUpdate::Chunk { generation, text } => {
                    assert_eq!(generation, 7);
                    texts.push(text);
                }
                StreamUpdate::Ended { result, .. } => ended = Some(result),
            }
        }
        assert_eq!(texts, vec!["partial"]);
        assert!(matches!(ended, Some(Err(ClientError::ResponseFailed(_)))));
    }

    #[tokio::test]
    async fn empty_stream_ends_with_empty_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        consume(reply(Vec::new()), tx, 0).await;
        match rx.recv().await.unwrap() {
            StreamUpdate::Ended { result, .. } => assert_eq!(result.unwrap(), ""),
            StreamUpdate::Chunk { .. } => panic!("no chunks expected"),
        }
    }
}
