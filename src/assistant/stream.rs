//! Stream fork for dual consumption.
//!
//! The gateway hands back one byte stream; the client needs it token by
//! token while storage needs the assembled whole. A forwarder task
//! copies each chunk into two unbounded channels so neither consumer's
//! pace (or disappearance) affects the other - a guest closing the tab
//! never stops the persistence side.

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::gateway::GatewayError;

/// Items flowing through a forked stream.
pub type StreamItem = Result<Bytes, GatewayError>;

/// Fork one byte stream into two independent consumers.
///
/// Buffering is unbounded on both sides: the persistence consumer must
/// never exert back-pressure on the client-facing copy. A dropped
/// receiver simply stops receiving; forwarding to the other continues.
pub fn tee<S>(upstream: S) -> (UnboundedReceiver<StreamItem>, UnboundedReceiver<StreamItem>)
where
    S: Stream<Item = StreamItem> + Send + 'static,
{
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (store_tx, store_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        futures_util::pin_mut!(upstream);
        while let Some(item) = upstream.next().await {
            // Bytes clones are reference-counted; errors clone their message.
            let _ = client_tx.send(item.clone());
            let _ = store_tx.send(item);
        }
        // Channel senders drop here; receivers observe end-of-stream.
    });

    (client_rx, store_rx)
}

/// Adapt a receiver into a `Stream` (for `Body::from_stream`).
pub fn receiver_stream(
    rx: UnboundedReceiver<StreamItem>,
) -> impl Stream<Item = StreamItem> + Send {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&str]) -> Vec<StreamItem> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    async fn collect(mut rx: UnboundedReceiver<StreamItem>) -> Vec<StreamItem> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn both_sides_see_every_chunk_in_order() {
        let upstream = stream::iter(chunks(&["a", "b", "c"]));
        let (client_rx, store_rx) = tee(upstream);

        let client: Vec<_> = collect(client_rx).await;
        let store: Vec<_> = collect(store_rx).await;

        let text = |items: &[StreamItem]| -> String {
            items
                .iter()
                .map(|i| String::from_utf8_lossy(i.as_ref().unwrap()).into_owned())
                .collect()
        };
        assert_eq!(text(&client), "abc");
        assert_eq!(text(&store), "abc");
    }

    #[tokio::test]
    async fn dropped_client_does_not_stop_store_side() {
        let upstream = stream::iter(chunks(&["x", "y", "z"]));
        let (client_rx, store_rx) = tee(upstream);

        // The guest navigated away mid-stream.
        drop(client_rx);

        let store: Vec<_> = collect(store_rx).await;
        assert_eq!(store.len(), 3, "persistence side still sees the full stream");
    }

    #[tokio::test]
    async fn errors_are_forwarded_to_both_sides() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(GatewayError::Upstream {
                status: 502,
                body: "bad gateway".into(),
            }),
        ]);
        let (client_rx, store_rx) = tee(upstream);

        let client = collect(client_rx).await;
        let store = collect(store_rx).await;
        assert!(client[1].is_err());
        assert!(store[1].is_err());
    }

    #[tokio::test]
    async fn slow_store_consumer_does_not_block_client() {
        let upstream = stream::iter(chunks(&["1", "2", "3", "4"]));
        let (client_rx, store_rx) = tee(upstream);

        // Client drains fully while the store side has not read a byte.
        let client = collect(client_rx).await;
        assert_eq!(client.len(), 4);

        // Store side still gets everything afterwards.
        let store = collect(store_rx).await;
        assert_eq!(store.len(), 4);
    }
}
