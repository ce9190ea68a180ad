use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::domain::prelude::*;

/// Initialize the heartbeat channel.
/// This channel is used to tell live observers the connection is healthy
/// while their tenant has no traffic.
///
/// Heartbeats carry no tenant data, so a single channel serves every
/// connection.
///
pub fn channel(every: Duration) -> (broadcast::Sender<Heartbeat>, broadcast::Receiver<Heartbeat>) {
    let (tx, rx) = broadcast::channel(16);
    let tx_clone = tx.clone();

    let mut stream = stream_heartbeats(every);
    tokio::spawn(async move {
        while let Some(heartbeat) = stream.next().await {
            // no receivers is fine, nobody is connected
            let _ = tx_clone.send(heartbeat);
        }
    });
    (tx, rx)
}

/// A stream that generates a heartbeat every `every`.
///
fn stream_heartbeats(every: Duration) -> impl Stream<Item = Heartbeat> + Send {
    let stream = futures::stream::unfold((), move |()| async move {
        tokio::time::sleep(every).await;
        Some((Heartbeat::ok(), ()))
    });

    Box::pin(stream)
}
