use crate::core::prelude::*;
use crate::domain::prelude::*;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use models::{ChannelMsg, WsMessage};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use super::auth::CallerIdentity;

/// Module for models for the websocket API.
///
/// This module includes the message types for the websocket API such as
/// subscribe, unsubscribe, telemetry and heartbeat messages.
///
mod models {
    use crate::domain::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Serialize, Debug)]
    #[serde(tag = "method")]
    pub enum WsMessage {
        #[serde(rename = "subscribe")]
        Subscribe { params: ChannelParams },
        #[serde(rename = "unsubscribe")]
        Unsubscribe { params: ChannelParams },
    }

    #[derive(Deserialize, Serialize, Debug)]
    pub struct ChannelParams {
        pub channel: String,
    }

    #[derive(Deserialize, Serialize, Debug)]
    #[serde(tag = "channel")]
    pub enum ChannelMsg {
        #[serde(rename = "telemetry")]
        Telemetry { data: LiveUpdate },

        #[serde(rename = "heartbeat")]
        Heartbeat { data: Heartbeat },
    }
}

/// Module for the websocket client.
///
/// This module tracks which of its tenant's streams a connection wants.
/// The tenant itself is fixed at connect time and cannot be changed by any
/// message.
///
pub mod client {
    use std::collections::HashSet;

    /// The streams available on a tenant's live channel.
    ///
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub enum Channel {
        Telemetry,
        Heartbeat,
    }

    impl std::str::FromStr for Channel {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "telemetry" => Ok(Self::Telemetry),
                "heartbeat" => Ok(Self::Heartbeat),
                _ => Err(()),
            }
        }
    }

    /// The websocket client struct.
    ///
    /// A new connection receives both streams until it unsubscribes.
    ///
    #[derive(Debug)]
    pub struct WsClient {
        pub channels: HashSet<Channel>,
    }

    impl Default for WsClient {
        fn default() -> Self {
            Self {
                channels: HashSet::from([Channel::Telemetry, Channel::Heartbeat]),
            }
        }
    }

    impl WsClient {
        pub fn subscribe(&mut self, channel: Channel) -> &Self {
            self.channels.insert(channel);
            self
        }

        pub fn unsubscribe(&mut self, channel: Channel) -> &Self {
            self.channels.remove(&channel);
            self
        }

        pub fn wants(&self, channel: Channel) -> bool {
            self.channels.contains(&channel)
        }
    }
}

/// The endpoint for the live channel.
///
/// The caller is authenticated before the upgrade: a missing or invalid
/// credential is answered with 401 and no socket is ever opened. Once
/// upgraded, the connection is joined to its tenant's room for the rest of
/// the session.
///
pub async fn endpoint(
    State(state): State<AppState>,
    caller: CallerIdentity,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    /// Splits the websocket into a sink and stream and runs the read and
    /// write sides until either finishes.
    ///
    async fn handle(socket: WebSocket, state: AppState, caller: CallerIdentity) {
        let room = caller.tenant_id.room_key();
        let updates = state.rooms.join(&caller.tenant_id);
        let heartbeats = state.heartbeat_tx.subscribe();
        info!(%room, subject = %caller.subject, "observer joined");

        let (sender, receiver) = socket.split();
        let client = Arc::new(RwLock::new(client::WsClient::default()));
        let (ack_tx, ack_rx) = mpsc::channel(8);

        let read_task = tokio::spawn(read(receiver, client.clone(), ack_tx));
        let write_task = tokio::spawn(write(sender, client, updates, heartbeats, ack_rx));

        tokio::select! {
            _ = read_task => {},
            _ = write_task => {},
        }
        info!(%room, subject = %caller.subject, "observer left");
    }
    // upgrade the websocket connection using the ws handler
    ws.on_upgrade(move |socket| handle(socket, state, caller))
}

/// Read side of the websocket connection.
///
/// Applies subscribe/unsubscribe requests to the client and hands the
/// acknowledgement to the write side.
///
async fn read(
    mut receiver: SplitStream<WebSocket>,
    client: Arc<RwLock<client::WsClient>>,
    ack_tx: mpsc::Sender<ChannelMsg>,
) {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let ack = match serde_json::from_str::<WsMessage>(&text) {
                    Ok(ws_msg) => {
                        let mut client = client.write().await;
                        handle_message(&ws_msg, &mut client)
                    }
                    Err(e) => status(format!("Invalid message: {e}")),
                };
                if ack_tx.send(ack).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Write side of the websocket connection.
///
/// Forwards the tenant's live updates and the shared heartbeats, filtered by
/// the client's subscriptions, plus acknowledgements from the read side.
///
/// Updates missed because the connection fell behind are dropped, not
/// replayed.
///
async fn write(
    mut sender: SplitSink<WebSocket, Message>,
    client: Arc<RwLock<client::WsClient>>,
    mut updates: broadcast::Receiver<LiveUpdate>,
    mut heartbeats: broadcast::Receiver<Heartbeat>,
    mut acks: mpsc::Receiver<ChannelMsg>,
) {
    loop {
        let msg = tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if !client.read().await.wants(client::Channel::Telemetry) {
                        continue;
                    }
                    ChannelMsg::Telemetry { data: update }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "observer lagging, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            heartbeat = heartbeats.recv() => match heartbeat {
                Ok(heartbeat) => {
                    if !client.read().await.wants(client::Channel::Heartbeat) {
                        continue;
                    }
                    ChannelMsg::Heartbeat { data: heartbeat }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            ack = acks.recv() => match ack {
                Some(ack) => ack,
                None => break,
            },
        };

        if send_message(&msg, &mut sender).await.is_err() {
            break;
        }
    }
}

/// Handles an incoming request and returns the acknowledgement.
///
fn handle_message(msg: &WsMessage, client: &mut client::WsClient) -> ChannelMsg {
    let text = match msg {
        WsMessage::Subscribe { params } => match params.channel.parse().ok() {
            None => format!("Invalid channel: {}", params.channel),
            Some(channel) => {
                client.subscribe(channel);
                format!("Successfully subscribed to {} channel", params.channel)
            }
        },

        WsMessage::Unsubscribe { params } => match params.channel.parse().ok() {
            None => format!("Invalid channel: {}", params.channel),
            Some(channel) => {
                client.unsubscribe(channel);
                format!("Successfully unsubscribed from {} channel", params.channel)
            }
        },
    };

    status(text)
}

fn status(text: String) -> ChannelMsg {
    ChannelMsg::Heartbeat {
        data: Heartbeat { status: text },
    }
}

/// Sends a message by serializing the message and sending it to the websocket.
///
/// A serialization failure is logged and skipped; a send failure means the
/// peer is gone and is returned so the caller can stop.
///
async fn send_message(
    msg: &ChannelMsg,
    sender: &mut SplitSink<WebSocket, Message>,
) -> std::result::Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(serialized) => sender.send(Message::Text(serialized.into())).await,
        Err(e) => {
            warn!(error = %e, "dropping unserializable message");
            Ok(())
        }
    }
}
