//! Participant WebSocket lifecycle: join handshake, message loop, and room
//! attach/detach. A reconnect is a fresh socket binding the same stable
//! participant identity back to its room.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    dto::ws::ParticipantInboundMessage,
    state::SharedState,
    state::card::Position,
    state::room::{RoomCommand, RoomHandle},
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual participant WebSocket
/// connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(JOIN_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match ParticipantInboundMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse or validate join message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ParticipantInboundMessage::Join {
        room_id,
        participant_id,
    } = inbound
    else {
        warn!("first message was not a join");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let room = state.ensure_room(&room_id).await;
    if room
        .send(RoomCommand::Join {
            participant_id: participant_id.clone(),
            tx: outbound_tx.clone(),
        })
        .is_err()
    {
        warn!(room_id, participant_id, "room refused the connection");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    info!(room_id, participant_id, "participant socket joined");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match ParticipantInboundMessage::from_json_str(&text) {
                    Ok(msg) => dispatch(&room, &participant_id, msg),
                    Err(err) => {
                        warn!(participant_id, error = %err, "failed to parse or validate participant message");
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(participant_id, "participant closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(participant_id, error = %err, "websocket error");
                break;
            }
        }
    }

    let _ = room.send(RoomCommand::Leave {
        participant_id: participant_id.clone(),
    });
    info!(room_id, participant_id, "participant socket detached");

    finalize(writer_task, outbound_tx).await;
}

/// Forward one decoded message onto the room's serialized queue.
fn dispatch(room: &RoomHandle, participant_id: &str, message: ParticipantInboundMessage) {
    let command = match message {
        ParticipantInboundMessage::MarkSquare { position } => {
            // Position syntax was validated at decode time.
            let Ok(position) = position.parse::<Position>() else {
                return;
            };
            RoomCommand::Mark {
                participant_id: participant_id.to_string(),
                position,
            }
        }
        ParticipantInboundMessage::ClaimWin => RoomCommand::ClaimWin {
            participant_id: participant_id.to_string(),
        },
        ParticipantInboundMessage::PlaybackReport { playing } => RoomCommand::PlaybackReport {
            participant_id: participant_id.to_string(),
            playing,
        },
        ParticipantInboundMessage::Join { .. } => {
            warn!(participant_id, "ignoring duplicate join message");
            return;
        }
        ParticipantInboundMessage::Unknown => {
            warn!(participant_id, "ignoring unknown message type");
            return;
        }
    };

    if room.send(command).is_err() {
        warn!(participant_id, "room queue closed; dropping message");
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
