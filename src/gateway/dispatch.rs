//! Routes one inbound viewer frame: handshakes bind the connection, commands
//! run against the bound session and are always acknowledged.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::hub::{Binding, ConnectionId};
use crate::{
    common::errors::AuthError,
    player::Session,
    protocol::{AckStatus, Command, CommandParseError, IncomingMessage, OutgoingMessage},
    server::{AppState, CommandError},
};

pub async fn handle_message(state: &Arc<AppState>, conn: ConnectionId, text: &str) {
    let msg = match serde_json::from_str::<IncomingMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            if state.hub.is_authenticated(conn) {
                warn!("viewer {} sent an unreadable frame: {}", conn, e);
                state.hub.send_to(
                    conn,
                    &OutgoingMessage::ack("unknown", AckStatus::Error, Some(format!("malformed message: {}", e))),
                );
            } else {
                reject(state, conn, AuthError::BadHandshake(e.to_string()));
            }
            return;
        }
    };

    match msg {
        IncomingMessage::Command { command, data } => run_command(state, conn, command, data).await,
        handshake => match authenticate(state, handshake) {
            Ok((binding, session)) => bind(state, conn, binding, session),
            Err(e) => reject(state, conn, e),
        },
    }
}

/// Turns a handshake into a binding. A native handshake with no matching
/// session still succeeds, bound to nothing. Only token handshakes carry a
/// user identity.
fn authenticate(
    state: &AppState,
    handshake: IncomingMessage,
) -> Result<(Binding, Option<Arc<Session>>), AuthError> {
    match handshake {
        IncomingMessage::Auth { token } => {
            let record = state.tokens.validate(&token)?;
            let session = state
                .session(record.session_id)
                .ok_or_else(|| AuthError::BadHandshake("session has ended".to_string()))?;
            let binding = Binding {
                user_id: Some(record.user_id),
                guild_id: Some(session.guild_id),
                session: Some(session.channel_id),
            };
            Ok((binding, Some(session)))
        }
        IncomingMessage::NativeAuth {
            guild_id,
            channel_id,
            user_id,
        } => {
            // Nothing vouches for the claimed user, so native viewers are
            // watch-only. Control goes through an issued token.
            if let Some(claimed) = user_id {
                debug!("native handshake claims user {}, binding without identity", claimed);
            }
            let session = state.session_for_native(guild_id, channel_id);
            let binding = Binding {
                user_id: None,
                guild_id: Some(guild_id),
                session: session.as_ref().map(|s| s.channel_id),
            };
            Ok((binding, session))
        }
        IncomingMessage::Command { .. } => Err(AuthError::BadHandshake("expected a handshake".to_string())),
    }
}

/// Subscribes the connection and sends the full current state in the same
/// step, so nothing broadcast afterwards can arrive before it.
fn bind(state: &AppState, conn: ConnectionId, binding: Binding, session: Option<Arc<Session>>) {
    debug!("viewer {} bound to {:?}", conn, binding.session);
    if !state.hub.bind(conn, binding) {
        return;
    }
    let snapshot = session.filter(|s| !s.is_terminated()).map(|s| s.snapshot());
    state
        .hub
        .send_to(conn, &OutgoingMessage::AuthSuccess { state: snapshot });
}

fn reject(state: &AppState, conn: ConnectionId, error: AuthError) {
    debug!("viewer {} handshake rejected: {}", conn, error);
    state.hub.send_to(
        conn,
        &OutgoingMessage::AuthFailed {
            reason: error.to_string(),
        },
    );
}

async fn run_command(state: &Arc<AppState>, conn: ConnectionId, name: String, data: Value) {
    let ack = |status, message: Option<String>| OutgoingMessage::ack(name.clone(), status, message);

    let Some(binding) = state.hub.binding(conn) else {
        state.hub.send_to(
            conn,
            &ack(AckStatus::Unauthenticated, Some("authenticate first".to_string())),
        );
        return;
    };

    let command = match Command::parse(&name, data) {
        Ok(command) => command,
        Err(e @ CommandParseError::Unknown(_)) => {
            state.hub.send_to(conn, &ack(AckStatus::UnknownCommand, Some(e.to_string())));
            return;
        }
        Err(e) => {
            state.hub.send_to(conn, &ack(AckStatus::Error, Some(e.to_string())));
            return;
        }
    };

    let Some(session) = binding.session.and_then(|c| state.session(c)) else {
        state.hub.send_to(
            conn,
            &ack(AckStatus::NoSession, Some("no active session".to_string())),
        );
        return;
    };

    let reply = match state.run_command(&session, binding.user_id, command).await {
        Ok(message) => ack(AckStatus::Ok, message),
        Err(CommandError::Unauthorized(reason)) => ack(AckStatus::Unauthorized, Some(reason.to_string())),
        Err(CommandError::Session(e)) => {
            debug!("[{}] command `{}` failed: {}", session.channel_id, name, e);
            ack(AckStatus::Error, Some(e.to_string()))
        }
    };
    state.hub.send_to(conn, &reply);
}
