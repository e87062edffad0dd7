use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::AppState;
use crate::{
    common::{errors::SessionError, types::UserId},
    notify::TerminationReason,
    player::{PlaybackControl, Session},
    protocol::Command,
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AppState {
    pub fn is_owner(&self, user_id: Option<UserId>) -> bool {
        user_id.is_some() && user_id == self.config.server.owner_id
    }

    /// Authorizes and runs one command against `session`. Returns an
    /// optional human-readable result for the acknowledgement.
    pub async fn run_command(
        &self,
        session: &Arc<Session>,
        caller: Option<UserId>,
        command: Command,
    ) -> Result<Option<String>, CommandError> {
        let owner = self.is_owner(caller);
        if command.is_admin() && !owner {
            return Err(CommandError::Unauthorized("only the bot owner can do that"));
        }
        if command.requires_dj() && !owner && !caller.is_some_and(|u| session.is_dj(u)) {
            return Err(CommandError::Unauthorized("only the DJ can do that"));
        }

        let message = match command {
            Command::Play { query } => {
                let requester = caller.ok_or(CommandError::Unauthorized("sign in to queue tracks"))?;
                session
                    .play(query.as_deref(), requester)
                    .await?
                    .map(|r| format!("queued `{}`", r.title))
            }
            Command::QueueAdd { query } => {
                let requester = caller.ok_or(CommandError::Unauthorized("sign in to queue tracks"))?;
                let request = session.queue_add(&query, requester).await?;
                Some(format!("queued `{}`", request.title))
            }
            Command::Pause => session.pause().map(|_| None)?,
            Command::Resume => session.resume().map(|_| None)?,
            Command::Skip => session.skip().map(|_| None)?,
            Command::Stop => PlaybackControl::stop(&**session).map(|_| None)?,
            Command::SetVolume { volume } => Some(format!("volume set to {}", session.set_volume(volume)?)),
            Command::QueueRemove { index } => Some(format!("removed `{}`", session.queue_remove(index)?.title)),
            Command::QueueJump { index } => session.queue_jump(index).map(|_| None)?,
            Command::EqPreset { preset } => session.eq_preset(&preset).map(|_| None)?,
            Command::EqUpdate { band, gain } => session.eq_update(band, gain).map(|_| None)?,
            Command::ShuffleToggle => Some(on_off("shuffle", session.shuffle_toggle()?)),
            Command::RepeatToggle => Some(on_off("loop", session.repeat_toggle()?)),
            Command::PromoteDj { user_id } => session.promote_dj(user_id).map(|_| None)?,
            Command::ForceStop => {
                info!("[{}] force-stopped by owner", session.channel_id);
                session.terminate(TerminationReason::Stopped);
                None
            }
            Command::RevokeTokens => {
                let revoked = self.tokens.revoke_session(session.channel_id);
                Some(format!("revoked {} tokens", revoked))
            }
        };
        Ok(message)
    }
}

fn on_off(what: &str, enabled: bool) -> String {
    format!("{} {}", what, if enabled { "on" } else { "off" })
}
