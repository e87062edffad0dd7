//! The per-session player loop: dequeue, materialize, play, wait, repeat.

use std::{sync::atomic::Ordering, time::Duration};

use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use super::{session::Session, track::TrackRequest};
use crate::{
    common::errors::ResolveError, notify::TerminationReason, voice::VoiceConnection,
};

enum LoopExit {
    /// Nothing was queued for the whole idle timeout.
    Idle,
    /// The voice connection could not be re-established.
    ConnectionLost,
    Cancelled,
}

impl Session {
    /// Starts the player loop unless it is already running. Returns `true`
    /// when this call started it.
    pub fn start_player_loop(&self) -> bool {
        if self.is_terminated() {
            return false;
        }
        let Some(session) = self.me.upgrade() else {
            return false;
        };
        if self
            .loop_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        debug!("[{}] player loop started", self.channel_id);
        tokio::spawn(async move {
            let exit = tokio::select! {
                _ = session.cancel.cancelled() => LoopExit::Cancelled,
                exit = run(&session) => exit,
            };
            session.loop_running.store(false, Ordering::SeqCst);

            match exit {
                LoopExit::Idle => {
                    session.terminate(TerminationReason::IdleTimeout);
                }
                LoopExit::ConnectionLost => {
                    session.terminate(TerminationReason::ReconnectExhausted);
                }
                LoopExit::Cancelled => debug!("[{}] player loop cancelled", session.channel_id),
            }
        });
        true
    }

    /// Waits for the next request. Returns `None` once the idle timeout
    /// passes with nothing pending.
    async fn next_request(&self, idle: Duration) -> Option<TrackRequest> {
        loop {
            if let Some(request) = self.state.lock().take_next() {
                return Some(request);
            }
            if timeout(idle, self.wake.notified()).await.is_err() {
                return self.state.lock().take_next();
            }
        }
    }
}

async fn run(session: &Session) -> LoopExit {
    let config = session.deps.config.clone();

    loop {
        let Some(request) = session.next_request(config.idle_timeout()).await else {
            info!(
                "[{}] idle for {:?}, leaving",
                session.channel_id,
                config.idle_timeout()
            );
            return LoopExit::Idle;
        };

        let track = match timeout(
            config.extraction_timeout(),
            session.deps.resolver.materialize(&request),
        )
        .await
        {
            Ok(Ok(track)) => track,
            Ok(Err(e)) => {
                session.track_failed(&request, e.to_string());
                continue;
            }
            Err(_) => {
                let e = ResolveError::Timeout(config.extraction_timeout());
                session.track_failed(&request, e.to_string());
                continue;
            }
        };

        let conn = match session.ensure_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("[{}] giving up on voice: {}", session.channel_id, e);
                return LoopExit::ConnectionLost;
            }
        };

        if let Err(e) = conn.play(&track).await {
            if !conn.is_connected() {
                debug!("[{}] connection dropped before playback: {}", session.channel_id, e);
                session.requeue_front(request);
                continue;
            }
            session.track_failed(&request, e.to_string());
            continue;
        }

        session.track_started(track);
        wait_for_completion(conn.as_ref(), config.poll_interval()).await;
        session.track_finished();
    }
}

/// Polls the connection until the track is over. A dropped connection
/// counts as over; the next iteration reconnects.
async fn wait_for_completion(conn: &dyn VoiceConnection, poll: Duration) {
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !conn.is_connected() || !conn.status().is_active() {
            break;
        }
    }
}
