//! Session loss handling
//!
//! Runs once when any screen observes `SessionEnded`. The session is torn
//! down, gameplay stops, game logic stays suspended until the user has
//! acknowledged the notification, and the runtime then returns to the menu.

use duelsync_core::{DuelResult, TaskScheduler, WaitUntil};
use tracing::{info, warn};

use crate::context::{GameContext, GAMEPLAY_LIST, GAME_LIST};
use crate::presentation::Notification;
use crate::session::SessionEndReason;

/// Returns false if the loss was already being handled
pub fn handle_session_loss(
    reason: SessionEndReason,
    scheduler: &mut TaskScheduler<GameContext>,
    ctx: &mut GameContext,
) -> DuelResult<bool> {
    if ctx.gate.is_suspended() {
        warn!(%reason, "session loss already handled");
        return Ok(false);
    }
    info!(%reason, frame = ctx.frame, "session lost");

    ctx.session.shutdown_session();
    scheduler.kill_all_tasks(GAMEPLAY_LIST, true, ctx)?;
    ctx.gate.suspend();
    // Keeps the game list occupied until the user has seen the notification
    scheduler.add_task(
        GAME_LIST,
        WaitUntil::new("await_acknowledgement", |ctx: &GameContext| !ctx.gate.is_suspended()),
        false,
        ctx,
    )?;

    ctx.notifications.push(Notification::new("Connection lost", message_for(reason)));
    Ok(true)
}

fn message_for(reason: SessionEndReason) -> &'static str {
    match reason {
        SessionEndReason::ClientSignedOut => "You signed out of the network session.",
        SessionEndReason::Disconnected => "The connection to the other players was lost.",
        SessionEndReason::HostEndedSession => "The host ended the session.",
        SessionEndReason::RemovedByHost => "You were removed from the session by the host.",
    }
}
