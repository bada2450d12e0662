//! Disconnects, departures and session teardown during a match


use duelsync_core::PlayerSlot;
use duelsync_runtime::{MatchState, ScreenKind, GAMEPLAY_LIST, GAME_LIST};
use test_utils::{config_with, hundred_health, Table};

#[test]
fn test_host_ending_session_notifies_client_once() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.start_duel();
    table.run_until(100, |t| t.match_state(1) == Some(MatchState::WaitForAnswer));

    let id = table.rt(0).context().session.session_id().unwrap();
    let client = table.gamer(1);
    table.network.end_session(id);
    let sent = table.network.packets_sent_by(&client);

    table.run(30);

    let runtime = table.rt(1);
    assert_eq!(runtime.screen(), ScreenKind::SessionLost);
    assert_eq!(runtime.context().notifications.total(), 1);
    assert_eq!(
        runtime.context().notifications.current().map(|n| n.title.as_str()),
        Some("Connection lost")
    );
    assert!(runtime.context().gate.is_suspended());
    assert!(!runtime.context().session.is_active());
    assert_eq!(runtime.scheduler().live_count(GAMEPLAY_LIST), 0);
    assert_eq!(table.network.packets_sent_by(&client), sent);
}

#[test]
fn test_acknowledging_loss_returns_to_menu() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.start_duel();

    let id = table.rt(0).context().session.session_id().unwrap();
    table.network.end_session(id);
    table.run_until(10, |t| t.rt(1).screen() == ScreenKind::SessionLost);

    // Only the animation clock and the acknowledgement waiter remain
    assert_eq!(table.rt(1).scheduler().live_count(GAME_LIST), 2);

    assert!(table.rt_mut(1).acknowledge_notification());
    assert_eq!(table.rt(1).screen(), ScreenKind::MainMenu);
    assert!(!table.rt(1).context().gate.is_suspended());

    table.frame();
    assert_eq!(table.rt(1).scheduler().live_count(GAME_LIST), 1);
    assert!(!table.rt_mut(1).acknowledge_notification());
}

#[test]
fn test_fighter_departure_awards_the_win() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.start_duel();
    table.run_until(100, |t| t.match_state(0) == Some(MatchState::WaitForAnswer));

    let client = table.gamer(1);
    table.network.disconnect(&client);
    table.run_until(200, |t| t.is_finished(0));

    let host = table.rt(0).match_sync().unwrap();
    assert_eq!(host.winner(), Some(PlayerSlot::One));
    assert_eq!(host.times_entered(MatchState::GameWon), 1);
    assert_eq!(host.times_entered(MatchState::Concluding), 1);
    assert_eq!(table.rt(0).context().arena.health_of(PlayerSlot::Two), 0);
    assert_eq!(table.rt(0).context().arena.health_of(PlayerSlot::One), 100);
    assert!(!host.roster().contains(&client));

    assert_eq!(table.rt(1).screen(), ScreenKind::SessionLost);
    assert_eq!(table.rt(1).context().notifications.total(), 1);
}

#[test]
fn test_spectator_departure_does_not_end_match() {
    let mut table = Table::new(&["A", "B", "C"], config_with(hundred_health()));
    table.start_duel();
    table.rt_mut(2).join_first_available().unwrap();
    table.run_until(60, |t| t.rt(2).screen() == ScreenKind::Match);

    let spectator = table.gamer(2);
    table.network.disconnect(&spectator);
    table.run_until(900, |t| t.is_finished(0) && t.is_finished(1));

    let host = table.rt(0).match_sync().unwrap();
    // Nobody answers, so the match runs to the last question
    assert_eq!(host.times_entered(MatchState::AnswerNotGiven), 3);
    assert_eq!(host.winner(), None);
    assert!(!host.roster().contains(&spectator));
    assert_eq!(table.rt(2).screen(), ScreenKind::SessionLost);
}
