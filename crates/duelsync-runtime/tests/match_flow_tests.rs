//! End-to-end matches between runtimes on the loopback network
//!
//! Host at table index 0 plays slot one, the first client plays slot two.


use duelsync_core::{
    DuelConfig, DuelError, Gamertag, NetworkMessage, PlayerSlot, Question, Ruleset, SessionConfig,
    TaskScheduler,
};
use duelsync_runtime::{
    GameContext, JoiningState, LoopbackNetwork, MatchSetup, MatchState, MatchSync, Reply, Role,
    ScreenKind, ScriptedInput, SessionManager, GAMEPLAY_LIST,
};
use test_utils::{config_with, hundred_health, Table};

#[test]
fn test_lobby_leads_both_sides_into_the_match() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.start_duel();

    let host = table.rt(0).match_sync().unwrap();
    let client = table.rt(1).match_sync().unwrap();
    assert!(host.role().is_host());
    assert!(!client.role().is_host());
    assert_eq!(host.local_slot(), Some(PlayerSlot::One));
    assert_eq!(client.local_slot(), Some(PlayerSlot::Two));
    assert_eq!(client.roster().characters(), &[3, 5]);
    assert!(table.rt(0).context().session.is_game_in_progress());
}

#[test]
fn test_host_and_client_converge_on_health_and_winner() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.set_input(
        0,
        ScriptedInput::always(Reply::Correct, 1).on_question(1, Reply::Wrong, 1),
    );
    let host_scores = table.track_scores(0);
    let client_scores = table.track_scores(1);

    table.start_duel();
    table.run_until(600, |t| t.is_finished(0) && t.is_finished(1));

    assert_eq!(table.health(0), [80, 60]);
    assert_eq!(table.health(1), [80, 60]);
    for index in 0..2 {
        let sync = table.rt(index).match_sync().unwrap();
        assert_eq!(sync.winner(), Some(PlayerSlot::One));
        assert_eq!(sync.question_index(), 3);
        assert_eq!(sync.times_entered(MatchState::GameWon), 1);
        assert_eq!(sync.times_entered(MatchState::GameLost), 0);
    }

    let host_records = host_scores.records();
    assert_eq!(host_records.len(), 1);
    assert!(host_records[0].won);
    assert_eq!(host_records[0].final_health, vec![80, 60]);
    assert_eq!(host_scores.saves(), 1);

    let client_records = client_scores.records();
    assert_eq!(client_records.len(), 1);
    assert!(!client_records[0].won);
    assert_eq!(client_records[0].winner, Some(table.gamer(0)));
}

#[test]
fn test_client_answers_are_confirmed_by_host() {
    let ruleset = Ruleset {
        questions_per_match: 5,
        ..Ruleset::quick()
    };
    let mut table = Table::new(&["A", "B"], config_with(ruleset));
    table.set_input(1, ScriptedInput::always(Reply::Correct, 1));

    table.start_duel();
    table.run_until(600, |t| t.is_finished(0) && t.is_finished(1));

    // Two hits of 20 knock out a 40 health fighter before the last question
    assert_eq!(table.health(0), [0, 40]);
    assert_eq!(table.health(1), [0, 40]);
    for index in 0..2 {
        let sync = table.rt(index).match_sync().unwrap();
        assert_eq!(sync.winner(), Some(PlayerSlot::Two));
        assert_eq!(sync.question_index(), 2);
        assert_eq!(sync.times_entered(MatchState::AnswerCorrect), 2);
    }
}

#[test]
fn test_unanswered_questions_end_without_a_winner() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));

    table.start_duel();
    table.run_until(900, |t| t.is_finished(0) && t.is_finished(1));

    for index in 0..2 {
        let sync = table.rt(index).match_sync().unwrap();
        assert_eq!(sync.winner(), None);
        assert_eq!(sync.times_entered(MatchState::AnswerNotGiven), 3);
        assert_eq!(sync.times_entered(MatchState::GameLost), 1);
        assert_eq!(table.health(index), [100, 100]);
    }
}

#[test]
fn test_client_acknowledges_every_question_once() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.set_input(0, ScriptedInput::always(Reply::Correct, 1));

    table.start_duel();
    table.run_until(600, |t| t.is_finished(0) && t.is_finished(1));

    let host = table.rt(0).match_sync().unwrap();
    let client = table.rt(1).match_sync().unwrap();
    assert_eq!(host.ready_sent(), 0);
    // One per question, plus the one sent before the host's verdict arrived
    assert!(client.ready_sent() >= 3);
    assert!(client.ready_sent() <= 4);
    assert_eq!(
        host.times_entered(MatchState::QuestionIntro),
        client.times_entered(MatchState::QuestionIntro)
    );
}

#[test]
fn test_spectator_joining_mid_match_converges() {
    let mut table = Table::new(&["A", "B", "C"], config_with(hundred_health()));
    table.set_input(0, ScriptedInput::always(Reply::Correct, 1));

    table.start_duel();
    table.rt_mut(2).join_first_available().unwrap();
    table.run_until(60, |t| t.rt(2).screen() == ScreenKind::Match);

    let spectator = table.rt(2).match_sync().unwrap();
    assert_eq!(spectator.local_slot(), None);
    assert!(!spectator.role().is_host());

    table.run_until(900, |t| (0..3).all(|i| t.is_finished(i)));

    let spectator = table.rt(2).match_sync().unwrap();
    assert_eq!(spectator.joining_state(), JoiningState::Joined);
    assert_eq!(spectator.winner(), Some(PlayerSlot::One));
    assert_eq!(table.health(2), table.health(0));
    assert_eq!(table.health(1), table.health(0));
}

#[test]
fn test_undecodable_packet_keeps_the_match_running() {
    let mut table = Table::new(&["A", "B"], config_with(hundred_health()));
    table.set_input(0, ScriptedInput::always(Reply::Correct, 1));
    table.start_duel();

    let host = table.gamer(0);
    table.network.truncate_next_packet(&host);
    let mut failure = None;
    for _ in 0..20 {
        table.rt_mut(0).update().unwrap();
        if let Err(error) = table.rt_mut(1).update() {
            failure = Some(error);
            break;
        }
    }

    assert!(matches!(failure, Some(DuelError::Protocol(_))));
    assert_eq!(table.rt(1).screen(), ScreenKind::Match);
    assert!(table.rt(1).match_sync().is_some());

    table.run_until(900, |t| t.is_finished(0) && t.is_finished(1));
    assert_eq!(table.rt(1).match_sync().unwrap().winner(), Some(PlayerSlot::One));
    assert_eq!(table.health(1), table.health(0));
}

fn manager(network: &LoopbackNetwork, gamer: &Gamertag) -> SessionManager {
    SessionManager::new(
        SessionConfig::default(),
        gamer.clone(),
        Box::new(network.platform()),
        Box::new(network.discovery(gamer.clone())),
    )
}

#[test]
fn test_client_adopts_scripted_snapshot_then_question() {
    let network = LoopbackNetwork::new();
    let (a, b) = (Gamertag::new("A"), Gamertag::new("B"));
    let mut host = manager(&network, &a);
    host.install_session(network.create_now(&a, 8).unwrap());
    let id = network.sessions()[0].id;
    let mut client = manager(&network, &b);
    client.install_session(network.join_now(&b, id).unwrap());

    let mut scheduler = TaskScheduler::new();
    scheduler.new_task_list(GAMEPLAY_LIST).unwrap();
    let mut ctx = GameContext::new(DuelConfig::testing(), client);
    let setup = MatchSetup {
        role: Role::Client,
        local: b.clone(),
        host: a.clone(),
        all_players: vec![a.clone(), b.clone()],
        active_players: vec![a.clone(), b.clone()],
        characters: vec![3, 5],
        ruleset: hundred_health(),
    };
    let mut sync = MatchSync::start(setup, &mut scheduler, &mut ctx).unwrap();
    assert_eq!(ctx.arena.health(), [100, 100]);

    let question = Question {
        prompt: "6 x 7".to_string(),
        answers: vec!["40".into(), "42".into(), "44".into(), "48".into()],
        correct_answer: 1,
    };
    host.send_to_all(&NetworkMessage::SyncSnapshot {
        question_index: 1,
        health: vec![80, 60],
    })
    .unwrap();
    host.send_to_all(&NetworkMessage::QuestionContent {
        question_index: 1,
        question: question.clone(),
    })
    .unwrap();

    // Both arrive during the intro and wait until the client asks for them
    for _ in 0..10 {
        ctx.session.pump();
        sync.update(&mut scheduler, &mut ctx).unwrap();
        if sync.state() == MatchState::QuestionIntro {
            break;
        }
    }

    // Same state the host enters when it publishes the question
    assert_eq!(sync.state(), MatchState::QuestionIntro);
    assert_eq!(ctx.arena.health(), [80, 60]);
    assert_eq!(sync.question_index(), 1);
    assert_eq!(sync.question(), Some(&question));
    assert_eq!(sync.ready_sent(), 1);
}
