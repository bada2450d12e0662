//! Property-based tests for the message wire format
//!
//! Every message variant must decode to exactly what was encoded, and no
//! prefix of a valid payload may decode successfully.

use duelsync_core::{
    Gamertag, HighscoreEntry, InputRecord, NetworkMessage, PlayerEntry, PlayerSlot, Question,
    Ruleset, WelcomePack, WireFormat,
};
use proptest::prelude::*;

/// Generate arbitrary gamertags, the empty one included
fn arb_gamertag() -> impl Strategy<Value = Gamertag> {
    prop::string::string_regex(r"[A-Za-z0-9 _]{0,16}")
        .unwrap()
        .prop_map(Gamertag::new)
}

/// Generate arbitrary text, including multi-byte characters
fn arb_text() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9 +×÷=?é]{0,40}").unwrap()
}

fn arb_ruleset() -> impl Strategy<Value = Ruleset> {
    (any::<i32>(), any::<i32>(), any::<u32>(), any::<u32>()).prop_map(
        |(starting_health, damage_per_hit, questions_per_match, answer_time_frames)| Ruleset {
            starting_health,
            damage_per_hit,
            questions_per_match,
            answer_time_frames,
        },
    )
}

fn arb_player_entry() -> impl Strategy<Value = PlayerEntry> {
    (arb_gamertag(), any::<i32>(), any::<bool>()).prop_map(|(gamertag, character, locked)| {
        PlayerEntry {
            gamertag,
            character,
            locked,
        }
    })
}

fn arb_input_record() -> impl Strategy<Value = InputRecord> {
    (
        prop_oneof![Just(PlayerSlot::One), Just(PlayerSlot::Two)],
        prop::option::of(0u8..=127),
        any::<u32>(),
    )
        .prop_map(|(slot, answer, sequence)| InputRecord {
            slot,
            answer,
            sequence,
        })
}

fn arb_highscore() -> impl Strategy<Value = HighscoreEntry> {
    (arb_gamertag(), any::<u32>(), any::<i32>()).prop_map(|(gamertag, wins, best_health)| {
        HighscoreEntry {
            gamertag,
            wins,
            best_health,
        }
    })
}

fn arb_health() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(any::<i32>(), 0..4)
}

fn arb_welcome_pack() -> impl Strategy<Value = WelcomePack> {
    prop_oneof![
        (prop::collection::vec(arb_player_entry(), 0..6), arb_ruleset())
            .prop_map(|(players, ruleset)| WelcomePack::Selection { players, ruleset }),
        (
            prop::collection::vec(arb_gamertag(), 0..6),
            prop::collection::vec(arb_gamertag(), 0..3),
            prop::collection::vec(any::<i32>(), 0..3),
            arb_health(),
            any::<u32>(),
            arb_ruleset(),
        )
            .prop_map(
                |(all_players, active_players, characters, health, question_index, ruleset)| {
                    WelcomePack::Gameplay {
                        all_players,
                        active_players,
                        characters,
                        health,
                        question_index,
                        ruleset,
                    }
                }
            ),
    ]
}

/// Generate any writable message
fn arb_message() -> impl Strategy<Value = NetworkMessage> {
    prop_oneof![
        any::<u32>().prop_map(|question_index| NetworkMessage::ReadyForNextQuestion { question_index }),
        (any::<u32>(), arb_health()).prop_map(|(question_index, health)| {
            NetworkMessage::SyncSnapshot {
                question_index,
                health,
            }
        }),
        (any::<u32>(), arb_text(), prop::collection::vec(arb_text(), 0..5), any::<u8>()).prop_map(
            |(question_index, prompt, answers, correct_answer)| NetworkMessage::QuestionContent {
                question_index,
                question: Question {
                    prompt,
                    answers,
                    correct_answer,
                },
            }
        ),
        (any::<u32>(), any::<bool>(), prop::collection::vec(arb_input_record(), 0..3)).prop_map(
            |(question_index, window_closed, inputs)| NetworkMessage::PlayerInputs {
                question_index,
                window_closed,
                inputs,
            }
        ),
        arb_ruleset().prop_map(|ruleset| NetworkMessage::SettingsChanged { ruleset }),
        prop::collection::vec(arb_player_entry(), 0..6)
            .prop_map(|players| NetworkMessage::PlayerList { players }),
        (arb_gamertag(), any::<i32>(), any::<bool>()).prop_map(|(gamertag, character, locked)| {
            NetworkMessage::SelectionMovement {
                gamertag,
                character,
                locked,
            }
        }),
        (
            prop::collection::vec(arb_gamertag(), 0..3),
            prop::collection::vec(any::<i32>(), 0..3)
        )
            .prop_map(|(active_players, characters)| NetworkMessage::GotoVsScreen {
                active_players,
                characters,
            }),
        arb_gamertag().prop_map(|gamertag| NetworkMessage::GameStateJoined { gamertag }),
        arb_welcome_pack().prop_map(NetworkMessage::WelcomePack),
        (prop::option::of(arb_gamertag()), arb_health()).prop_map(|(winner, final_health)| {
            NetworkMessage::PlayerWins {
                winner,
                final_health,
            }
        }),
        prop::collection::vec(arb_highscore(), 0..5)
            .prop_map(|entries| NetworkMessage::Highscores { entries }),
    ]
}

proptest! {
    /// Property: decoding an encoded message reproduces every field
    #[test]
    fn encode_decode_reproduces_message(message in arb_message()) {
        let bytes = WireFormat::encode(&message).expect("writable message encodes");
        let decoded = WireFormat::decode(&bytes).expect("own encoding decodes");
        prop_assert_eq!(decoded, message);
    }

    /// Property: a strict prefix of a payload never decodes
    #[test]
    fn truncated_payload_never_decodes(message in arb_message(), cut in any::<prop::sample::Index>()) {
        let bytes = WireFormat::encode(&message).expect("writable message encodes");
        let len = cut.index(bytes.len());
        prop_assert!(WireFormat::decode(&bytes[..len]).is_err());
    }

    /// Property: the shared buffer holds only the latest encoding
    #[test]
    fn encode_into_replaces_previous_contents(first in arb_message(), second in arb_message()) {
        let mut buffer = Vec::new();
        WireFormat::encode_into(&first, &mut buffer).expect("encodes");
        WireFormat::encode_into(&second, &mut buffer).expect("encodes");
        prop_assert_eq!(buffer, WireFormat::encode(&second).expect("encodes"));
    }
}
