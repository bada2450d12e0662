//! Wire format for network messages
//!
//! Every message is written as its discriminator string followed by the
//! variant's fixed field sequence. All integers are big-endian. Strings are a
//! `u16` byte length followed by UTF-8; arrays are a `u16` element count
//! followed by the elements. Nested records are written field by field.

use crate::config::Ruleset;
use crate::errors::ProtocolError;
use crate::protocol::message::{
    HighscoreEntry, InputRecord, NetworkMessage, PlayerEntry, Question, WelcomePack,
};
use crate::types::{Gamertag, PlayerSlot};

/// Result type for codec operations
pub type WireResult<T> = core::result::Result<T, ProtocolError>;

/// Wire value of an input record without an answer
const NO_ANSWER: i8 = -1;

// ----------------------------------------------------------------------------
// Packet Writer
// ----------------------------------------------------------------------------

/// Appends primitive fields to a byte buffer
pub struct PacketWriter<'a> {
    buffer: &'a mut Vec<u8>,
}

impl<'a> PacketWriter<'a> {
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self { buffer }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a length or element count
    pub fn write_len(&mut self, field: &'static str, len: usize) -> WireResult<()> {
        let len = u16::try_from(len).map_err(|_| ProtocolError::LengthOverflow { field, len })?;
        self.write_u16(len);
        Ok(())
    }

    pub fn write_str(&mut self, field: &'static str, value: &str) -> WireResult<()> {
        self.write_len(field, value.len())?;
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Write a counted array, each element through `write`
    pub fn write_array<T, F>(&mut self, field: &'static str, items: &[T], mut write: F) -> WireResult<()>
    where
        F: FnMut(&mut Self, &T) -> WireResult<()>,
    {
        self.write_len(field, items.len())?;
        for item in items {
            write(self, item)?;
        }
        Ok(())
    }

    pub fn write_i32_array(&mut self, field: &'static str, items: &[i32]) -> WireResult<()> {
        self.write_array(field, items, |w, value| {
            w.write_i32(*value);
            Ok(())
        })
    }

    pub fn write_gamertags(&mut self, field: &'static str, items: &[Gamertag]) -> WireResult<()> {
        self.write_array(field, items, |w, tag| w.write_str(field, tag.as_str()))
    }
}

// ----------------------------------------------------------------------------
// Packet Reader
// ----------------------------------------------------------------------------

/// Reads primitive fields from a received payload
pub struct PacketReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, needed: usize) -> WireResult<&'a [u8]> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> WireResult<i8> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    pub fn read_bool(&mut self) -> WireResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidValue {
                field: "bool",
                value: i64::from(other),
            }),
        }
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> WireResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> WireResult<String> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn read_array<T, F>(&mut self, mut read: F) -> WireResult<Vec<T>>
    where
        F: FnMut(&mut Self) -> WireResult<T>,
    {
        let count = usize::from(self.read_u16()?);
        // Each element takes at least one byte, so a count beyond the payload
        // is already known to be truncated.
        if count > self.remaining() {
            return Err(ProtocolError::Truncated {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(items)
    }

    pub fn read_i32_array(&mut self) -> WireResult<Vec<i32>> {
        self.read_array(Self::read_i32)
    }

    pub fn read_gamertags(&mut self) -> WireResult<Vec<Gamertag>> {
        self.read_array(|r| r.read_string().map(Gamertag::from))
    }

    /// Fail unless every byte has been consumed
    pub fn finish(self) -> WireResult<()> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(ProtocolError::TrailingData(extra)),
        }
    }
}

// ----------------------------------------------------------------------------
// Record Codecs
// ----------------------------------------------------------------------------

fn write_ruleset(w: &mut PacketWriter<'_>, ruleset: &Ruleset) {
    w.write_i32(ruleset.starting_health);
    w.write_i32(ruleset.damage_per_hit);
    w.write_u32(ruleset.questions_per_match);
    w.write_u32(ruleset.answer_time_frames);
}

fn read_ruleset(r: &mut PacketReader<'_>) -> WireResult<Ruleset> {
    Ok(Ruleset {
        starting_health: r.read_i32()?,
        damage_per_hit: r.read_i32()?,
        questions_per_match: r.read_u32()?,
        answer_time_frames: r.read_u32()?,
    })
}

fn write_player_entry(w: &mut PacketWriter<'_>, entry: &PlayerEntry) -> WireResult<()> {
    w.write_str("gamertag", entry.gamertag.as_str())?;
    w.write_i32(entry.character);
    w.write_bool(entry.locked);
    Ok(())
}

fn read_player_entry(r: &mut PacketReader<'_>) -> WireResult<PlayerEntry> {
    Ok(PlayerEntry {
        gamertag: Gamertag::from(r.read_string()?),
        character: r.read_i32()?,
        locked: r.read_bool()?,
    })
}

fn write_input_record(w: &mut PacketWriter<'_>, record: &InputRecord) -> WireResult<()> {
    // Slot index is 0 or 1 by construction
    w.write_u8(record.slot.index() as u8);
    let answer = match record.answer {
        None => NO_ANSWER,
        Some(answer) => i8::try_from(answer).map_err(|_| ProtocolError::InvalidValue {
            field: "answer",
            value: i64::from(answer),
        })?,
    };
    w.write_i8(answer);
    w.write_u32(record.sequence);
    Ok(())
}

fn read_input_record(r: &mut PacketReader<'_>) -> WireResult<InputRecord> {
    let raw_slot = r.read_u8()?;
    let slot = PlayerSlot::from_index(usize::from(raw_slot)).ok_or(ProtocolError::InvalidValue {
        field: "slot",
        value: i64::from(raw_slot),
    })?;
    let answer = match r.read_i8()? {
        NO_ANSWER => None,
        value if value >= 0 => Some(value as u8),
        value => {
            return Err(ProtocolError::InvalidValue {
                field: "answer",
                value: i64::from(value),
            })
        }
    };
    Ok(InputRecord {
        slot,
        answer,
        sequence: r.read_u32()?,
    })
}

fn write_highscore(w: &mut PacketWriter<'_>, entry: &HighscoreEntry) -> WireResult<()> {
    w.write_str("gamertag", entry.gamertag.as_str())?;
    w.write_u32(entry.wins);
    w.write_i32(entry.best_health);
    Ok(())
}

fn read_highscore(r: &mut PacketReader<'_>) -> WireResult<HighscoreEntry> {
    Ok(HighscoreEntry {
        gamertag: Gamertag::from(r.read_string()?),
        wins: r.read_u32()?,
        best_health: r.read_i32()?,
    })
}

// ----------------------------------------------------------------------------
// Message Codec
// ----------------------------------------------------------------------------

/// Binary encoder/decoder for `NetworkMessage`
pub struct WireFormat;

impl WireFormat {
    /// Encode a message into a fresh buffer
    pub fn encode(message: &NetworkMessage) -> WireResult<Vec<u8>> {
        let mut buffer = Vec::new();
        Self::encode_into(message, &mut buffer)?;
        Ok(buffer)
    }

    /// Encode a message into `buffer`, replacing its contents.
    ///
    /// On error the buffer is left empty.
    pub fn encode_into(message: &NetworkMessage, buffer: &mut Vec<u8>) -> WireResult<()> {
        buffer.clear();
        let result = Self::write_message(message, &mut PacketWriter::new(buffer));
        if result.is_err() {
            buffer.clear();
        }
        result
    }

    fn write_message(message: &NetworkMessage, w: &mut PacketWriter<'_>) -> WireResult<()> {
        if message.is_undefined() {
            return Err(ProtocolError::UnwritableMessage(message.discriminator()));
        }
        w.write_str("discriminator", message.discriminator())?;

        match message {
            NetworkMessage::Undefined => {}
            NetworkMessage::ReadyForNextQuestion { question_index } => {
                w.write_u32(*question_index);
            }
            NetworkMessage::SyncSnapshot {
                question_index,
                health,
            } => {
                w.write_u32(*question_index);
                w.write_i32_array("health", health)?;
            }
            NetworkMessage::QuestionContent {
                question_index,
                question,
            } => {
                w.write_u32(*question_index);
                w.write_str("prompt", &question.prompt)?;
                w.write_array("answers", &question.answers, |w, a| w.write_str("answers", a))?;
                w.write_u8(question.correct_answer);
            }
            NetworkMessage::PlayerInputs {
                question_index,
                window_closed,
                inputs,
            } => {
                w.write_u32(*question_index);
                w.write_bool(*window_closed);
                w.write_array("inputs", inputs, write_input_record)?;
            }
            NetworkMessage::SettingsChanged { ruleset } => write_ruleset(w, ruleset),
            NetworkMessage::PlayerList { players } => {
                w.write_array("players", players, write_player_entry)?;
            }
            NetworkMessage::SelectionMovement {
                gamertag,
                character,
                locked,
            } => {
                w.write_str("gamertag", gamertag.as_str())?;
                w.write_i32(*character);
                w.write_bool(*locked);
            }
            NetworkMessage::GotoVsScreen {
                active_players,
                characters,
            } => {
                w.write_gamertags("active_players", active_players)?;
                w.write_i32_array("characters", characters)?;
            }
            NetworkMessage::GameStateJoined { gamertag } => {
                w.write_str("gamertag", gamertag.as_str())?;
            }
            NetworkMessage::WelcomePack(pack) => {
                w.write_str("welcome_pack", pack.kind())?;
                match pack {
                    WelcomePack::Selection { players, ruleset } => {
                        w.write_array("players", players, write_player_entry)?;
                        write_ruleset(w, ruleset);
                    }
                    WelcomePack::Gameplay {
                        all_players,
                        active_players,
                        characters,
                        health,
                        question_index,
                        ruleset,
                    } => {
                        w.write_gamertags("all_players", all_players)?;
                        w.write_gamertags("active_players", active_players)?;
                        w.write_i32_array("characters", characters)?;
                        w.write_i32_array("health", health)?;
                        w.write_u32(*question_index);
                        write_ruleset(w, ruleset);
                    }
                }
            }
            NetworkMessage::PlayerWins {
                winner,
                final_health,
            } => {
                w.write_bool(winner.is_some());
                if let Some(winner) = winner {
                    w.write_str("winner", winner.as_str())?;
                }
                w.write_i32_array("final_health", final_health)?;
            }
            NetworkMessage::Highscores { entries } => {
                w.write_array("entries", entries, write_highscore)?;
            }
        }
        Ok(())
    }

    /// Decode one complete message; the payload must contain nothing else
    pub fn decode(bytes: &[u8]) -> WireResult<NetworkMessage> {
        let mut r = PacketReader::new(bytes);
        let discriminator = r.read_string()?;

        let message = match discriminator.as_str() {
            "ReadyForNextQuestion" => NetworkMessage::ReadyForNextQuestion {
                question_index: r.read_u32()?,
            },
            "SyncSnapshot" => NetworkMessage::SyncSnapshot {
                question_index: r.read_u32()?,
                health: r.read_i32_array()?,
            },
            "QuestionContent" => NetworkMessage::QuestionContent {
                question_index: r.read_u32()?,
                question: Question {
                    prompt: r.read_string()?,
                    answers: r.read_array(PacketReader::read_string)?,
                    correct_answer: r.read_u8()?,
                },
            },
            "PlayerInputs" => NetworkMessage::PlayerInputs {
                question_index: r.read_u32()?,
                window_closed: r.read_bool()?,
                inputs: r.read_array(read_input_record)?,
            },
            "SettingsChanged" => NetworkMessage::SettingsChanged {
                ruleset: read_ruleset(&mut r)?,
            },
            "PlayerList" => NetworkMessage::PlayerList {
                players: r.read_array(read_player_entry)?,
            },
            "SelectionMovement" => NetworkMessage::SelectionMovement {
                gamertag: Gamertag::from(r.read_string()?),
                character: r.read_i32()?,
                locked: r.read_bool()?,
            },
            "GotoVsScreen" => NetworkMessage::GotoVsScreen {
                active_players: r.read_gamertags()?,
                characters: r.read_i32_array()?,
            },
            "GameStateJoined" => NetworkMessage::GameStateJoined {
                gamertag: Gamertag::from(r.read_string()?),
            },
            "WelcomePack" => {
                let kind = r.read_string()?;
                let pack = match kind.as_str() {
                    "selection" => WelcomePack::Selection {
                        players: r.read_array(read_player_entry)?,
                        ruleset: read_ruleset(&mut r)?,
                    },
                    "gameplay" => WelcomePack::Gameplay {
                        all_players: r.read_gamertags()?,
                        active_players: r.read_gamertags()?,
                        characters: r.read_i32_array()?,
                        health: r.read_i32_array()?,
                        question_index: r.read_u32()?,
                        ruleset: read_ruleset(&mut r)?,
                    },
                    _ => return Err(ProtocolError::UnknownWelcomePack(kind)),
                };
                NetworkMessage::WelcomePack(pack)
            }
            "PlayerWins" => {
                let winner = if r.read_bool()? {
                    Some(Gamertag::from(r.read_string()?))
                } else {
                    None
                };
                NetworkMessage::PlayerWins {
                    winner,
                    final_health: r.read_i32_array()?,
                }
            }
            "Highscores" => NetworkMessage::Highscores {
                entries: r.read_array(read_highscore)?,
            },
            _ => return Err(ProtocolError::UnknownDiscriminator(discriminator)),
        };

        r.finish()?;
        Ok(message)
    }
}
