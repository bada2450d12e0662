//! Presentation and persistence collaborators
//!
//! The engine only needs narrow contracts from the outside world: play an
//! animation and report whether it is still playing, sample the local
//! controller, show a notification the user must acknowledge, and record
//! scores at the end of a match. Frame-counting and in-memory
//! implementations are provided for simulations and tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use duelsync_core::{Gamertag, HighscoreEntry, PlayerSlot, Question};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Animation
// ----------------------------------------------------------------------------

/// Fighter animations the match logic asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Animation {
    Idle,
    Attack,
    Hit,
    KnockOut,
    Victory,
}

/// Plays fighter animations; polled until they finish
pub trait AnimationPlayer {
    fn play(&mut self, slot: PlayerSlot, animation: Animation);

    fn is_playing(&self, slot: PlayerSlot) -> bool;

    /// Advance every running animation by one frame
    fn advance(&mut self);
}

/// Animation player where every non-idle animation lasts a fixed number of frames
#[derive(Debug, Clone)]
pub struct FrameAnimator {
    frames_per_animation: u32,
    remaining: [u32; 2],
    current: [Animation; 2],
    history: Vec<(PlayerSlot, Animation)>,
}

impl FrameAnimator {
    pub fn new(frames_per_animation: u32) -> Self {
        Self {
            frames_per_animation,
            remaining: [0; 2],
            current: [Animation::Idle; 2],
            history: Vec::new(),
        }
    }

    pub fn current(&self, slot: PlayerSlot) -> Animation {
        self.current[slot.index()]
    }

    /// Every animation started so far, oldest first
    pub fn history(&self) -> &[(PlayerSlot, Animation)] {
        &self.history
    }
}

impl AnimationPlayer for FrameAnimator {
    fn play(&mut self, slot: PlayerSlot, animation: Animation) {
        debug!(%slot, ?animation, "animation started");
        self.current[slot.index()] = animation;
        self.remaining[slot.index()] = match animation {
            Animation::Idle => 0,
            _ => self.frames_per_animation,
        };
        self.history.push((slot, animation));
    }

    fn is_playing(&self, slot: PlayerSlot) -> bool {
        self.remaining[slot.index()] > 0
    }

    fn advance(&mut self) {
        for remaining in &mut self.remaining {
            *remaining = remaining.saturating_sub(1);
        }
    }
}

// ----------------------------------------------------------------------------
// Input
// ----------------------------------------------------------------------------

/// The local controller. Only the local side's own slot is ever sampled.
pub trait InputSource {
    /// Answer chosen for `question`, if any, after the window has been open
    /// for `frames_open` frames
    fn sample(
        &mut self,
        slot: PlayerSlot,
        question_index: u32,
        question: &Question,
        frames_open: u32,
    ) -> Option<u8>;
}

/// How a scripted player responds to a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Correct,
    Wrong,
    Choice(u8),
    Silent,
}

/// Input source that answers from a script
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    default: (Reply, u32),
    per_question: HashMap<u32, (Reply, u32)>,
}

impl ScriptedInput {
    /// Never answers
    pub fn silent() -> Self {
        Self::always(Reply::Silent, 0)
    }

    /// Gives `reply` to every question once `delay_frames` have passed
    pub fn always(reply: Reply, delay_frames: u32) -> Self {
        Self {
            default: (reply, delay_frames),
            per_question: HashMap::new(),
        }
    }

    /// Override the reply for one question
    pub fn on_question(mut self, question_index: u32, reply: Reply, delay_frames: u32) -> Self {
        self.per_question.insert(question_index, (reply, delay_frames));
        self
    }
}

impl InputSource for ScriptedInput {
    fn sample(
        &mut self,
        _slot: PlayerSlot,
        question_index: u32,
        question: &Question,
        frames_open: u32,
    ) -> Option<u8> {
        let (reply, delay) = self
            .per_question
            .get(&question_index)
            .copied()
            .unwrap_or(self.default);
        if frames_open < delay {
            return None;
        }
        match reply {
            Reply::Correct => Some(question.correct_answer),
            Reply::Wrong => {
                let count = question.answers.len().max(2) as u8;
                Some((question.correct_answer + 1) % count)
            }
            Reply::Choice(answer) => Some(answer),
            Reply::Silent => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// A message the user has to acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new<T: Into<String>, M: Into<String>>(title: T, message: M) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Notifications waiting for acknowledgement, oldest first
#[derive(Debug, Default)]
pub struct Notifications {
    pending: VecDeque<Notification>,
    total: usize,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        info!(title = %notification.title, message = %notification.message, "notification");
        self.pending.push_back(notification);
        self.total += 1;
    }

    /// The notification currently shown
    pub fn current(&self) -> Option<&Notification> {
        self.pending.front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Notifications ever raised, acknowledged or not
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn acknowledge(&mut self) -> Option<Notification> {
        self.pending.pop_front()
    }
}

// ----------------------------------------------------------------------------
// Scores
// ----------------------------------------------------------------------------

/// Result of one finished match as seen by the local gamer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub match_id: Uuid,
    pub local: Gamertag,
    /// `None` on a draw
    pub winner: Option<Gamertag>,
    pub final_health: Vec<i32>,
    pub questions_played: u32,
    pub won: bool,
}

/// Score persistence, invoked at match-end boundaries only
pub trait ScoreStore {
    fn store_score_data(&mut self, record: &ScoreRecord);

    fn save(&mut self);

    /// Current highscore table, best first
    fn highscores(&self) -> Vec<HighscoreEntry>;

    /// Replace the table with one published by the host
    fn adopt_highscores(&mut self, entries: &[HighscoreEntry]);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBook {
    pub records: Vec<ScoreRecord>,
    pub table: Vec<HighscoreEntry>,
    #[serde(skip)]
    pub saves: u32,
}

impl ScoreBook {
    fn record(&mut self, record: &ScoreRecord) {
        self.records.push(record.clone());
        let Some(winner) = &record.winner else {
            return;
        };
        let health = record.final_health.iter().copied().max().unwrap_or(0);
        match self.table.iter_mut().find(|e| e.gamertag == *winner) {
            Some(entry) => {
                entry.wins += 1;
                entry.best_health = entry.best_health.max(health);
            }
            None => self.table.push(HighscoreEntry {
                gamertag: winner.clone(),
                wins: 1,
                best_health: health,
            }),
        }
        self.table
            .sort_by(|a, b| b.wins.cmp(&a.wins).then(b.best_health.cmp(&a.best_health)));
    }
}

/// In-memory score store. Clones share the same book, so a caller can keep a
/// handle for inspection after giving one to the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreStore {
    book: Rc<RefCell<ScoreBook>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ScoreRecord> {
        self.book.borrow().records.clone()
    }

    pub fn saves(&self) -> u32 {
        self.book.borrow().saves
    }
}

impl ScoreStore for MemoryScoreStore {
    fn store_score_data(&mut self, record: &ScoreRecord) {
        self.book.borrow_mut().record(record);
    }

    fn save(&mut self) {
        self.book.borrow_mut().saves += 1;
    }

    fn highscores(&self) -> Vec<HighscoreEntry> {
        self.book.borrow().table.clone()
    }

    fn adopt_highscores(&mut self, entries: &[HighscoreEntry]) {
        self.book.borrow_mut().table = entries.to_vec();
    }
}

/// Score store persisted as a JSON document
#[derive(Debug)]
pub struct JsonScoreStore {
    path: PathBuf,
    book: ScoreBook,
}

impl JsonScoreStore {
    /// Load the book at `path`; a missing or unreadable file starts empty
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let book = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed score file");
                ScoreBook::default()
            }),
            Err(_) => ScoreBook::default(),
        };
        Self { path, book }
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.book.records
    }
}

impl ScoreStore for JsonScoreStore {
    fn store_score_data(&mut self, record: &ScoreRecord) {
        self.book.record(record);
    }

    fn save(&mut self) {
        let result = serde_json::to_string_pretty(&self.book)
            .map_err(|e| e.to_string())
            .and_then(|text| fs::write(&self.path, text).map_err(|e| e.to_string()));
        match result {
            Ok(()) => debug!(path = %self.path.display(), "scores saved"),
            Err(error) => warn!(path = %self.path.display(), %error, "failed to save scores"),
        }
    }

    fn highscores(&self) -> Vec<HighscoreEntry> {
        self.book.table.clone()
    }

    fn adopt_highscores(&mut self, entries: &[HighscoreEntry]) {
        self.book.table = entries.to_vec();
    }
}
