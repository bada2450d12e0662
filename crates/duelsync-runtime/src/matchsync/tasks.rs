//! Scripted gameplay sequences
//!
//! Multi-frame effects of the match run as tasks on the gameplay list. The
//! state machine starts them and polls whether they are still alive.

use duelsync_core::{PlayerSlot, Task, TaskCommands, TaskStep};
use tracing::debug;

use crate::context::GameContext;
use crate::presentation::Animation;

// ----------------------------------------------------------------------------
// Attack
// ----------------------------------------------------------------------------

enum AttackPhase {
    Strike,
    Swing,
    Impact,
}

/// One fighter attacks the other.
///
/// Damage lands on the first step, so when the task is started immediately
/// the new health is visible before anything else runs in the frame.
pub struct AttackTask {
    attacker: PlayerSlot,
    damage: i32,
    phase: AttackPhase,
}

impl AttackTask {
    pub fn new(attacker: PlayerSlot, damage: i32) -> Self {
        Self {
            attacker,
            damage,
            phase: AttackPhase::Strike,
        }
    }

    fn target(&self) -> PlayerSlot {
        self.attacker.opponent()
    }
}

impl Task<GameContext> for AttackTask {
    fn step(&mut self, ctx: &mut GameContext, _commands: &mut TaskCommands<'_, GameContext>) -> TaskStep {
        match self.phase {
            AttackPhase::Strike => {
                let health = ctx.arena.apply_damage(self.target(), self.damage);
                debug!(attacker = %self.attacker, target = %self.target(), health, "attack landed");
                ctx.animations.play(self.attacker, Animation::Attack);
                self.phase = AttackPhase::Swing;
                TaskStep::Yield
            }
            AttackPhase::Swing => {
                if ctx.animations.is_playing(self.attacker) {
                    return TaskStep::Yield;
                }
                let reaction = if ctx.arena.is_knocked_out(self.target()) {
                    Animation::KnockOut
                } else {
                    Animation::Hit
                };
                ctx.animations.play(self.target(), reaction);
                self.phase = AttackPhase::Impact;
                TaskStep::Yield
            }
            AttackPhase::Impact => {
                if ctx.animations.is_playing(self.target()) {
                    TaskStep::Yield
                } else {
                    TaskStep::Complete
                }
            }
        }
    }

    fn name(&self) -> &str {
        "attack"
    }
}

// ----------------------------------------------------------------------------
// Conclusion
// ----------------------------------------------------------------------------

enum ConcludePhase {
    Start,
    KnockOut(PlayerSlot),
    Celebrate,
    Finish,
}

/// Closing beats of a match: the forfeiting fighter is knocked out, if any,
/// then the winner celebrates.
pub struct ConcludeTask {
    winner: Option<PlayerSlot>,
    forfeited: Option<PlayerSlot>,
    phase: ConcludePhase,
}

impl ConcludeTask {
    pub fn new(winner: Option<PlayerSlot>) -> Self {
        Self {
            winner,
            forfeited: None,
            phase: ConcludePhase::Start,
        }
    }

    /// `departed` left the match. Their health is forced to zero on the
    /// first step and the other fighter wins.
    pub fn forfeit(departed: PlayerSlot) -> Self {
        Self {
            winner: Some(departed.opponent()),
            forfeited: Some(departed),
            phase: ConcludePhase::Start,
        }
    }
}

impl Task<GameContext> for ConcludeTask {
    fn step(&mut self, ctx: &mut GameContext, _commands: &mut TaskCommands<'_, GameContext>) -> TaskStep {
        loop {
            match self.phase {
                ConcludePhase::Start => match self.forfeited {
                    Some(departed) => {
                        ctx.arena.set_health(departed, 0);
                        ctx.animations.play(departed, Animation::KnockOut);
                        self.phase = ConcludePhase::KnockOut(departed);
                        return TaskStep::Yield;
                    }
                    None => self.phase = ConcludePhase::Celebrate,
                },
                ConcludePhase::KnockOut(departed) => {
                    if ctx.animations.is_playing(departed) {
                        return TaskStep::Yield;
                    }
                    self.phase = ConcludePhase::Celebrate;
                }
                ConcludePhase::Celebrate => {
                    if let Some(winner) = self.winner {
                        ctx.animations.play(winner, Animation::Victory);
                    }
                    self.phase = ConcludePhase::Finish;
                    return TaskStep::Yield;
                }
                ConcludePhase::Finish => {
                    let playing = self
                        .winner
                        .map(|winner| ctx.animations.is_playing(winner))
                        .unwrap_or(false);
                    return if playing {
                        TaskStep::Yield
                    } else {
                        TaskStep::Complete
                    };
                }
            }
        }
    }

    fn name(&self) -> &str {
        "conclude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GAMEPLAY_LIST;
    use crate::session::LoopbackNetwork;
    use crate::session::SessionManager;
    use duelsync_core::{DuelConfig, Gamertag, TaskScheduler};

    fn context() -> GameContext {
        let network = LoopbackNetwork::new();
        let session = SessionManager::new(
            Default::default(),
            Gamertag::new("A"),
            Box::new(network.platform()),
            Box::new(network.discovery("A")),
        );
        GameContext::new(DuelConfig::testing(), session)
    }

    fn run_to_completion(scheduler: &mut TaskScheduler<GameContext>, ctx: &mut GameContext) {
        for _ in 0..20 {
            if scheduler.live_count(GAMEPLAY_LIST) == 0 {
                return;
            }
            scheduler.tick(GAMEPLAY_LIST, ctx).unwrap();
            ctx.animations.advance();
        }
        panic!("task did not finish");
    }

    #[test]
    fn test_attack_damages_before_add_returns() {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list(GAMEPLAY_LIST).unwrap();
        let mut ctx = context();

        scheduler
            .add_task(GAMEPLAY_LIST, AttackTask::new(PlayerSlot::One, 20), true, &mut ctx)
            .unwrap();
        assert_eq!(ctx.arena.health(), [40, 20]);

        run_to_completion(&mut scheduler, &mut ctx);
        assert_eq!(ctx.arena.health(), [40, 20]);
    }

    #[test]
    fn test_forfeit_forces_zero_health() {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list(GAMEPLAY_LIST).unwrap();
        let mut ctx = context();

        scheduler
            .add_task(GAMEPLAY_LIST, ConcludeTask::forfeit(PlayerSlot::Two), true, &mut ctx)
            .unwrap();
        assert_eq!(ctx.arena.health(), [40, 0]);
        run_to_completion(&mut scheduler, &mut ctx);
    }
}
