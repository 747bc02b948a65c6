//! Keeps enough pegs on the board and walks regions round-robin.

use log::{info, warn};
use screw_unlock_core::{Event, Outcome, PegLocation, ProgressMeasure};
use screw_unlock_system_difficulty::DifficultyLevel;

use crate::{layout::ComponentState, GameSession};

const REPLENISH_SAFETY_CAP: u32 = 50;

impl GameSession {
    /// Spawns components until the board holds at least `min_onboard_pegs` pegs or content runs out.
    pub(crate) fn check_and_replenish(&mut self, out_events: &mut Vec<Event>) {
        if !self.is_playing() {
            return;
        }

        // An empty board is always refilled, whatever the configured minimum.
        let minimum = self.config.min_onboard_pegs.max(1);
        let mut iterations = 0;
        while self.on_board_count() < minimum && iterations < REPLENISH_SAFETY_CAP {
            iterations += 1;

            let Some(candidate) = self.next_spawnable(self.active_region) else {
                if let Some(region) = self.regions.get_mut(self.active_region) {
                    region.complete = true;
                }
                if !self.advance_region(out_events) {
                    self.check_victory(out_events);
                    break;
                }
                continue;
            };

            if !self.spawn_component(candidate, out_events) {
                let component = &mut self.components[candidate];
                component.state = ComponentState::Skipped;
                warn!(
                    "no room for component {}, skipping it",
                    component.id.get()
                );
                out_events.push(Event::ComponentSkipped {
                    component: component.id,
                });
                break;
            }
        }
    }

    fn next_spawnable(&self, region: usize) -> Option<usize> {
        self.regions.get(region)?.components.iter().copied().find(|index| {
            self.components
                .get(*index)
                .map_or(false, |component| component.state == ComponentState::Unspawned)
        })
    }

    fn advance_region(&mut self, out_events: &mut Vec<Event>) -> bool {
        let count = self.regions.len();
        for _ in 0..count {
            self.active_region = (self.active_region + 1) % count;
            let region = &self.regions[self.active_region];
            if !region.complete {
                info!("region {} activated", region.id.get());
                out_events.push(Event::RegionActivated { region: region.id });
                return true;
            }
        }
        false
    }

    /// Declares a win once every peg was eliminated and nothing is left in play.
    pub(crate) fn check_victory(&mut self, out_events: &mut Vec<Event>) {
        if !self.is_playing() || self.eliminated < self.config.total_pegs {
            return;
        }
        let leftovers = self
            .pegs
            .iter()
            .any(|peg| peg.location != PegLocation::Eliminated);
        if leftovers || !self.eliminations.is_empty() {
            return;
        }
        self.declare_outcome(Outcome::Win, out_events);
    }

    /// Finishes a command: colors waiting boxes, resolves due eliminations, and
    /// ends the level on a win or on a stalemate.
    pub(crate) fn settle(&mut self, out_events: &mut Vec<Event>) {
        if !self.is_playing() {
            return;
        }
        // A skipped component stops replenishment; an empty board retries the next one.
        for _ in 0..self.components.len() {
            if self.on_board_count() > 0 || !self.has_unspawned_components() {
                break;
            }
            self.check_and_replenish(out_events);
        }

        self.color_waiting_boxes(out_events);
        if self.config.elimination_delay_ms == 0 {
            let _ = self.flush_eliminations(out_events);
        }
        self.check_victory(out_events);
        self.check_stalemate(out_events);
    }

    /// Declares a loss once the level can neither progress nor be won.
    ///
    /// That is the case when no on-board peg is selectable, no component is
    /// left to reveal, and no elimination is pending.
    fn check_stalemate(&mut self, out_events: &mut Vec<Event>) {
        if !self.is_playing() || !self.eliminations.is_empty() {
            return;
        }
        let selectable = self.pegs.iter().any(|peg| {
            matches!(peg.location, PegLocation::Board(_)) && !self.locks.is_locked(peg.id)
        });
        if selectable || self.has_unspawned_components() {
            return;
        }
        warn!(
            "no move left with {} of {} pegs eliminated",
            self.eliminated, self.config.total_pegs
        );
        self.declare_outcome(Outcome::Lose, out_events);
    }

    fn has_unspawned_components(&self) -> bool {
        self.components
            .iter()
            .any(|component| component.state == ComponentState::Unspawned)
    }

    pub(crate) fn declare_outcome(&mut self, outcome: Outcome, out_events: &mut Vec<Event>) {
        if self.outcome.is_some() {
            return;
        }
        info!("level finished: {outcome:?}");
        self.outcome = Some(outcome);
        out_events.push(Event::GameOver { outcome });
    }

    /// Difficulty knobs for the current level progress.
    pub(crate) fn difficulty(&self) -> DifficultyLevel {
        let Some(curve) = &self.curve else {
            return DifficultyLevel::from_k(0.0);
        };
        let done = match self.config.progress_measure {
            ProgressMeasure::Eliminated => self.eliminated,
            ProgressMeasure::Spawned => self.revealed,
        };
        curve.sample(done as f32 / self.config.total_pegs.max(1) as f32)
    }
}
