#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Greedy auto-play client that turns session snapshots into peg selections.
//!
//! The client never touches the session directly. Callers feed it elapsed
//! time and a fresh [`SessionSnapshot`]; it answers with at most one
//! [`Command::SelectPeg`] per elapsed interval.

use std::{collections::BTreeMap, time::Duration};

use log::debug;
use screw_unlock_core::{Command, ComponentId, PegId, PegSnapshot, SessionSnapshot};

/// Configuration parameters required to construct the auto-play client.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    step_interval: Duration,
}

impl Config {
    /// Creates a configuration that plays one move per `step_interval`.
    #[must_use]
    pub const fn new(step_interval: Duration) -> Self {
        Self { step_interval }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_millis(150))
    }
}

/// Why the client picked a peg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveReason {
    /// The peg matches an active box with room.
    MatchesBox,
    /// The peg heads the controller chain of a locked peg matching an active box.
    UnlocksMatch,
    /// The peg belongs to the smallest plate that fits into the free temporary slots.
    ClearsPlate,
    /// Nothing better was available.
    Forced,
}

/// Interval-driven stepper around [`choose_move`].
#[derive(Debug)]
pub struct AutoPlay {
    step_interval: Duration,
    accumulator: Duration,
    running: bool,
}

impl AutoPlay {
    /// Creates a stopped client using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            step_interval: config.step_interval,
            accumulator: Duration::ZERO,
            running: false,
        }
    }

    /// Starts stepping on the next elapsed interval.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops stepping and discards any partially elapsed interval.
    pub fn stop(&mut self) {
        self.running = false;
        self.accumulator = Duration::ZERO;
    }

    /// Reports whether the client is stepping.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances the stepper and emits a selection once an interval elapsed.
    ///
    /// The client stops itself once the level reached an outcome.
    pub fn handle(&mut self, dt: Duration, snapshot: &SessionSnapshot, out: &mut Vec<Command>) {
        if !self.running {
            return;
        }
        if snapshot.progress.outcome.is_some() {
            self.stop();
            return;
        }

        self.accumulator = self.accumulator.saturating_add(dt);
        if self.accumulator < self.step_interval {
            return;
        }
        // One move per call: later moves need a snapshot that reflects this one.
        self.accumulator = if self.step_interval.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_nanos(
                (self.accumulator.as_nanos() % self.step_interval.as_nanos()) as u64,
            )
        };

        match choose_move(snapshot) {
            Some((peg, reason)) => {
                debug!("auto-play selects peg {} ({reason:?})", peg.get());
                out.push(Command::SelectPeg { peg });
            }
            None => debug!("auto-play found no selectable peg"),
        }
    }
}

impl Default for AutoPlay {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Picks the next peg to select.
///
/// Pegs matching an active box with room win. A locked matching peg comes
/// next, by selecting the root of its controller chain, provided the whole
/// chain fits into the free temporary slots. Otherwise the client works on
/// the smallest on-board plate that still fits into the free temporary
/// slots, as long as at least two slots are free. As a last resort any
/// selectable peg is taken.
#[must_use]
pub fn choose_move(snapshot: &SessionSnapshot) -> Option<(PegId, MoveReason)> {
    let wanted: Vec<_> = snapshot
        .boxes
        .iter()
        .filter_map(|color_box| color_box.color().filter(|color| color_box.accepts(*color)))
        .collect();
    let free_slots = snapshot.free_temp_slots();

    for color in &wanted {
        let matching = snapshot
            .pegs_on_board()
            .find(|peg| peg.is_selectable() && peg.color == Some(*color));
        if let Some(peg) = matching {
            return Some((peg.id, MoveReason::MatchesBox));
        }
    }

    for color in &wanted {
        let unlock = snapshot
            .pegs_on_board()
            .filter(|peg| peg.locked && peg.color == Some(*color))
            .find_map(|peg| clearable_root(snapshot, peg, free_slots));
        if let Some(root) = unlock {
            return Some((root, MoveReason::UnlocksMatch));
        }
    }

    if free_slots > 1 {
        let mut plates: BTreeMap<(ComponentId, u32), Vec<(PegId, bool)>> = BTreeMap::new();
        for peg in snapshot.pegs_on_board() {
            plates
                .entry((peg.component, peg.plate))
                .or_default()
                .push((peg.id, peg.is_selectable()));
        }

        let smallest = plates
            .values()
            .filter(|pegs| pegs.len() < free_slots)
            .min_by_key(|pegs| pegs.len());
        let pick = smallest.and_then(|pegs| {
            pegs.iter()
                .find(|(_, selectable)| *selectable)
                .map(|(peg, _)| *peg)
                .or_else(|| {
                    pegs.iter()
                        .filter_map(|(peg, _)| snapshot.peg(*peg))
                        .find_map(|peg| clearable_root(snapshot, peg, free_slots))
                })
        });
        if let Some(peg) = pick {
            return Some((peg, MoveReason::ClearsPlate));
        }
    }

    snapshot
        .pegs_on_board()
        .find(|peg| peg.is_selectable())
        .map(|peg| (peg.id, MoveReason::Forced))
}

/// Root of the peg's controller chain when the whole chain fits into `free_slots`.
fn clearable_root(snapshot: &SessionSnapshot, peg: &PegSnapshot, free_slots: usize) -> Option<PegId> {
    let chain = controller_chain(snapshot, peg);
    if chain.is_empty() || chain.len() > free_slots {
        return None;
    }
    let root = snapshot.peg(chain[0])?;
    root.is_selectable().then_some(root.id)
}

/// Primary controllers that must leave the board before the peg, root first.
fn controller_chain(snapshot: &SessionSnapshot, peg: &PegSnapshot) -> Vec<PegId> {
    let mut chain = Vec::new();
    let mut current = peg.controller;
    while let Some(id) = current {
        if id == peg.id || chain.contains(&id) {
            break;
        }
        chain.push(id);
        current = snapshot.peg(id).and_then(|controller| controller.controller);
    }
    chain.reverse();
    chain
}
