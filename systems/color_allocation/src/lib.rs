#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure color allocation system.
//!
//! Given a snapshot of the board, the boxes, and the temporary slots, the
//! system decides which color every enabled-but-uncolored box should accept
//! and which color every not-yet-colored peg should carry. It never mutates
//! session state; the caller applies the returned assignments.
//!
//! Box colors are decided first so that peg colors can react to them. In the
//! regular mode the difficulty scalar `k` trades hand-holding (colors the
//! player can act on right away) against challenge (scarce colors). Close to
//! the end of a level the system switches to a closing mode that favours
//! colors completing partially filled boxes or unfinished triples.
//!
//! Level-wide per-color totals are tracked through [`ColorTally`] values.
//! Whatever the mode, the last uncolored pegs of a level always round every
//! color total up to a multiple of three, so no color is left one peg short
//! of its final triple. Boxes only take colors a player can still deliver,
//! and two boxes share a color only when enough pegs of it exist to fill both.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};

use log::debug;
use rand::Rng;
use screw_unlock_core::{BoxId, ColorTally, ComponentId, PegColor, PegId, BOX_SLOT_COUNT};

const TRIPLE: u32 = BOX_SLOT_COUNT as u32;
const MIN_BOX_WEIGHT: f64 = 0.1;
const BOX_COLOR_DAMPING: f32 = 0.8;
const SATURATION_DAMPING: f32 = 0.8;

/// Peg visible to the allocator: everything on the board plus pegs about to be revealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldPeg {
    /// Identifier of the peg.
    pub id: PegId,
    /// Color of the peg; `None` requests an assignment.
    pub color: Option<PegColor>,
    /// Component owning the peg.
    pub component: ComponentId,
    /// Whether the peg is currently withheld by controllers.
    pub locked: bool,
}

/// Box visible to the allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxInfo {
    /// Identifier of the box.
    pub id: BoxId,
    /// Whether the box takes part in play.
    pub enabled: bool,
    /// Color of the box; `None` on an enabled box requests an assignment.
    pub color: Option<PegColor>,
    /// Number of filled slots.
    pub filled: u32,
    /// Relief boxes take the color of the first parked peg.
    pub relief: bool,
}

/// Immutable input consumed by [`ColorAllocation::allocate`].
#[derive(Clone, Copy, Debug)]
pub struct AllocationInput<'a> {
    /// Pegs on the board and pegs awaiting a color.
    pub pegs: &'a [FieldPeg],
    /// Every box of the box row.
    pub boxes: &'a [BoxInfo],
    /// Colors of the pegs parked in temporary slots, `None` for empty slots.
    pub temp_slots: &'a [Option<PegColor>],
    /// Difficulty scalar in `0.0..=1.0`.
    pub k: f32,
    /// Colors the level may use.
    pub palette: &'a [PegColor],
    /// Total pegs configured for the level.
    pub total_pegs: u32,
    /// Pegs eliminated so far.
    pub eliminated_pegs: u32,
    /// End-game mode starts once fewer pegs than this remain in the level.
    pub end_game_threshold: u32,
    /// Color of the most recently eliminated box, avoided on the next box when possible.
    pub last_completed_color: Option<PegColor>,
    /// Spawned and eliminated counts per color. Pegs awaiting a color are not included.
    pub tallies: &'a [ColorTally],
}

impl AllocationInput<'_> {
    /// Reports whether the closing heuristics apply.
    #[must_use]
    pub fn is_end_game(&self) -> bool {
        self.total_pegs.saturating_sub(self.eliminated_pegs) < self.end_game_threshold
    }

    /// Pegs of the level that have no color yet, including the ones requesting one now.
    #[must_use]
    pub fn uncolored_pegs(&self) -> u32 {
        let colored: u32 = self.tallies.iter().map(|tally| tally.spawned).sum();
        self.total_pegs.saturating_sub(colored)
    }
}

/// Color decided for a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxAssignment {
    /// Box receiving the color.
    pub box_id: BoxId,
    /// Assigned color.
    pub color: PegColor,
}

/// Color decided for a peg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PegAssignment {
    /// Peg receiving the color.
    pub peg: PegId,
    /// Assigned color.
    pub color: PegColor,
}

/// Decisions produced by a single allocation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationOutput {
    /// Colors for enabled boxes that had none.
    pub boxes: Vec<BoxAssignment>,
    /// Colors for pegs that had none.
    pub pegs: Vec<PegAssignment>,
}

impl AllocationOutput {
    /// Returns the color assigned to the provided box, if any.
    #[must_use]
    pub fn box_color(&self, box_id: BoxId) -> Option<PegColor> {
        self.boxes
            .iter()
            .find(|assignment| assignment.box_id == box_id)
            .map(|assignment| assignment.color)
    }

    /// Returns the color assigned to the provided peg, if any.
    #[must_use]
    pub fn peg_color(&self, peg: PegId) -> Option<PegColor> {
        self.pegs
            .iter()
            .find(|assignment| assignment.peg == peg)
            .map(|assignment| assignment.color)
    }
}

/// Pure system computing box and peg color assignments.
#[derive(Debug, Default)]
pub struct ColorAllocation {
    counts: BTreeMap<PegColor, u32>,
}

impl ColorAllocation {
    /// Creates a new allocator with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes assignments for every uncolored enabled box and every uncolored peg.
    ///
    /// The output buffer is cleared before populating it.
    pub fn allocate<R>(&mut self, input: &AllocationInput<'_>, rng: &mut R, out: &mut AllocationOutput)
    where
        R: Rng + ?Sized,
    {
        out.boxes.clear();
        out.pegs.clear();

        if input.palette.is_empty() {
            return;
        }

        let end_game = input.is_end_game();

        let boxes_to_assign: Vec<&BoxInfo> = input
            .boxes
            .iter()
            .filter(|info| info.enabled && info.color.is_none())
            .collect();
        if !boxes_to_assign.is_empty() {
            self.assign_box_colors(input, &boxes_to_assign, end_game, rng, out);
        }

        let pegs_to_assign: Vec<PegId> = input
            .pegs
            .iter()
            .filter(|peg| peg.color.is_none())
            .map(|peg| peg.id)
            .collect();
        if !pegs_to_assign.is_empty() {
            self.assign_peg_colors(input, &pegs_to_assign, end_game, rng, out);
        }

        debug!(
            "allocated {} box colors and {} peg colors (k={:.2}, end_game={})",
            out.boxes.len(),
            out.pegs.len(),
            input.k,
            end_game
        );
    }

    fn assign_box_colors<R>(
        &mut self,
        input: &AllocationInput<'_>,
        boxes_to_assign: &[&BoxInfo],
        end_game: bool,
        rng: &mut R,
        out: &mut AllocationOutput,
    ) where
        R: Rng + ?Sized,
    {
        let existing: BTreeSet<PegColor> = active_box_colors(input.boxes).collect();

        self.reset_counts(input.palette);
        for peg in input.pegs.iter().filter(|peg| !peg.locked) {
            if let Some(color) = peg.color {
                *self.counts.entry(color).or_insert(0) += 1;
            }
        }

        let mut parked: BTreeMap<PegColor, u32> = BTreeMap::new();
        for color in input.temp_slots.iter().flatten() {
            *parked.entry(*color).or_insert(0) += 1;
        }
        // Only colors a player can still deliver may open a box.
        let pool: Vec<PegColor> = input
            .palette
            .iter()
            .copied()
            .filter(|color| self.count(*color) > 0 || parked.contains_key(color))
            .collect();

        let k = f64::from(input.k.clamp(0.0, 1.0));
        let unlocked_total: u32 = self.counts.values().sum();
        let mut last_completed = input.last_completed_color;
        let mut batch: BTreeSet<PegColor> = BTreeSet::new();

        // Slots still open per box color, used to decide whether a color may be shared.
        let mut open_slots: BTreeMap<PegColor, u32> = BTreeMap::new();
        for info in input.boxes.iter().filter(|info| info.enabled) {
            if let Some(color) = info.color {
                *open_slots.entry(color).or_insert(0) += TRIPLE.saturating_sub(info.filled);
            }
        }
        let mut deliverable: BTreeMap<PegColor, u32> = parked.clone();
        for color in input.pegs.iter().filter_map(|peg| peg.color) {
            *deliverable.entry(color).or_insert(0) += 1;
        }

        for info in boxes_to_assign {
            let mut candidates: Vec<PegColor> = pool
                .iter()
                .copied()
                .filter(|color| !existing.contains(color) && !batch.contains(color))
                .collect();
            if candidates.is_empty() {
                // Deadlock bailout: share a color only when its pegs can fill every box of it.
                candidates = pool
                    .iter()
                    .copied()
                    .filter(|color| {
                        let open = open_slots.get(color).copied().unwrap_or(0);
                        deliverable.get(color).copied().unwrap_or(0) >= open + TRIPLE
                    })
                    .collect();
                if !candidates.is_empty() {
                    debug!("box {} shares an active color, no fresh color is in play", info.id.get());
                }
            }
            if candidates.is_empty() {
                debug!("box {} stays uncolored, no color can fill it", info.id.get());
                continue;
            }

            let relief_color = if info.relief {
                input
                    .temp_slots
                    .iter()
                    .flatten()
                    .copied()
                    .find(|color| candidates.contains(color))
            } else {
                None
            };
            let closing_color = if end_game && relief_color.is_none() {
                self.closing_box_color(&candidates, &parked)
            } else {
                None
            };
            let color = match relief_color.or(closing_color) {
                Some(color) => color,
                None => {
                    self.weighted_box_color(&candidates, unlocked_total, k, &mut last_completed, rng)
                }
            };

            out.boxes.push(BoxAssignment {
                box_id: info.id,
                color,
            });
            let _ = batch.insert(color);
            *open_slots.entry(color).or_insert(0) += TRIPLE;
        }
    }

    fn weighted_box_color<R>(
        &self,
        candidates: &[PegColor],
        unlocked_total: u32,
        k: f64,
        last_completed: &mut Option<PegColor>,
        rng: &mut R,
    ) -> PegColor
    where
        R: Rng + ?Sized,
    {
        let weights: Vec<f64> = candidates
            .iter()
            .map(|color| {
                let count = f64::from(self.count(*color));
                let weight =
                    count * (1.0 - k) + (1.0 / (count + 1.0)) * f64::from(unlocked_total) * k;
                weight.max(MIN_BOX_WEIGHT)
            })
            .collect();
        let mut color = weighted_pick(candidates, &weights, rng).unwrap_or(candidates[0]);

        if let Some(repeat) = last_completed.take() {
            if color == repeat && candidates.len() > 1 {
                let others: Vec<PegColor> =
                    candidates.iter().copied().filter(|c| *c != repeat).collect();
                color = others[rng.gen_range(0..others.len())];
            }
        }
        color
    }

    /// Color with the most deliverable pegs, preferring one that can fill a whole box.
    fn closing_box_color(
        &self,
        candidates: &[PegColor],
        parked: &BTreeMap<PegColor, u32>,
    ) -> Option<PegColor> {
        let available =
            |color: PegColor| self.count(color) + parked.get(&color).copied().unwrap_or(0);
        for target in (1..=TRIPLE).rev() {
            let best = candidates
                .iter()
                .copied()
                .filter(|color| available(*color) >= target)
                .max_by_key(|color| (available(*color), Reverse(*color)));
            if best.is_some() {
                return best;
            }
        }
        None
    }

    fn assign_peg_colors<R>(
        &mut self,
        input: &AllocationInput<'_>,
        pegs_to_assign: &[PegId],
        end_game: bool,
        rng: &mut R,
        out: &mut AllocationOutput,
    ) where
        R: Rng + ?Sized,
    {
        self.reset_counts(input.palette);
        for peg in input.pegs {
            if let Some(color) = peg.color {
                *self.counts.entry(color).or_insert(0) += 1;
            }
        }

        // Level-wide totals per color. A color closes once its total is a multiple of three.
        let mut totals: BTreeMap<PegColor, u32> =
            input.palette.iter().map(|color| (*color, 0)).collect();
        for tally in input.tallies {
            if let Some(total) = totals.get_mut(&tally.color) {
                *total += tally.spawned;
            }
        }
        let batch = u32::try_from(pegs_to_assign.len()).unwrap_or(u32::MAX);
        let mut uncolored = input.uncolored_pegs().max(batch);

        let partial_boxes: Vec<PegColor> = input
            .boxes
            .iter()
            .filter(|info| info.enabled && (1..TRIPLE).contains(&info.filled))
            .filter_map(|info| info.color)
            .collect();

        let mut box_colors: Vec<PegColor> = active_box_colors(input.boxes).collect();
        for assignment in &out.boxes {
            if !box_colors.contains(&assignment.color) {
                box_colors.push(assignment.color);
            }
        }
        let other_colors: Vec<PegColor> = input
            .palette
            .iter()
            .copied()
            .filter(|color| !box_colors.contains(color))
            .collect();

        let k = input.k.clamp(0.0, 1.0);
        let base_probability = 1.0 - k * BOX_COLOR_DAMPING;
        let colored: u32 = self.counts.values().sum();
        let matching: u32 = box_colors.iter().map(|color| self.count(*color)).sum();
        let ratio = if colored > 0 {
            matching as f32 / colored as f32
        } else {
            0.0
        };
        let box_color_probability = f64::from(base_probability * (1.0 - ratio * SATURATION_DAMPING));

        for peg in pegs_to_assign {
            let short: u32 = totals.values().map(|total| missing_for_triple(*total)).sum();
            // Once every remaining peg is needed to round totals up, only closing colors may go out.
            let closing = if uncolored <= short || end_game {
                closing_peg_color(&totals, &partial_boxes, rng)
            } else {
                None
            };

            let color = if let Some(color) = closing {
                color
            } else if !box_colors.is_empty() && rng.gen::<f64>() < box_color_probability {
                let weights: Vec<f64> = box_colors
                    .iter()
                    .map(|color| 1.0 / (f64::from(self.count(*color)) + 1.0))
                    .collect();
                weighted_pick(&box_colors, &weights, rng).unwrap_or(box_colors[0])
            } else if !other_colors.is_empty() {
                other_colors[rng.gen_range(0..other_colors.len())]
            } else {
                input.palette[rng.gen_range(0..input.palette.len())]
            };

            out.pegs.push(PegAssignment { peg: *peg, color });
            *self.counts.entry(color).or_insert(0) += 1;
            *totals.entry(color).or_insert(0) += 1;
            uncolored = uncolored.saturating_sub(1);
        }
    }

    fn reset_counts(&mut self, palette: &[PegColor]) {
        self.counts.clear();
        for color in palette {
            let _ = self.counts.insert(*color, 0);
        }
    }

    fn count(&self, color: PegColor) -> u32 {
        self.counts.get(&color).copied().unwrap_or(0)
    }
}

/// Pegs still needed before `total` becomes a multiple of three.
fn missing_for_triple(total: u32) -> u32 {
    (TRIPLE - total % TRIPLE) % TRIPLE
}

/// Picks a color whose total is not yet a multiple of three.
///
/// Colors of partially filled boxes come first, then the colors closest to
/// their next triple. Returns `None` when every total is already closed.
fn closing_peg_color<R>(
    totals: &BTreeMap<PegColor, u32>,
    partial_boxes: &[PegColor],
    rng: &mut R,
) -> Option<PegColor>
where
    R: Rng + ?Sized,
{
    let open: Vec<(PegColor, u32)> = totals
        .iter()
        .map(|(color, total)| (*color, missing_for_triple(*total)))
        .filter(|(_, missing)| *missing > 0)
        .collect();

    let boxed: Vec<PegColor> = open
        .iter()
        .map(|(color, _)| *color)
        .filter(|color| partial_boxes.contains(color))
        .collect();
    if !boxed.is_empty() {
        return Some(boxed[rng.gen_range(0..boxed.len())]);
    }

    let fewest = open.iter().map(|(_, missing)| *missing).min()?;
    let nearest: Vec<PegColor> = open
        .iter()
        .filter(|(_, missing)| *missing == fewest)
        .map(|(color, _)| *color)
        .collect();
    Some(nearest[rng.gen_range(0..nearest.len())])
}

/// Picks an item with probability proportional to its weight.
///
/// Negative or non-finite weights count as zero. When every weight is zero the
/// last item is returned. Returns `None` only for an empty slice.
pub fn weighted_pick<T, R>(items: &[T], weights: &[f64], rng: &mut R) -> Option<T>
where
    T: Copy,
    R: Rng + ?Sized,
{
    let last = *items.last()?;
    let weight_of = |index: usize| {
        weights
            .get(index)
            .copied()
            .filter(|weight| weight.is_finite() && *weight > 0.0)
            .unwrap_or(0.0)
    };

    let total: f64 = (0..items.len()).map(weight_of).sum();
    if total <= 0.0 {
        return Some(last);
    }

    let mut remaining = rng.gen::<f64>() * total;
    for (index, item) in items.iter().enumerate() {
        let weight = weight_of(index);
        if remaining < weight {
            return Some(*item);
        }
        remaining -= weight;
    }
    Some(last)
}

fn active_box_colors(boxes: &[BoxInfo]) -> impl Iterator<Item = PegColor> + '_ {
    let mut seen = BTreeSet::new();
    boxes
        .iter()
        .filter(|info| info.enabled)
        .filter_map(|info| info.color)
        .filter(move |color| seen.insert(*color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn weighted_pick_falls_back_to_last_item() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(weighted_pick(&[1, 2, 3], &[0.0, 0.0, 0.0], &mut rng), Some(3));
        assert_eq!(weighted_pick(&[1, 2], &[f64::NAN, -4.0], &mut rng), Some(2));
        assert_eq!(weighted_pick::<u8, _>(&[], &[], &mut rng), None);
    }

    #[test]
    fn weighted_pick_never_selects_zero_weight_items() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            assert_eq!(weighted_pick(&['a', 'b', 'c'], &[0.0, 1.0, 0.0], &mut rng), Some('b'));
        }
    }

    #[test]
    fn end_game_detection_uses_remaining_pegs() {
        let input = AllocationInput {
            pegs: &[],
            boxes: &[],
            temp_slots: &[],
            k: 0.0,
            palette: &[],
            total_pegs: 30,
            eliminated_pegs: 16,
            end_game_threshold: 15,
            last_completed_color: None,
            tallies: &[],
        };
        assert!(input.is_end_game());

        let early = AllocationInput {
            eliminated_pegs: 15,
            ..input
        };
        assert!(!early.is_end_game());
    }
}
