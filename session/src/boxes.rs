//! Box lifecycle: coloring, filling, deferred elimination, and refill.

use std::cmp::Reverse;

use log::debug;
use screw_unlock_core::{BoxId, BoxPhase, BoxSnapshot, Event, PegId, PegLocation, BOX_SLOT_COUNT};
use screw_unlock_system_color_allocation::BoxInfo;

use crate::GameSession;

#[derive(Clone, Debug)]
pub(crate) struct ColorBox {
    pub(crate) id: BoxId,
    pub(crate) phase: BoxPhase,
    slots: [Option<PegId>; BOX_SLOT_COUNT],
    relief: bool,
}

impl ColorBox {
    pub(crate) fn new(id: BoxId, enabled: bool) -> Self {
        Self {
            id,
            phase: if enabled {
                BoxPhase::Awaiting
            } else {
                BoxPhase::Disabled
            },
            slots: [None; BOX_SLOT_COUNT],
            relief: false,
        }
    }

    pub(crate) fn filled(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn is_full(&self) -> bool {
        self.filled() == BOX_SLOT_COUNT
    }

    pub(crate) fn info(&self) -> BoxInfo {
        BoxInfo {
            id: self.id,
            enabled: self.phase != BoxPhase::Disabled,
            color: match self.phase {
                BoxPhase::Active(color) => Some(color),
                _ => None,
            },
            filled: u32::try_from(self.filled()).unwrap_or(u32::MAX),
            relief: self.relief,
        }
    }

    pub(crate) fn snapshot(&self) -> BoxSnapshot {
        BoxSnapshot {
            id: self.id,
            phase: self.phase,
            slots: self.slots,
            relief: self.relief,
        }
    }

    fn fill(&mut self, peg: PegId) -> Option<u32> {
        let slot = self.slots.iter_mut().find(|slot| slot.is_none())?;
        *slot = Some(peg);
        u32::try_from(self.filled()).ok()
    }
}

/// Full box waiting for its elimination to fall due.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingElimination {
    box_index: usize,
    due_ms: u64,
}

impl GameSession {
    /// Colors the targeted boxes, or disables them once enough boxes exist to hold every peg.
    pub(crate) fn setup_or_refill_boxes(&mut self, targets: &[usize], out_events: &mut Vec<Event>) {
        let capacity = self.config.total_pegs / BOX_SLOT_COUNT as u32;
        let mut awaiting: Vec<usize> = Vec::new();

        for index in targets.iter().copied() {
            let active = self
                .boxes
                .iter()
                .enumerate()
                .filter(|(other, color_box)| {
                    *other != index && matches!(color_box.phase, BoxPhase::Active(_))
                })
                .count()
                + awaiting.len();
            let active = u32::try_from(active).unwrap_or(u32::MAX);

            let Some(color_box) = self.boxes.get_mut(index) else {
                continue;
            };
            color_box.slots = [None; BOX_SLOT_COUNT];
            if self.boxes_completed.saturating_add(active) >= capacity {
                color_box.phase = BoxPhase::Disabled;
                color_box.relief = false;
                out_events.push(Event::BoxDisabled {
                    box_id: color_box.id,
                });
                continue;
            }
            color_box.phase = BoxPhase::Awaiting;
            awaiting.push(index);
        }

        if awaiting.is_empty() {
            return;
        }

        let decisions = self.allocate_colors(&[]);
        for index in awaiting {
            let color_box = &mut self.boxes[index];
            let Some(color) = decisions.box_color(color_box.id) else {
                debug!("box {} stays uncolored", color_box.id.get());
                continue;
            };
            color_box.phase = BoxPhase::Active(color);
            out_events.push(Event::BoxColored {
                box_id: color_box.id,
                color,
            });
            self.absorb_parked(index, out_events);
        }
    }

    /// Retries every enabled box that is still waiting for a color.
    pub(crate) fn color_waiting_boxes(&mut self, out_events: &mut Vec<Event>) {
        let waiting: Vec<usize> = self
            .boxes
            .iter()
            .enumerate()
            .filter(|(_, color_box)| color_box.phase == BoxPhase::Awaiting)
            .map(|(index, _)| index)
            .collect();
        if !waiting.is_empty() {
            self.setup_or_refill_boxes(&waiting, out_events);
        }
    }

    /// Pulls parked pegs of the box color out of the temporary slots.
    fn absorb_parked(&mut self, box_index: usize, out_events: &mut Vec<Event>) {
        let Some(color) = self.boxes[box_index].info().color else {
            return;
        };
        let matching: Vec<(u32, PegId)> = self
            .temp
            .parked()
            .filter(|(_, peg)| {
                self.peg_index(*peg)
                    .map_or(false, |index| self.pegs[index].color == Some(color))
            })
            .collect();

        let box_id = self.boxes[box_index].id;
        for (slot, peg) in matching {
            if self.boxes[box_index].is_full() {
                break;
            }
            let Some(index) = self.peg_index(peg) else {
                continue;
            };
            let _ = self.temp.take(slot);
            let _ = self.boxes[box_index].fill(peg);
            self.pegs[index].location = PegLocation::Boxed(box_id);
            out_events.push(Event::PegAbsorbed { peg, slot, box_id });
        }

        if self.boxes[box_index].is_full() {
            self.schedule_elimination(box_index);
        }
    }

    /// Fills the first empty slot of the box with the peg.
    pub(crate) fn place_into_box(&mut self, peg_index: usize, box_index: usize, out_events: &mut Vec<Event>) {
        let peg = self.pegs[peg_index].id;
        let color_box = &mut self.boxes[box_index];
        let Some(filled) = color_box.fill(peg) else {
            return;
        };
        let box_id = color_box.id;
        self.pegs[peg_index].location = PegLocation::Boxed(box_id);
        out_events.push(Event::PegBoxed {
            peg,
            box_id,
            filled,
        });

        if self.boxes[box_index].is_full() {
            self.schedule_elimination(box_index);
        }
    }

    /// Best box for the peg: matching color with room, fullest first, then nearest, then lowest id.
    pub(crate) fn choose_box(&self, peg_index: usize) -> Option<usize> {
        let peg = &self.pegs[peg_index];
        let color = peg.color?;
        let column = match peg.location {
            PegLocation::Board(cell) => u64::from(cell.column()),
            _ => 0,
        };
        let box_count = u64::try_from(self.boxes.len()).unwrap_or(u64::MAX).max(1);
        let columns = u64::from(self.config.columns);

        self.boxes
            .iter()
            .enumerate()
            .filter(|(_, color_box)| {
                color_box.phase == BoxPhase::Active(color) && !color_box.is_full()
            })
            .min_by_key(|(index, color_box)| {
                let anchor = u64::try_from(*index).unwrap_or(u64::MAX) * columns / box_count;
                (Reverse(color_box.filled()), anchor.abs_diff(column), color_box.id)
            })
            .map(|(index, _)| index)
    }

    /// Opens a disabled box at the player's request.
    pub(crate) fn open_box(&mut self, box_id: BoxId, relief: bool, out_events: &mut Vec<Event>) -> bool {
        let Some(index) = self.boxes.iter().position(|color_box| color_box.id == box_id) else {
            return false;
        };
        if self.boxes[index].phase != BoxPhase::Disabled {
            return false;
        }
        self.boxes[index].relief = relief;
        self.setup_or_refill_boxes(&[index], out_events);
        true
    }

    fn schedule_elimination(&mut self, box_index: usize) {
        let due_ms = self.clock_ms.saturating_add(self.config.elimination_delay_ms);
        self.eliminations.push_back(PendingElimination { box_index, due_ms });
    }

    /// Applies every elimination that fell due, in trigger order. Returns how many were applied.
    pub(crate) fn flush_eliminations(&mut self, out_events: &mut Vec<Event>) -> u32 {
        let mut applied = 0;
        while let Some(pending) = self.eliminations.front().copied() {
            if pending.due_ms > self.clock_ms {
                break;
            }
            let _ = self.eliminations.pop_front();
            if self.eliminate(pending.box_index, out_events) {
                applied += 1;
            }
        }
        applied
    }

    fn eliminate(&mut self, box_index: usize, out_events: &mut Vec<Event>) -> bool {
        let Some(color_box) = self.boxes.get_mut(box_index) else {
            return false;
        };
        let (BoxPhase::Active(color), [Some(first), Some(second), Some(third)]) =
            (color_box.phase, color_box.slots)
        else {
            return false;
        };

        color_box.slots = [None; BOX_SLOT_COUNT];
        color_box.phase = BoxPhase::Awaiting;
        color_box.relief = false;
        let box_id = color_box.id;

        let pegs = [first, second, third];
        for peg in pegs {
            if let Some(index) = self.peg_index(peg) {
                self.pegs[index].location = PegLocation::Eliminated;
            }
        }
        self.eliminated = self.eliminated.saturating_add(BOX_SLOT_COUNT as u32);
        if let Some(tally) = self.tally_mut(color) {
            tally.eliminated += BOX_SLOT_COUNT as u32;
        }
        self.boxes_completed = self.boxes_completed.saturating_add(1);
        self.last_completed_color = Some(color);
        debug!("box {} eliminated a {} triple", box_id.get(), color.name());
        out_events.push(Event::TripleEliminated {
            box_id,
            color,
            pegs,
        });

        self.setup_or_refill_boxes(&[box_index], out_events);
        true
    }
}
