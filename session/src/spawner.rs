//! Materializes components plate by plate and wires locks among fresh pegs.

use log::{debug, warn};
use rand::{seq::SliceRandom, Rng};
use screw_unlock_core::{Event, PegColor, PegId, PegLocation, SizeClass};
use screw_unlock_system_difficulty::DifficultyLevel;

use crate::{layout::ComponentState, GameSession, LockConnection};

impl GameSession {
    /// Claims an area for the component and reveals its first plate.
    ///
    /// Returns `false` when no room can be found anywhere on the board.
    pub(crate) fn spawn_component(&mut self, index: usize, out_events: &mut Vec<Event>) -> bool {
        let component = &self.components[index];
        let catalog = &self.config.components;
        let spec = match component.size_class {
            SizeClass::Large => &catalog.large,
            SizeClass::Medium => &catalog.medium,
            SizeClass::Small => &catalog.small,
        };
        let Some(bounds) = self.regions.get(component.region).map(|region| region.bounds) else {
            return false;
        };
        let Some(area) =
            self.board
                .find_area(bounds, spec.footprint, component.largest_plate(), &mut self.rng)
        else {
            return false;
        };

        let id = component.id;
        self.board.reserve(area, id);
        let component = &mut self.components[index];
        component.area = Some(area);
        component.state = ComponentState::Active;
        component.active_plate = 0;
        debug!(
            "component {} placed at ({}, {})",
            id.get(),
            area.origin().column(),
            area.origin().row()
        );
        out_events.push(Event::ComponentSpawned {
            component: id,
            area,
        });

        self.spawn_component_plate(index, out_events);
        true
    }

    /// Reveals the active plate of the component: colors, cells, then locks.
    fn spawn_component_plate(&mut self, index: usize, out_events: &mut Vec<Event>) {
        let component = &self.components[index];
        let (id, plate_index, plate_count) = (
            component.id,
            component.active_plate,
            component.plate_count(),
        );
        let (Some(area), Some(plate)) = (component.area, component.plates.get(plate_index).cloned())
        else {
            return;
        };
        out_events.push(Event::PlateSpawned {
            component: id,
            plate: u32::try_from(plate_index).unwrap_or(u32::MAX),
            plate_count,
        });

        let uncolored: Vec<PegId> = plate
            .iter()
            .copied()
            .filter(|peg| {
                self.peg_index(*peg)
                    .map_or(false, |peg_index| self.pegs[peg_index].color.is_none())
            })
            .collect();
        if !uncolored.is_empty() {
            let decisions = self.allocate_colors(&uncolored);
            for assignment in decisions.pegs {
                if let Some(peg_index) = self.peg_index(assignment.peg) {
                    self.pegs[peg_index].color = Some(assignment.color);
                }
            }
        }

        let mut cells = self.board.free_cells(area, id);
        cells.shuffle(&mut self.rng);
        let fallback = self.palette.first().copied().unwrap_or(PegColor::new(0));
        for peg in plate.iter().copied() {
            let Some(peg_index) = self.peg_index(peg) else {
                continue;
            };
            let Some(cell) = cells.pop() else {
                warn!("component {} ran out of cells for peg {}", id.get(), peg.get());
                break;
            };
            let color = *self.pegs[peg_index].color.get_or_insert(fallback);
            self.pegs[peg_index].location = PegLocation::Board(cell);
            self.board.occupy(peg, cell);
            self.locks.place(peg, id, cell);
            self.revealed = self.revealed.saturating_add(1);
            if let Some(tally) = self.tally_mut(color) {
                tally.spawned += 1;
            }
            out_events.push(Event::PegSpawned {
                peg,
                cell,
                color,
                component: id,
            });
        }

        let level = self.difficulty();
        self.setup_locks(&plate, level, out_events);
        self.repair_local_deadlock(&plate, out_events);
    }

    fn setup_locks(&mut self, plate: &[PegId], level: DifficultyLevel, out_events: &mut Vec<Event>) {
        let limits = *self.locks.limits();
        let needy: Vec<PegColor> = self
            .boxes
            .iter()
            .filter_map(|color_box| {
                let info = color_box.info();
                (info.filled < 3).then_some(info.color).flatten()
            })
            .collect();

        for peg in plate.iter().copied() {
            let Some(peg_index) = self.peg_index(peg) else {
                continue;
            };
            if !self.locks.is_on_board(peg) {
                continue;
            }

            let mut probability = level.lock_probability;
            if self.pegs[peg_index]
                .color
                .map_or(false, |color| needy.contains(&color))
            {
                probability = probability.max(limits.needy_lock_probability);
            }
            if self.rng.gen::<f32>() >= probability {
                continue;
            }

            let wanted = self.connection_count(level.connection_multiplier, limits.max_controllers);
            let at_limit = limits
                .max_lock_groups
                .map_or(false, |max| self.locks.count_lock_groups() >= max);

            let mut applied = Vec::new();
            for _ in 0..wanted {
                let candidate = self
                    .locks
                    .controller_candidates(peg)
                    .into_iter()
                    .find(|controller| !at_limit || self.locks.is_locked(*controller));
                let Some(controller) = candidate else {
                    break;
                };
                if !self.locks.apply_lock(controller, peg, out_events) {
                    break;
                }
                applied.push(controller);
            }

            if let Some(max) = limits.max_lock_groups {
                if self.locks.count_lock_groups() > max {
                    debug!("rolling back locks on peg {} over the group limit", peg.get());
                    for controller in applied {
                        let _ = self.locks.remove_connection(
                            LockConnection {
                                controller,
                                locked: peg,
                            },
                            out_events,
                        );
                    }
                }
            }
        }
    }

    /// Stochastically rounds the connection multiplier into a controller count.
    fn connection_count(&mut self, multiplier: f32, max_controllers: u32) -> u32 {
        let multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        let whole = multiplier.floor();
        let extra = u32::from(self.rng.gen::<f32>() < multiplier - whole);
        (whole as u32).saturating_add(extra).clamp(1, max_controllers.max(1))
    }

    fn repair_local_deadlock(&mut self, plate: &[PegId], out_events: &mut Vec<Event>) {
        let on_board: Vec<PegId> = plate
            .iter()
            .copied()
            .filter(|peg| self.locks.is_on_board(*peg))
            .collect();
        let Some(first) = on_board.first().copied() else {
            return;
        };
        if on_board.iter().all(|peg| self.locks.is_locked(*peg)) {
            warn!("plate spawned fully locked, force-unlocking peg {}", first.get());
            let _ = self.locks.force_unlock(first, out_events);
        }
    }

    /// Advances the component once its active plate has no pegs left on the board.
    pub(crate) fn check_plate_completion(&mut self, index: usize, out_events: &mut Vec<Event>) {
        let Some(component) = self.components.get(index) else {
            return;
        };
        if component.state != ComponentState::Active {
            return;
        }
        let Some(plate) = component.plates.get(component.active_plate) else {
            return;
        };
        let cleared = plate.iter().all(|peg| {
            self.peg_index(*peg)
                .map_or(true, |peg_index| !matches!(self.pegs[peg_index].location, PegLocation::Board(_)))
        });
        if !cleared {
            return;
        }

        let id = component.id;
        let finished_plate = component.active_plate;
        out_events.push(Event::PlateCleared {
            component: id,
            plate: u32::try_from(finished_plate).unwrap_or(u32::MAX),
        });

        if finished_plate + 1 < component.plates.len() {
            self.components[index].active_plate = finished_plate + 1;
            self.spawn_component_plate(index, out_events);
        } else {
            self.components[index].state = ComponentState::Complete;
            self.board.release(id);
            debug!("component {} completed", id.get());
            out_events.push(Event::ComponentCompleted { component: id });
            self.check_and_replenish(out_events);
        }
    }
}

#[cfg(test)]
mod tests {
    use screw_unlock_core::{
        CellRectSize, CountRange, DifficultyProfile, DifficultyStage, Event, LevelConfig, PegId,
        SizeClassSpec,
    };

    use crate::{start_level, GameSession};

    /// Two three-peg components side by side, both revealed at start and free of locks.
    fn two_components() -> GameSession {
        let mut config = LevelConfig {
            rows: 6,
            columns: 6,
            total_pegs: 6,
            color_count: 2,
            min_onboard_pegs: 6,
            region_count: 1,
            ..LevelConfig::default()
        };
        let spec = SizeClassSpec {
            count: CountRange::exactly(1),
            layers: CountRange::exactly(1),
            pegs_per_layer: CountRange::exactly(3),
            footprint: CellRectSize::new(3, 3),
        };
        config.components.large = spec;
        config.components.medium = spec;
        config.locks.needy_lock_probability = 0.0;
        config.difficulty = DifficultyProfile::Stages {
            stages: vec![DifficultyStage {
                until: 1.0,
                k: 0.0,
                lock_probability_factor: 0.0,
                connection_multiplier: 1.0,
            }],
        };

        let mut game = GameSession::new();
        let mut events = Vec::new();
        start_level(&mut game, config, None, &mut events).expect("level starts");
        game
    }

    #[test]
    fn fully_locked_plate_gets_its_first_peg_released() {
        let mut game = two_components();
        let mut events = Vec::new();
        for (controller, locked) in [(3, 0), (4, 1), (5, 2)] {
            assert!(game
                .locks
                .apply_lock(PegId::new(controller), PegId::new(locked), &mut events));
        }
        let plate = game.components[0].plates[0].clone();
        assert_eq!(plate, vec![PegId::new(0), PegId::new(1), PegId::new(2)]);

        events.clear();
        game.repair_local_deadlock(&plate, &mut events);

        assert!(events.contains(&Event::PegUnlocked { peg: PegId::new(0) }));
        assert!(!game.locks.is_locked(PegId::new(0)));
        assert!(game.locks.is_locked(PegId::new(1)));
        assert!(game.locks.is_locked(PegId::new(2)));
    }

    #[test]
    fn plate_with_a_free_peg_is_left_alone() {
        let mut game = two_components();
        let mut events = Vec::new();
        assert!(game.locks.apply_lock(PegId::new(3), PegId::new(0), &mut events));
        assert!(game.locks.apply_lock(PegId::new(4), PegId::new(1), &mut events));
        let plate = game.components[0].plates[0].clone();

        events.clear();
        game.repair_local_deadlock(&plate, &mut events);

        assert!(events.is_empty());
        assert!(game.locks.is_locked(PegId::new(0)));
    }
}
