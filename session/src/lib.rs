#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative game session for Screw Unlock.
//!
//! A [`GameSession`] owns every peg, component, box, and temporary slot of a
//! level. Adapters mutate it exclusively through [`apply`] (or the focused
//! [`start_level`] and [`select_peg`] entry points) and observe it through the
//! [`Event`] values pushed into their buffer and the [`query`] module. All
//! randomness comes from a ChaCha generator seeded by the level
//! configuration, so identical command streams replay identically.

use std::collections::VecDeque;

use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use screw_unlock_core::{
    BoxId, CellCoord, ColorTally, Command, ComponentId, Event, LevelConfig, MoveDestination,
    Outcome, PegColor, PegId, PegLocation, PegSnapshot, RegionLayout, RejectionReason,
    SelectionOutcome, SizeClass, BOX_SLOT_COUNT, PALETTE_NAMES,
};
use screw_unlock_system_color_allocation::{
    AllocationInput, AllocationOutput, BoxInfo, ColorAllocation, FieldPeg,
};
use screw_unlock_system_difficulty::{build_curve, DifficultyCurve, DifficultyError};

mod boxes;
mod layout;
mod locks;
mod scheduler;
mod spawner;
mod temp;

pub use locks::{LockConnection, LockGraph};

use boxes::{ColorBox, PendingElimination};
use layout::{Board, Component, Region};
use temp::TempSlots;

/// Reasons a level configuration may be refused.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// The board has no cells.
    #[error("board must have at least one row and one column, got {columns}x{rows}")]
    EmptyBoard {
        /// Configured column count.
        columns: u32,
        /// Configured row count.
        rows: u32,
    },
    /// The level contains no pegs.
    #[error("level must contain at least one peg")]
    NoPegs,
    /// The pegs cannot be split into whole triples.
    #[error("{total} pegs cannot be split into triples")]
    PartialTriple {
        /// Configured peg count.
        total: u32,
    },
    /// The palette is empty.
    #[error("level must use at least one color")]
    NoColors,
    /// More colors were requested than the palette provides.
    #[error("{requested} colors requested but the palette only has {available}")]
    PaletteOverflow {
        /// Configured color count.
        requested: u32,
        /// Palette size.
        available: u32,
    },
    /// The box row is empty.
    #[error("level must have at least one box")]
    NoBoxes,
    /// More boxes start enabled than exist.
    #[error("{enabled} boxes enabled but only {boxes} exist")]
    TooManyEnabledBoxes {
        /// Configured enabled box count.
        enabled: u32,
        /// Configured box count.
        boxes: u32,
    },
    /// Regions cannot be laid out on the board.
    #[error("{regions} regions cannot be laid out over {rows} rows")]
    InvalidRegions {
        /// Configured region count.
        regions: u32,
        /// Configured row count.
        rows: u32,
    },
    /// A count range has its bounds reversed.
    #[error("{class:?} components have a range whose minimum exceeds its maximum")]
    InvalidRange {
        /// Offending size class.
        class: SizeClass,
    },
    /// A footprint does not fit on the board.
    #[error("{class:?} footprint {width}x{height} does not fit on the board")]
    FootprintTooLarge {
        /// Offending size class.
        class: SizeClass,
        /// Footprint width.
        width: u32,
        /// Footprint height.
        height: u32,
    },
    /// A footprint cannot hold the largest plate of its class.
    #[error("{class:?} footprint holds {cells} cells but plates may carry {pegs} pegs")]
    FootprintTooSmall {
        /// Offending size class.
        class: SizeClass,
        /// Cells covered by the footprint.
        cells: u32,
        /// Largest plate size of the class.
        pegs: u32,
    },
    /// The component generators could not absorb the whole peg budget.
    #[error("{remaining} pegs could not be allocated to any component")]
    UnallocatedPegs {
        /// Pegs left over after generation.
        remaining: u32,
    },
    /// The difficulty profile is invalid.
    #[error("invalid difficulty profile: {0}")]
    Difficulty(#[from] DifficultyError),
}

#[derive(Clone, Copy, Debug)]
struct Peg {
    id: PegId,
    color: Option<PegColor>,
    component: ComponentId,
    plate: u32,
    location: PegLocation,
}

/// Authoritative state of a single level.
#[derive(Debug)]
pub struct GameSession {
    config: LevelConfig,
    curve: Option<Box<dyn DifficultyCurve>>,
    rng: ChaCha8Rng,
    palette: Vec<PegColor>,
    tallies: Vec<ColorTally>,
    pegs: Vec<Peg>,
    locks: LockGraph,
    board: Board,
    regions: Vec<Region>,
    components: Vec<Component>,
    active_region: usize,
    boxes: Vec<ColorBox>,
    temp: TempSlots,
    allocation: ColorAllocation,
    eliminations: VecDeque<PendingElimination>,
    clock_ms: u64,
    revealed: u32,
    eliminated: u32,
    boxes_completed: u32,
    last_completed_color: Option<PegColor>,
    outcome: Option<Outcome>,
    started: bool,
}

impl GameSession {
    /// Creates an idle session. No level is running until one is started.
    #[must_use]
    pub fn new() -> Self {
        let config = LevelConfig::default();
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            locks: LockGraph::new(config.locks),
            board: Board::new(0, 0),
            config,
            curve: None,
            palette: Vec::new(),
            tallies: Vec::new(),
            pegs: Vec::new(),
            regions: Vec::new(),
            components: Vec::new(),
            active_region: 0,
            boxes: Vec::new(),
            temp: TempSlots::default(),
            allocation: ColorAllocation::new(),
            eliminations: VecDeque::new(),
            clock_ms: 0,
            revealed: 0,
            eliminated: 0,
            boxes_completed: 0,
            last_completed_color: None,
            outcome: None,
            started: false,
        }
    }

    fn peg_index(&self, peg: PegId) -> Option<usize> {
        usize::try_from(peg.get())
            .ok()
            .filter(|index| *index < self.pegs.len())
    }

    fn on_board_count(&self) -> u32 {
        let count = self
            .pegs
            .iter()
            .filter(|peg| matches!(peg.location, PegLocation::Board(_)))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn tally_mut(&mut self, color: PegColor) -> Option<&mut ColorTally> {
        self.tallies.iter_mut().find(|tally| tally.color == color)
    }

    fn peg_snapshot(&self, peg: &Peg) -> PegSnapshot {
        PegSnapshot {
            id: peg.id,
            color: peg.color,
            location: peg.location,
            locked: self.locks.is_locked(peg.id),
            controller: self.locks.controller(peg.id),
            controllers: self.locks.controllers(peg.id).to_vec(),
            control: self.locks.control(peg.id),
            component: peg.component,
            plate: peg.plate,
        }
    }

    /// Runs the color allocation over the current board for the given color-less pegs.
    fn allocate_colors(&mut self, awaiting: &[PegId]) -> AllocationOutput {
        let mut field: Vec<FieldPeg> = self
            .pegs
            .iter()
            .filter(|peg| matches!(peg.location, PegLocation::Board(_)))
            .filter_map(|peg| {
                Some(FieldPeg {
                    id: peg.id,
                    color: Some(peg.color?),
                    component: peg.component,
                    locked: self.locks.is_locked(peg.id),
                })
            })
            .collect();
        for id in awaiting {
            if let Some(index) = self.peg_index(*id) {
                field.push(FieldPeg {
                    id: *id,
                    color: None,
                    component: self.pegs[index].component,
                    locked: false,
                });
            }
        }

        let boxes: Vec<BoxInfo> = self.boxes.iter().map(ColorBox::info).collect();
        let temp_colors: Vec<Option<PegColor>> = self
            .temp
            .slots()
            .iter()
            .map(|slot| slot.and_then(|peg| self.peg_index(peg)).and_then(|index| self.pegs[index].color))
            .collect();

        let input = AllocationInput {
            pegs: &field,
            boxes: &boxes,
            temp_slots: &temp_colors,
            k: self.difficulty().k,
            palette: &self.palette,
            total_pegs: self.config.total_pegs,
            eliminated_pegs: self.eliminated,
            end_game_threshold: self.config.end_game_threshold,
            last_completed_color: self.last_completed_color,
            tallies: &self.tallies,
        };
        let mut decisions = AllocationOutput::default();
        self.allocation.allocate(&input, &mut self.rng, &mut decisions);
        decisions
    }

    fn lift_from_board(&mut self, index: usize, cell: CellCoord, out_events: &mut Vec<Event>) {
        self.board.vacate(cell);
        out_events.push(Event::PegRemoved {
            peg: self.pegs[index].id,
            cell,
        });
    }

    fn is_playing(&self) -> bool {
        self.started && self.outcome.is_none()
    }

    fn selectable(&self, peg: PegId) -> Result<(usize, CellCoord), RejectionReason> {
        if !self.is_playing() {
            return Err(RejectionReason::Inactive);
        }
        let index = self.peg_index(peg).ok_or(RejectionReason::UnknownPeg)?;
        let PegLocation::Board(cell) = self.pegs[index].location else {
            return Err(RejectionReason::NotOnBoard);
        };
        if self.locks.is_locked(peg) {
            return Err(RejectionReason::Locked);
        }
        Ok((index, cell))
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Resets the session and starts a new level.
///
/// When `curve` is `None` the curve described by `config.difficulty` is used.
/// On error the session is left untouched.
pub fn start_level(
    session: &mut GameSession,
    config: LevelConfig,
    curve: Option<Box<dyn DifficultyCurve>>,
    out_events: &mut Vec<Event>,
) -> Result<(), ConfigurationError> {
    validate(&config)?;
    let curve = match curve {
        Some(curve) => curve,
        None => build_curve(&config.difficulty)?,
    };

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let bounds = layout::region_bounds(
        config.region_layout,
        config.region_count,
        config.columns,
        config.rows,
    );
    let data = layout::generate_level_data(config.total_pegs, &config.components, bounds, &mut rng)?;

    let pegs = data
        .pegs
        .iter()
        .enumerate()
        .map(|(index, seed)| Peg {
            id: PegId::new(u32::try_from(index).unwrap_or(u32::MAX)),
            color: None,
            component: seed.component,
            plate: seed.plate,
            location: PegLocation::Unspawned,
        })
        .collect();
    let boxes = (0..config.box_count)
        .map(|index| ColorBox::new(BoxId::new(index), index < config.enabled_boxes))
        .collect();
    let palette = PegColor::palette(config.color_count);

    *session = GameSession {
        rng,
        curve: Some(curve),
        tallies: palette.iter().copied().map(ColorTally::new).collect(),
        palette,
        pegs,
        locks: LockGraph::new(config.locks),
        board: Board::new(config.columns, config.rows),
        regions: data.regions,
        components: data.components,
        boxes,
        temp: TempSlots::with_capacity(config.temp_slot_count),
        started: true,
        config,
        ..GameSession::new()
    };

    info!(
        "level started: {} pegs in {} components across {} regions",
        session.config.total_pegs,
        session.components.len(),
        session.regions.len()
    );
    out_events.push(Event::LevelStarted {
        total_pegs: session.config.total_pegs,
        components: u32::try_from(session.components.len()).unwrap_or(u32::MAX),
    });
    if let Some(region) = session.regions.first() {
        out_events.push(Event::RegionActivated { region: region.id });
    }

    // Boxes are colored from the opening board, so they start once the first plates are out.
    session.check_and_replenish(out_events);
    session.settle(out_events);
    Ok(())
}

/// Handles a player selecting a peg on the board.
///
/// The peg moves into the fullest matching box, or into the first free
/// temporary slot. If neither has room the level is lost. The level is also
/// lost once no selection can ever be made again without it being won.
/// Rejected selections produce [`Event::SelectionRejected`] and an empty
/// outcome.
pub fn select_peg(
    session: &mut GameSession,
    peg: PegId,
    out_events: &mut Vec<Event>,
) -> SelectionOutcome {
    let mut outcome = SelectionOutcome::default();
    let (index, cell) = match session.selectable(peg) {
        Ok(found) => found,
        Err(reason) => {
            out_events.push(Event::SelectionRejected { peg, reason });
            return outcome;
        }
    };

    let completed_before = session.boxes_completed;
    let destination = match (session.choose_box(index), session.temp.first_free()) {
        (Some(box_index), _) => {
            session.lift_from_board(index, cell, out_events);
            session.place_into_box(index, box_index, out_events);
            MoveDestination::Box(session.boxes[box_index].id)
        }
        (None, Some(slot)) => {
            session.lift_from_board(index, cell, out_events);
            session.temp.park(slot, peg);
            session.pegs[index].location = PegLocation::TempSlot(slot);
            out_events.push(Event::PegParked { peg, slot });
            MoveDestination::TempSlot(slot)
        }
        (None, None) => {
            session.declare_outcome(Outcome::Lose, out_events);
            outcome.game_over = session.outcome;
            return outcome;
        }
    };

    session.locks.release_peg(peg, out_events);
    let component = usize::try_from(session.pegs[index].component.get()).unwrap_or(usize::MAX);
    session.check_plate_completion(component, out_events);
    if session.config.elimination_delay_ms == 0 {
        let _ = session.flush_eliminations(out_events);
    }
    session.check_victory(out_events);
    session.check_and_replenish(out_events);
    session.settle(out_events);

    outcome.moved_to = Some(destination);
    outcome.eliminated_triple = session.boxes_completed > completed_before;
    outcome.game_over = session.outcome;
    outcome
}

/// Draws a lock between two on-board pegs, returning whether it was accepted.
///
/// The same limits as generated locks apply. Useful for hand-authored
/// layouts and tutorials.
pub fn apply_lock(
    session: &mut GameSession,
    controller: PegId,
    locked: PegId,
    out_events: &mut Vec<Event>,
) -> bool {
    session.is_playing() && session.locks.apply_lock(controller, locked, out_events)
}

/// Applies the provided command to the session.
pub fn apply(session: &mut GameSession, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::StartLevel { config } => {
            if let Err(error) = start_level(session, config, None, out_events) {
                warn!("level rejected: {error}");
                out_events.push(Event::LevelRejected {
                    reason: error.to_string(),
                });
            }
        }
        Command::SelectPeg { peg } => {
            let _ = select_peg(session, peg, out_events);
        }
        Command::OpenBox { box_id, relief } => {
            if !session.is_playing() {
                return;
            }
            if session.open_box(box_id, relief, out_events) {
                session.settle(out_events);
            }
        }
        Command::AddTempSlot => {
            if session.is_playing() {
                let capacity = session.temp.grow();
                out_events.push(Event::TempSlotAdded { capacity });
            }
        }
        Command::Tick { dt_ms } => {
            if !session.started {
                return;
            }
            session.clock_ms = session.clock_ms.saturating_add(dt_ms);
            if session.flush_eliminations(out_events) > 0 {
                session.settle(out_events);
            }
        }
    }
}

fn validate(config: &LevelConfig) -> Result<(), ConfigurationError> {
    if config.columns == 0 || config.rows == 0 {
        return Err(ConfigurationError::EmptyBoard {
            columns: config.columns,
            rows: config.rows,
        });
    }
    if config.total_pegs == 0 {
        return Err(ConfigurationError::NoPegs);
    }
    if config.total_pegs % BOX_SLOT_COUNT as u32 != 0 {
        return Err(ConfigurationError::PartialTriple {
            total: config.total_pegs,
        });
    }
    if config.color_count == 0 {
        return Err(ConfigurationError::NoColors);
    }
    let available = u32::try_from(PALETTE_NAMES.len()).unwrap_or(u32::MAX);
    if config.color_count > available {
        return Err(ConfigurationError::PaletteOverflow {
            requested: config.color_count,
            available,
        });
    }
    if config.box_count == 0 {
        return Err(ConfigurationError::NoBoxes);
    }
    if config.enabled_boxes > config.box_count {
        return Err(ConfigurationError::TooManyEnabledBoxes {
            enabled: config.enabled_boxes,
            boxes: config.box_count,
        });
    }
    if config.region_count == 0
        || (config.region_layout == RegionLayout::Bands && config.region_count > config.rows)
    {
        return Err(ConfigurationError::InvalidRegions {
            regions: config.region_count,
            rows: config.rows,
        });
    }

    let catalog = &config.components;
    for (class, spec) in [
        (SizeClass::Large, &catalog.large),
        (SizeClass::Medium, &catalog.medium),
        (SizeClass::Small, &catalog.small),
    ] {
        if [spec.count, spec.layers, spec.pegs_per_layer]
            .iter()
            .any(|range| range.min > range.max)
        {
            return Err(ConfigurationError::InvalidRange { class });
        }
        let footprint = spec.footprint;
        if footprint.width() > config.columns || footprint.height() > config.rows {
            return Err(ConfigurationError::FootprintTooLarge {
                class,
                width: footprint.width(),
                height: footprint.height(),
            });
        }
        if footprint.area() < spec.pegs_per_layer.max {
            return Err(ConfigurationError::FootprintTooSmall {
                class,
                cells: footprint.area(),
                pegs: spec.pegs_per_layer.max,
            });
        }
    }
    Ok(())
}

/// Query functions that provide read-only access to the session state.
pub mod query {
    use screw_unlock_core::{
        BoxSnapshot, LevelConfig, Outcome, PegId, PegLocation, PegSnapshot, ProgressSnapshot,
        SessionSnapshot, TempSlotSnapshot,
    };
    use screw_unlock_system_difficulty::DifficultyLevel;

    use super::{GameSession, LockGraph};

    /// Captures a read-only view of the whole session.
    #[must_use]
    pub fn snapshot(session: &GameSession) -> SessionSnapshot {
        SessionSnapshot {
            columns: session.config.columns,
            rows: session.config.rows,
            pegs: session
                .pegs
                .iter()
                .map(|peg| session.peg_snapshot(peg))
                .collect(),
            boxes: boxes(session),
            temp_slots: temp_slots(session),
            progress: progress(session),
        }
    }

    /// Captures the state of a single peg.
    #[must_use]
    pub fn peg(session: &GameSession, peg: PegId) -> Option<PegSnapshot> {
        let index = session.peg_index(peg)?;
        Some(session.peg_snapshot(&session.pegs[index]))
    }

    /// Captures every box in identifier order.
    #[must_use]
    pub fn boxes(session: &GameSession) -> Vec<BoxSnapshot> {
        session.boxes.iter().map(|color_box| color_box.snapshot()).collect()
    }

    /// Captures every temporary slot in index order.
    #[must_use]
    pub fn temp_slots(session: &GameSession) -> Vec<TempSlotSnapshot> {
        session
            .temp
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| TempSlotSnapshot {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                peg: *slot,
                color: slot
                    .and_then(|peg| session.peg_index(peg))
                    .and_then(|index| session.pegs[index].color),
            })
            .collect()
    }

    /// Counts where every peg of the level currently is.
    #[must_use]
    pub fn progress(session: &GameSession) -> ProgressSnapshot {
        let unspawned = session
            .pegs
            .iter()
            .filter(|peg| peg.location == PegLocation::Unspawned)
            .count();
        let in_boxes: usize = session.boxes.iter().map(|color_box| color_box.filled()).sum();
        ProgressSnapshot {
            total: session.config.total_pegs,
            eliminated: session.eliminated,
            on_board: session.on_board_count(),
            in_temp: session.temp.occupied(),
            in_boxes: u32::try_from(in_boxes).unwrap_or(u32::MAX),
            unspawned: u32::try_from(unspawned).unwrap_or(u32::MAX),
            boxes_completed: session.boxes_completed,
            lock_groups: session.locks.count_lock_groups(),
            difficulty_k_permille: session.difficulty().k_permille(),
            outcome: session.outcome,
            colors: session.tallies.clone(),
        }
    }

    /// Controllers that must be removed before the peg, root first.
    #[must_use]
    pub fn chain(session: &GameSession, peg: PegId) -> Vec<PegId> {
        session.locks.chain(peg)
    }

    /// Length of the longest lock chain ending at the peg; zero when off the board.
    #[must_use]
    pub fn lock_depth(session: &GameSession, peg: PegId) -> u32 {
        if session.locks.is_on_board(peg) {
            session.locks.lock_depth(peg)
        } else {
            0
        }
    }

    /// Number of lock groups on the board.
    #[must_use]
    pub fn lock_group_count(session: &GameSession) -> u32 {
        session.locks.count_lock_groups()
    }

    /// Provides read-only access to the lock graph.
    #[must_use]
    pub fn lock_graph(session: &GameSession) -> &LockGraph {
        &session.locks
    }

    /// Difficulty knobs currently in effect.
    #[must_use]
    pub fn difficulty(session: &GameSession) -> DifficultyLevel {
        session.difficulty()
    }

    /// Configuration of the running level.
    #[must_use]
    pub fn config(session: &GameSession) -> &LevelConfig {
        &session.config
    }

    /// Terminal outcome, if reached.
    #[must_use]
    pub fn outcome(session: &GameSession) -> Option<Outcome> {
        session.outcome
    }

    /// Number of full boxes waiting for their elimination to fall due.
    #[must_use]
    pub fn pending_eliminations(session: &GameSession) -> usize {
        session.eliminations.len()
    }
}
