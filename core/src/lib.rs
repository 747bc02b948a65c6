#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Screw Unlock engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative game session, and pure systems. Adapters submit [`Command`]
//! values describing desired mutations, the session executes those commands
//! via its `apply` entry point, and then broadcasts [`Event`] values that
//! renderers and clients react to. Systems consume immutable snapshots and
//! respond exclusively with new command batches or pure decisions.

use serde::{Deserialize, Serialize};

mod config;

pub use config::{
    ComponentCatalog, CountRange, DifficultyProfile, DifficultyStage, LevelConfig, LockLimits,
    ProgressMeasure, RegionLayout, SizeClassSpec,
};

/// Number of slots carried by every color box.
pub const BOX_SLOT_COUNT: usize = 3;

/// Names of every color a level may draw from, in palette order.
pub const PALETTE_NAMES: [&str; 10] = [
    "red", "blue", "green", "yellow", "purple", "orange", "pink", "brown", "cyan", "gray",
];

/// Commands that express all permissible session mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Resets the session and starts a new level with the provided configuration.
    StartLevel {
        /// Complete description of the level to generate.
        config: LevelConfig,
    },
    /// Player input: attempts to remove the peg from the board.
    SelectPeg {
        /// Identifier of the peg the player selected.
        peg: PegId,
    },
    /// Opens a disabled box so that it receives a color.
    OpenBox {
        /// Box targeted by the request.
        box_id: BoxId,
        /// Relief boxes take the color of the first parked peg.
        relief: bool,
    },
    /// Grows the temporary slot row by one slot.
    AddTempSlot,
    /// Advances the session clock, applying deferred eliminations that fell due.
    Tick {
        /// Milliseconds of simulated time that elapsed since the previous tick.
        dt_ms: u64,
    },
}

/// Events broadcast by the session after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Confirms that a level was generated and initial content spawned.
    LevelStarted {
        /// Total number of pegs the level will ever contain.
        total_pegs: u32,
        /// Number of components generated for the level.
        components: u32,
    },
    /// Reports that a level configuration was refused.
    LevelRejected {
        /// Human readable explanation of the configuration problem.
        reason: String,
    },
    /// Announces that a region became the active staging partition.
    RegionActivated {
        /// Region that became active.
        region: RegionId,
    },
    /// Confirms that a component claimed an area of the board.
    ComponentSpawned {
        /// Component that was placed.
        component: ComponentId,
        /// Cells reserved for the component.
        area: CellRect,
    },
    /// Confirms that a plate of a component was revealed.
    PlateSpawned {
        /// Component owning the plate.
        component: ComponentId,
        /// Zero-based index of the plate within the component.
        plate: u32,
        /// Number of plates the component holds in total.
        plate_count: u32,
    },
    /// Confirms that a peg appeared on the board.
    PegSpawned {
        /// Identifier of the peg.
        peg: PegId,
        /// Cell occupied by the peg.
        cell: CellCoord,
        /// Color assigned to the peg.
        color: PegColor,
        /// Component owning the peg.
        component: ComponentId,
    },
    /// Confirms that a lock connection was drawn between two pegs.
    LockApplied {
        /// Peg that must be removed first.
        controller: PegId,
        /// Peg withheld until its controllers are cleared.
        locked: PegId,
    },
    /// Confirms that a lock connection was removed.
    LockReleased {
        /// Former controller of the connection.
        controller: PegId,
        /// Former locked endpoint of the connection.
        locked: PegId,
    },
    /// Announces that a peg lost its last controller and became playable.
    PegUnlocked {
        /// Peg that became playable.
        peg: PegId,
    },
    /// Confirms that a peg left its board cell.
    PegRemoved {
        /// Identifier of the peg.
        peg: PegId,
        /// Cell the peg occupied.
        cell: CellCoord,
    },
    /// Confirms that a peg filled a slot of a box.
    PegBoxed {
        /// Identifier of the peg.
        peg: PegId,
        /// Box receiving the peg.
        box_id: BoxId,
        /// Number of filled slots after placement.
        filled: u32,
    },
    /// Confirms that a peg was parked in a temporary slot.
    PegParked {
        /// Identifier of the peg.
        peg: PegId,
        /// Index of the temporary slot.
        slot: u32,
    },
    /// Confirms that a parked peg was pulled from its temporary slot into a box.
    PegAbsorbed {
        /// Identifier of the peg.
        peg: PegId,
        /// Temporary slot the peg left.
        slot: u32,
        /// Box receiving the peg.
        box_id: BoxId,
    },
    /// Confirms that a box received a color and three empty slots.
    BoxColored {
        /// Box that was colored.
        box_id: BoxId,
        /// Color the box now accepts.
        color: PegColor,
    },
    /// Announces that a box will not receive further colors.
    BoxDisabled {
        /// Box that was disabled.
        box_id: BoxId,
    },
    /// Confirms that three pegs in a box were eliminated.
    TripleEliminated {
        /// Box that held the triple.
        box_id: BoxId,
        /// Color of the eliminated triple.
        color: PegColor,
        /// Pegs removed from play.
        pegs: [PegId; BOX_SLOT_COUNT],
    },
    /// Confirms that every peg of a plate left the board.
    PlateCleared {
        /// Component owning the plate.
        component: ComponentId,
        /// Zero-based plate index.
        plate: u32,
    },
    /// Confirms that a component cleared its final plate.
    ComponentCompleted {
        /// Component that completed.
        component: ComponentId,
    },
    /// Reports that a component could not be placed and was skipped.
    ComponentSkipped {
        /// Component that was skipped.
        component: ComponentId,
    },
    /// Confirms that the temporary slot row grew.
    TempSlotAdded {
        /// Number of temporary slots after the change.
        capacity: u32,
    },
    /// Reports that a selection was ignored.
    SelectionRejected {
        /// Peg named by the selection.
        peg: PegId,
        /// Specific reason the selection failed.
        reason: RejectionReason,
    },
    /// Announces the terminal outcome of the level.
    GameOver {
        /// Win or lose.
        outcome: Outcome,
    },
}

/// Terminal result of a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Every peg was eliminated.
    Win,
    /// A peg could not be placed anywhere.
    Lose,
}

/// Reasons a peg selection may be ignored by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    /// No peg with the provided identifier exists.
    UnknownPeg,
    /// The peg is not currently on the board.
    NotOnBoard,
    /// The peg is held by at least one controller.
    Locked,
    /// The level already ended or was never started.
    Inactive,
}

/// Destination a selected peg moved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveDestination {
    /// The peg filled a slot of the box.
    Box(BoxId),
    /// The peg was parked in the temporary slot with the given index.
    TempSlot(u32),
}

/// Result reported to the caller after a peg selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SelectionOutcome {
    /// Where the peg went, if the selection was accepted.
    pub moved_to: Option<MoveDestination>,
    /// Whether at least one triple was eliminated while handling the selection.
    pub eliminated_triple: bool,
    /// Terminal outcome reached by the selection, if any.
    pub game_over: Option<Outcome>,
}

/// Color assigned to a peg or box, expressed as a palette index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PegColor(u8);

impl PegColor {
    /// Creates a color from its palette index.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Palette index of the color.
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.0
    }

    /// Human readable name of the color.
    #[must_use]
    pub fn name(&self) -> &'static str {
        PALETTE_NAMES
            .get(usize::from(self.0))
            .copied()
            .unwrap_or("unknown")
    }

    /// Returns the first `count` palette colors, clamped to the palette size.
    #[must_use]
    pub fn palette(count: u32) -> Vec<PegColor> {
        let limit = usize::try_from(count)
            .unwrap_or(usize::MAX)
            .min(PALETTE_NAMES.len());
        (0..limit)
            .filter_map(|index| u8::try_from(index).ok())
            .map(PegColor::new)
            .collect()
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new identifier with the provided numeric value.
            #[must_use]
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            /// Retrieves the numeric representation of the identifier.
            #[must_use]
            pub const fn get(&self) -> u32 {
                self.0
            }
        }
    };
}

numeric_id!(
    /// Unique identifier assigned to a peg.
    PegId
);
numeric_id!(
    /// Identifier of a box within the fixed box row.
    BoxId
);
numeric_id!(
    /// Unique identifier assigned to a component.
    ComponentId
);
numeric_id!(
    /// Index of a region within the level.
    RegionId
);

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.column().abs_diff(other.column()) + self.row().abs_diff(other.row())
    }
}

/// Axis-aligned rectangle expressed in cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    origin: CellCoord,
    size: CellRectSize,
}

impl CellRect {
    /// Constructs a rectangle from an origin cell and size.
    #[must_use]
    pub const fn from_origin_and_size(origin: CellCoord, size: CellRectSize) -> Self {
        Self { origin, size }
    }

    /// Upper-left cell that anchors the rectangle.
    #[must_use]
    pub const fn origin(&self) -> CellCoord {
        self.origin
    }

    /// Dimensions of the rectangle measured in whole cells.
    #[must_use]
    pub const fn size(&self) -> CellRectSize {
        self.size
    }

    /// Reports whether the cell lies inside the rectangle.
    #[must_use]
    pub fn contains(&self, cell: CellCoord) -> bool {
        cell.column() >= self.origin.column()
            && cell.row() >= self.origin.row()
            && cell.column() - self.origin.column() < self.size.width()
            && cell.row() - self.origin.row() < self.size.height()
    }

    /// Iterates over every cell of the rectangle in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> {
        let origin = self.origin;
        let size = self.size;
        (0..size.height()).flat_map(move |dy| {
            (0..size.width())
                .map(move |dx| CellCoord::new(origin.column() + dx, origin.row() + dy))
        })
    }
}

/// Size of a [`CellRect`] measured in whole cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRectSize {
    width: u32,
    height: u32,
}

impl CellRectSize {
    /// Creates a new size descriptor with explicit dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width of the rectangle in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the rectangle in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells covered by the rectangle.
    #[must_use]
    pub const fn area(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }
}

/// Size classes a component may belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    /// A single large component anchors every level.
    Large,
    /// A handful of medium components.
    Medium,
    /// Small components absorb whatever budget remains.
    Small,
}

/// Where a peg currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PegLocation {
    /// The peg's plate has not been revealed yet.
    Unspawned,
    /// The peg occupies a board cell.
    Board(CellCoord),
    /// The peg is parked in a temporary slot.
    TempSlot(u32),
    /// The peg fills a slot of a box awaiting elimination.
    Boxed(BoxId),
    /// The peg was eliminated as part of a triple.
    Eliminated,
}

/// Immutable representation of a single peg used for queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PegSnapshot {
    /// Unique identifier assigned to the peg.
    pub id: PegId,
    /// Color assigned to the peg, if already revealed.
    pub color: Option<PegColor>,
    /// Current location of the peg.
    pub location: PegLocation,
    /// Whether the peg is withheld by controllers.
    pub locked: bool,
    /// Primary controller holding the peg.
    pub controller: Option<PegId>,
    /// Every controller holding the peg.
    pub controllers: Vec<PegId>,
    /// Peg this one currently controls.
    pub control: Option<PegId>,
    /// Component owning the peg.
    pub component: ComponentId,
    /// Plate index within the owning component.
    pub plate: u32,
}

impl PegSnapshot {
    /// Returns the board cell occupied by the peg, if any.
    #[must_use]
    pub fn cell(&self) -> Option<CellCoord> {
        match self.location {
            PegLocation::Board(cell) => Some(cell),
            _ => None,
        }
    }

    /// Reports whether the player may select the peg.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.cell().is_some() && !self.locked
    }
}

/// Lifecycle phase of a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoxPhase {
    /// The box does not take part in play.
    Disabled,
    /// The box is enabled and waits for a color.
    Awaiting,
    /// The box accepts pegs of its color.
    Active(PegColor),
}

/// Immutable representation of a single box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxSnapshot {
    /// Identifier of the box.
    pub id: BoxId,
    /// Current lifecycle phase.
    pub phase: BoxPhase,
    /// Pegs filling the three slots.
    pub slots: [Option<PegId>; BOX_SLOT_COUNT],
    /// Whether the box was opened as a relief box.
    pub relief: bool,
}

impl BoxSnapshot {
    /// Number of filled slots.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Color accepted by the box, if active.
    #[must_use]
    pub fn color(&self) -> Option<PegColor> {
        match self.phase {
            BoxPhase::Active(color) => Some(color),
            _ => None,
        }
    }

    /// Reports whether a peg of the given color can be placed into the box.
    #[must_use]
    pub fn accepts(&self, color: PegColor) -> bool {
        self.color() == Some(color) && self.filled() < BOX_SLOT_COUNT
    }
}

/// Immutable representation of a temporary slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempSlotSnapshot {
    /// Index of the slot.
    pub index: u32,
    /// Peg parked in the slot, if any.
    pub peg: Option<PegId>,
    /// Color of the parked peg, if any.
    pub color: Option<PegColor>,
}

/// Per-color totals of the running level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorTally {
    /// Color being counted.
    pub color: PegColor,
    /// Pegs of this color revealed on the board so far.
    pub spawned: u32,
    /// Pegs of this color removed in completed triples.
    pub eliminated: u32,
}

impl ColorTally {
    /// Creates an empty tally for the color.
    #[must_use]
    pub const fn new(color: PegColor) -> Self {
        Self {
            color,
            spawned: 0,
            eliminated: 0,
        }
    }

    /// Spawned pegs of this color that are still in play.
    #[must_use]
    pub fn outstanding(&self) -> u32 {
        self.spawned.saturating_sub(self.eliminated)
    }
}

/// Progress counters describing a running level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Total pegs configured for the level.
    pub total: u32,
    /// Pegs eliminated in completed triples.
    pub eliminated: u32,
    /// Pegs currently on the board.
    pub on_board: u32,
    /// Pegs parked in temporary slots.
    pub in_temp: u32,
    /// Pegs waiting inside boxes.
    pub in_boxes: u32,
    /// Pegs whose plate has not been revealed yet.
    pub unspawned: u32,
    /// Boxes eliminated so far.
    pub boxes_completed: u32,
    /// Number of lock groups currently on the board.
    pub lock_groups: u32,
    /// Difficulty scalar currently in effect.
    pub difficulty_k_permille: u32,
    /// Terminal outcome, if reached.
    pub outcome: Option<Outcome>,
    /// Spawned and eliminated counts for every palette color.
    pub colors: Vec<ColorTally>,
}

/// Read-only view of the whole session used by renderers and clients.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Board width in cells.
    pub columns: u32,
    /// Board height in cells.
    pub rows: u32,
    /// Every peg of the level in identifier order.
    pub pegs: Vec<PegSnapshot>,
    /// Every box in identifier order.
    pub boxes: Vec<BoxSnapshot>,
    /// Every temporary slot in index order.
    pub temp_slots: Vec<TempSlotSnapshot>,
    /// Progress counters.
    pub progress: ProgressSnapshot,
}

impl SessionSnapshot {
    /// Iterator over the pegs currently on the board.
    pub fn pegs_on_board(&self) -> impl Iterator<Item = &PegSnapshot> {
        self.pegs.iter().filter(|peg| peg.cell().is_some())
    }

    /// Returns the snapshot of the peg with the provided identifier.
    #[must_use]
    pub fn peg(&self, id: PegId) -> Option<&PegSnapshot> {
        self.pegs.get(usize::try_from(id.get()).ok()?)
    }

    /// Number of empty temporary slots.
    #[must_use]
    pub fn free_temp_slots(&self) -> usize {
        self.temp_slots.iter().filter(|slot| slot.peg.is_none()).count()
    }
}
