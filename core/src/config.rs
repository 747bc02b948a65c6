//! Level configuration surface shared by the session, systems, and adapters.

use serde::{Deserialize, Serialize};

use crate::CellRectSize;

/// Complete description of a level.
///
/// Every field has a default matching the reference tuning, so configuration
/// files only need to name the values they change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Number of board rows.
    pub rows: u32,
    /// Number of board columns.
    pub columns: u32,
    /// Total number of pegs the level contains.
    pub total_pegs: u32,
    /// Number of palette colors in play.
    pub color_count: u32,
    /// The scheduler keeps at least this many pegs on the board while content remains.
    pub min_onboard_pegs: u32,
    /// Initial number of temporary slots.
    pub temp_slot_count: u32,
    /// Number of boxes in the box row.
    pub box_count: u32,
    /// Number of boxes enabled when the level starts; the rest start disabled.
    pub enabled_boxes: u32,
    /// Number of regions components are distributed across.
    pub region_count: u32,
    /// Whether regions own a band of rows or share the whole board.
    pub region_layout: RegionLayout,
    /// Generators for each component size class.
    pub components: ComponentCatalog,
    /// Limits applied to the lock graph.
    pub locks: LockLimits,
    /// Shape of the difficulty curve.
    pub difficulty: DifficultyProfile,
    /// Which counter drives the difficulty curve.
    pub progress_measure: ProgressMeasure,
    /// Color allocation switches to end-game mode once fewer pegs remain.
    pub end_game_threshold: u32,
    /// Delay between a box filling up and its elimination, in milliseconds.
    pub elimination_delay_ms: u64,
    /// Seed for every random decision taken by the session.
    pub seed: u64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            rows: 36,
            columns: 20,
            total_pegs: 150,
            color_count: 7,
            min_onboard_pegs: 15,
            temp_slot_count: 5,
            box_count: 4,
            enabled_boxes: 2,
            region_count: 3,
            region_layout: RegionLayout::Bands,
            components: ComponentCatalog::default(),
            locks: LockLimits::default(),
            difficulty: DifficultyProfile::default(),
            progress_measure: ProgressMeasure::Eliminated,
            end_game_threshold: 15,
            elimination_delay_ms: 0,
            seed: 0x5c2e_77a1_90d3_4b6f,
        }
    }
}

/// Placement policy for regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLayout {
    /// Every region searches the whole board for free space.
    Shared,
    /// Each region owns an equal band of rows.
    Bands,
}

/// Counter used as the input of the difficulty curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMeasure {
    /// Eliminated pegs divided by the total.
    Eliminated,
    /// Revealed pegs divided by the total.
    Spawned,
}

/// Inclusive range of counts sampled uniformly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountRange {
    /// Smallest value the range yields.
    pub min: u32,
    /// Largest value the range yields.
    pub max: u32,
}

impl CountRange {
    /// Creates an inclusive range.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Creates a range yielding a single value.
    #[must_use]
    pub const fn exactly(value: u32) -> Self {
        Self::new(value, value)
    }
}

/// Generator describing one component size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeClassSpec {
    /// How many components of the class are generated. Ignored for the small class.
    pub count: CountRange,
    /// Number of plates per component.
    pub layers: CountRange,
    /// Number of pegs per plate.
    pub pegs_per_layer: CountRange,
    /// Cells reserved on the board while the component is spawned.
    pub footprint: CellRectSize,
}

/// Generators for the three component size classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentCatalog {
    /// One large component anchors the level.
    pub large: SizeClassSpec,
    /// A handful of medium components follow.
    pub medium: SizeClassSpec,
    /// Small components absorb the remaining budget.
    pub small: SizeClassSpec,
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self {
            large: SizeClassSpec {
                count: CountRange::exactly(1),
                layers: CountRange::new(4, 7),
                pegs_per_layer: CountRange::new(5, 9),
                footprint: CellRectSize::new(7, 7),
            },
            medium: SizeClassSpec {
                count: CountRange::new(3, 6),
                layers: CountRange::new(2, 4),
                pegs_per_layer: CountRange::new(2, 5),
                footprint: CellRectSize::new(4, 4),
            },
            small: SizeClassSpec {
                count: CountRange::exactly(0),
                layers: CountRange::new(1, 2),
                pegs_per_layer: CountRange::exactly(1),
                footprint: CellRectSize::new(2, 2),
            },
        }
    }
}

/// Limits bounding the shape of the lock graph.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockLimits {
    /// Longest permitted chain of pegs, the locked peg included.
    pub max_chain_length: u32,
    /// Largest Manhattan distance between a controller and the peg it locks.
    pub max_lock_distance: u32,
    /// Largest number of controllers holding a single peg.
    pub max_controllers: u32,
    /// Largest number of concurrent lock groups; unlimited when absent.
    pub max_lock_groups: Option<u32>,
    /// Lower bound on the lock probability of fresh pegs whose color a non-full box is waiting for.
    pub needy_lock_probability: f32,
}

impl Default for LockLimits {
    fn default() -> Self {
        Self {
            max_chain_length: 5,
            max_lock_distance: 12,
            max_controllers: 4,
            max_lock_groups: None,
            needy_lock_probability: 0.5,
        }
    }
}

/// One step of a staged difficulty curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyStage {
    /// Progress (0..=1) at which the stage ends; the last stage covers the rest.
    pub until: f32,
    /// Difficulty scalar in 0..=1.
    pub k: f32,
    /// Probability that a freshly revealed peg gets locked.
    pub lock_probability_factor: f32,
    /// Expected number of controllers attached to each locked peg.
    pub connection_multiplier: f32,
}

/// Shape of the difficulty curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyProfile {
    /// `k = floor + progress³ · (ceiling − floor)`.
    Cubic {
        /// Difficulty at the start of the level.
        floor: f32,
        /// Difficulty at the end of the level.
        ceiling: f32,
    },
    /// Step function over progress thresholds.
    Stages {
        /// Stages ordered by their `until` threshold.
        stages: Vec<DifficultyStage>,
    },
    /// Sampled curve indexed by progress.
    Table {
        /// Difficulty values ordered by progress.
        values: Vec<f32>,
    },
    /// Monotone spline through `[progress, k]` control points.
    Spline {
        /// Control points ordered by progress.
        points: Vec<[f32; 2]>,
    },
}

impl Default for DifficultyProfile {
    fn default() -> Self {
        Self::Cubic {
            floor: 0.1,
            ceiling: 1.0,
        }
    }
}
