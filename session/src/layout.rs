//! Level structure: regions, components, plates, and the board they occupy.

use log::warn;
use rand::Rng;
use screw_unlock_core::{
    CellCoord, CellRect, CellRectSize, ComponentCatalog, ComponentId, CountRange, PegId, RegionId,
    RegionLayout, SizeClass, SizeClassSpec,
};

use crate::ConfigurationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ComponentState {
    Unspawned,
    Active,
    Complete,
    Skipped,
}

#[derive(Clone, Debug)]
pub(crate) struct Component {
    pub(crate) id: ComponentId,
    pub(crate) size_class: SizeClass,
    pub(crate) region: usize,
    pub(crate) plates: Vec<Vec<PegId>>,
    pub(crate) area: Option<CellRect>,
    pub(crate) active_plate: usize,
    pub(crate) state: ComponentState,
}

impl Component {
    pub(crate) fn largest_plate(&self) -> usize {
        self.plates.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub(crate) fn plate_count(&self) -> u32 {
        u32::try_from(self.plates.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Region {
    pub(crate) id: RegionId,
    pub(crate) bounds: CellRect,
    pub(crate) components: Vec<usize>,
    pub(crate) complete: bool,
}

/// Peg placeholder produced by level generation, ordered by identifier.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PegSeed {
    pub(crate) component: ComponentId,
    pub(crate) plate: u32,
}

#[derive(Debug)]
pub(crate) struct LevelData {
    pub(crate) regions: Vec<Region>,
    pub(crate) components: Vec<Component>,
    pub(crate) pegs: Vec<PegSeed>,
}

/// Splits the peg budget into components and deals them round-robin across regions.
pub(crate) fn generate_level_data<R>(
    total_pegs: u32,
    catalog: &ComponentCatalog,
    region_bounds: Vec<CellRect>,
    rng: &mut R,
) -> Result<LevelData, ConfigurationError>
where
    R: Rng + ?Sized,
{
    let mut builder = LevelBuilder {
        remaining: total_pegs,
        components: Vec::new(),
        pegs: Vec::new(),
    };

    for _ in 0..sample(catalog.large.count, rng) {
        if builder.remaining == 0 {
            break;
        }
        let _ = builder.create(SizeClass::Large, &catalog.large, rng);
    }
    for _ in 0..sample(catalog.medium.count, rng) {
        if builder.remaining == 0 {
            break;
        }
        let _ = builder.create(SizeClass::Medium, &catalog.medium, rng);
    }
    while builder.remaining > 0 {
        if !builder.create(SizeClass::Small, &catalog.small, rng) {
            break;
        }
    }

    if builder.remaining > 0 {
        return Err(ConfigurationError::UnallocatedPegs {
            remaining: builder.remaining,
        });
    }

    let mut regions: Vec<Region> = region_bounds
        .into_iter()
        .enumerate()
        .map(|(index, bounds)| Region {
            id: RegionId::new(u32::try_from(index).unwrap_or(u32::MAX)),
            bounds,
            components: Vec::new(),
            complete: false,
        })
        .collect();
    let region_count = regions.len().max(1);
    for (index, component) in builder.components.iter_mut().enumerate() {
        component.region = index % region_count;
        if let Some(region) = regions.get_mut(component.region) {
            region.components.push(index);
        }
    }

    Ok(LevelData {
        regions,
        components: builder.components,
        pegs: builder.pegs,
    })
}

struct LevelBuilder {
    remaining: u32,
    components: Vec<Component>,
    pegs: Vec<PegSeed>,
}

impl LevelBuilder {
    fn create<R>(&mut self, size_class: SizeClass, spec: &SizeClassSpec, rng: &mut R) -> bool
    where
        R: Rng + ?Sized,
    {
        let id = ComponentId::new(u32::try_from(self.components.len()).unwrap_or(u32::MAX));
        let mut plates: Vec<Vec<PegId>> = Vec::new();

        for _ in 0..sample(spec.layers, rng) {
            let wanted = sample(spec.pegs_per_layer, rng);
            let mut plate = Vec::new();
            for _ in 0..wanted {
                if self.remaining == 0 {
                    break;
                }
                let peg = PegId::new(u32::try_from(self.pegs.len()).unwrap_or(u32::MAX));
                self.pegs.push(PegSeed {
                    component: id,
                    plate: u32::try_from(plates.len()).unwrap_or(u32::MAX),
                });
                plate.push(peg);
                self.remaining -= 1;
            }
            if !plate.is_empty() {
                plates.push(plate);
            }
        }

        if plates.is_empty() {
            return false;
        }
        self.components.push(Component {
            id,
            size_class,
            region: 0,
            plates,
            area: None,
            active_plate: 0,
            state: ComponentState::Unspawned,
        });
        true
    }
}

fn sample<R>(range: CountRange, rng: &mut R) -> u32
where
    R: Rng + ?Sized,
{
    if range.max <= range.min {
        range.min
    } else {
        rng.gen_range(range.min..=range.max)
    }
}

/// Row bands or whole-board rectangles describing where each region searches for space.
pub(crate) fn region_bounds(layout: RegionLayout, count: u32, columns: u32, rows: u32) -> Vec<CellRect> {
    let whole = CellRect::from_origin_and_size(CellCoord::new(0, 0), CellRectSize::new(columns, rows));
    match layout {
        RegionLayout::Shared => (0..count).map(|_| whole).collect(),
        RegionLayout::Bands => {
            let band = rows / count.max(1);
            (0..count)
                .map(|index| {
                    let top = index * band;
                    let height = if index + 1 == count { rows - top } else { band };
                    CellRect::from_origin_and_size(
                        CellCoord::new(0, top),
                        CellRectSize::new(columns, height),
                    )
                })
                .collect()
        }
    }
}

/// Dense occupancy of the board: which peg sits on a cell and which component owns it.
#[derive(Clone, Debug)]
pub(crate) struct Board {
    columns: u32,
    rows: u32,
    pegs: Vec<Option<PegId>>,
    owners: Vec<Option<ComponentId>>,
}

impl Board {
    pub(crate) fn new(columns: u32, rows: u32) -> Self {
        let capacity_u64 = u64::from(columns) * u64::from(rows);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            columns,
            rows,
            pegs: vec![None; capacity],
            owners: vec![None; capacity],
        }
    }

    pub(crate) fn occupy(&mut self, peg: PegId, cell: CellCoord) {
        if let Some(index) = self.index(cell) {
            if let Some(slot) = self.pegs.get_mut(index) {
                *slot = Some(peg);
            }
        }
    }

    pub(crate) fn vacate(&mut self, cell: CellCoord) {
        if let Some(index) = self.index(cell) {
            if let Some(slot) = self.pegs.get_mut(index) {
                *slot = None;
            }
        }
    }

    /// Claims every unowned cell of the rectangle for the component.
    pub(crate) fn reserve(&mut self, area: CellRect, component: ComponentId) {
        for cell in area.cells() {
            if let Some(index) = self.index(cell) {
                if self.owners[index].is_none() {
                    self.owners[index] = Some(component);
                }
            }
        }
    }

    pub(crate) fn release(&mut self, component: ComponentId) {
        for owner in self.owners.iter_mut() {
            if *owner == Some(component) {
                *owner = None;
            }
        }
    }

    /// Cells of the component's area that it owns and that hold no peg, in row-major order.
    pub(crate) fn free_cells(&self, area: CellRect, component: ComponentId) -> Vec<CellCoord> {
        area.cells()
            .filter(|cell| {
                self.index(*cell).map_or(false, |index| {
                    self.owners[index] == Some(component) && self.pegs[index].is_none()
                })
            })
            .collect()
    }

    /// Searches the bounds for an unowned rectangle of the footprint, falling back to any
    /// clamped rectangle with at least `needed` unowned cells.
    pub(crate) fn find_area<R>(
        &self,
        bounds: CellRect,
        footprint: CellRectSize,
        needed: usize,
        rng: &mut R,
    ) -> Option<CellRect>
    where
        R: Rng + ?Sized,
    {
        let bounds_size = bounds.size();
        if footprint.width() <= bounds_size.width() && footprint.height() <= bounds_size.height() {
            let across = bounds_size.width() - footprint.width() + 1;
            let down = bounds_size.height() - footprint.height() + 1;
            let anchors = across * down;
            let start = rng.gen_range(0..anchors);
            for offset in 0..anchors {
                let slot = (start + offset) % anchors;
                let origin = CellCoord::new(
                    bounds.origin().column() + slot % across,
                    bounds.origin().row() + slot / across,
                );
                let area = CellRect::from_origin_and_size(origin, footprint);
                if self.is_unowned(area) {
                    return Some(area);
                }
            }
        }

        let anchors = self.columns * self.rows;
        if anchors == 0 {
            return None;
        }
        let start = rng.gen_range(0..anchors);
        for offset in 0..anchors {
            let slot = (start + offset) % anchors;
            let origin = CellCoord::new(slot % self.columns, slot / self.columns);
            let clamped = CellRectSize::new(
                footprint.width().min(self.columns - origin.column()),
                footprint.height().min(self.rows - origin.row()),
            );
            let area = CellRect::from_origin_and_size(origin, clamped);
            if self.unowned_cells(area) >= needed {
                warn!(
                    "placing footprint {}x{} at ({}, {}) with emergency fallback",
                    footprint.width(),
                    footprint.height(),
                    origin.column(),
                    origin.row()
                );
                return Some(area);
            }
        }
        None
    }

    fn is_unowned(&self, area: CellRect) -> bool {
        area.cells().all(|cell| {
            self.index(cell)
                .map_or(false, |index| self.owners[index].is_none())
        })
    }

    fn unowned_cells(&self, area: CellRect) -> usize {
        area.cells()
            .filter(|cell| {
                self.index(*cell)
                    .map_or(false, |index| self.owners[index].is_none())
            })
            .count()
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() < self.columns && cell.row() < self.rows {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }
}
