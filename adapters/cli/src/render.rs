//! Plain-text rendering of a session snapshot.

use std::fmt::Write as _;

use screw_unlock_core::{BoxPhase, PegColor, SessionSnapshot, BOX_SLOT_COUNT};

const EMPTY_CELL: char = '.';

/// Glyph drawn for a peg: the palette index, or a letter when the peg is locked.
fn peg_glyph(color: Option<PegColor>, locked: bool) -> char {
    let Some(color) = color else {
        return '?';
    };
    let index = color.index();
    if locked {
        char::from(b'a'.saturating_add(index))
    } else {
        char::from_digit(u32::from(index), 36).unwrap_or('?')
    }
}

/// Draws the board grid followed by the box row, the temporary slots, and progress.
pub(crate) fn render(snapshot: &SessionSnapshot) -> String {
    let columns = usize::try_from(snapshot.columns).unwrap_or(0);
    let rows = usize::try_from(snapshot.rows).unwrap_or(0);
    let mut grid = vec![vec![EMPTY_CELL; columns]; rows];

    for peg in snapshot.pegs_on_board() {
        let Some(cell) = peg.cell() else {
            continue;
        };
        let (Ok(column), Ok(row)) = (usize::try_from(cell.column()), usize::try_from(cell.row()))
        else {
            continue;
        };
        if let Some(slot) = grid.get_mut(row).and_then(|line| line.get_mut(column)) {
            *slot = peg_glyph(peg.color, peg.locked);
        }
    }

    let mut out = String::new();
    for line in grid {
        out.extend(line);
        out.push('\n');
    }

    out.push_str("boxes:");
    for color_box in &snapshot.boxes {
        let _ = match color_box.phase {
            BoxPhase::Disabled => write!(out, " [off]"),
            BoxPhase::Awaiting => write!(out, " [---]"),
            BoxPhase::Active(color) => write!(
                out,
                " [{} {}/{}]",
                color.name(),
                color_box.filled(),
                BOX_SLOT_COUNT
            ),
        };
    }
    out.push('\n');

    out.push_str("slots:");
    for slot in &snapshot.temp_slots {
        let _ = match slot.color {
            Some(color) => write!(out, " [{}]", color.name()),
            None => write!(out, " [ ]"),
        };
    }
    out.push('\n');

    let progress = &snapshot.progress;
    let _ = writeln!(
        out,
        "eliminated {}/{}  on board {}  hidden {}  lock groups {}  k {:.3}",
        progress.eliminated,
        progress.total,
        progress.on_board,
        progress.unspawned,
        progress.lock_groups,
        f64::from(progress.difficulty_k_permille) / 1000.0
    );

    // Pegs still in play over pegs revealed, per color.
    out.push_str("colors:");
    for tally in &progress.colors {
        let _ = write!(out, " {} {}/{}", tally.color.name(), tally.outstanding(), tally.spawned);
    }
    out.push('\n');
    out
}
