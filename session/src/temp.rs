use screw_unlock_core::PegId;

/// Growable row of holding positions for pegs waiting for a matching box.
#[derive(Clone, Debug, Default)]
pub(crate) struct TempSlots {
    slots: Vec<Option<PegId>>,
}

impl TempSlots {
    pub(crate) fn with_capacity(capacity: u32) -> Self {
        Self {
            slots: vec![None; usize::try_from(capacity).unwrap_or(0)],
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn grow(&mut self) -> u32 {
        self.slots.push(None);
        self.capacity()
    }

    pub(crate) fn occupied(&self) -> u32 {
        u32::try_from(self.slots.iter().flatten().count()).unwrap_or(u32::MAX)
    }

    pub(crate) fn first_free(&self) -> Option<u32> {
        self.slots
            .iter()
            .position(Option::is_none)
            .and_then(|index| u32::try_from(index).ok())
    }

    pub(crate) fn park(&mut self, index: u32, peg: PegId) {
        if let Some(slot) = usize::try_from(index).ok().and_then(|i| self.slots.get_mut(i)) {
            *slot = Some(peg);
        }
    }

    pub(crate) fn take(&mut self, index: u32) -> Option<PegId> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take)
    }

    /// Parked pegs with their slot index, in slot order.
    pub(crate) fn parked(&self) -> impl Iterator<Item = (u32, PegId)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let peg = (*slot)?;
            Some((u32::try_from(index).ok()?, peg))
        })
    }

    pub(crate) fn slots(&self) -> &[Option<PegId>] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parking_fills_the_first_free_slot() {
        let mut slots = TempSlots::with_capacity(2);
        assert_eq!(slots.first_free(), Some(0));
        slots.park(0, PegId::new(4));
        assert_eq!(slots.first_free(), Some(1));
        slots.park(1, PegId::new(5));
        assert_eq!(slots.first_free(), None);

        assert_eq!(slots.take(0), Some(PegId::new(4)));
        assert_eq!(slots.first_free(), Some(0));
        assert_eq!(slots.grow(), 3);
        assert_eq!(slots.occupied(), 1);
        assert_eq!(slots.parked().collect::<Vec<_>>(), vec![(1, PegId::new(5))]);
    }
}
