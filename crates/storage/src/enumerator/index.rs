//! Open-addressing hash index from value hash to candidate ids.

/// Hash value marking an empty slot.
const EMPTY: u32 = 0;

/// Stand-in for values whose hash is [`EMPTY`].
const ZERO_HASH_REPLACEMENT: u32 = 0x9E37_79B9;

const INITIAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    hash: u32,
    id: u32,
}

/// Maps a 32-bit hash to every id stored under it.
///
/// Several ids may share a hash; lookups return all of them and the caller
/// compares the stored bytes. The table uses linear probing and doubles once
/// it is half full.
#[derive(Debug)]
pub(super) struct HashIndex {
    slots: Vec<Slot>,
    len: usize,
}

impl HashIndex {
    pub(super) fn new() -> Self {
        Self { slots: vec![Slot::default(); INITIAL_CAPACITY], len: 0 }
    }

    /// Maps a raw hash to the one stored in the table.
    pub(super) const fn normalize(hash: u32) -> u32 {
        if hash == EMPTY { ZERO_HASH_REPLACEMENT } else { hash }
    }

    const fn mask(&self) -> usize { self.slots.len() - 1 }

    /// Returns the ids stored under the normalized `hash`.
    pub(super) fn candidates(&self, hash: u32) -> Vec<u32> {
        let mut found = Vec::new();
        let mut pos = hash as usize & self.mask();

        loop {
            let slot = self.slots[pos];

            if slot.hash == EMPTY {
                return found;
            }

            if slot.hash == hash {
                found.push(slot.id);
            }

            pos = (pos + 1) & self.mask();
        }
    }

    /// Records `id` under the normalized `hash`.
    pub(super) fn insert(&mut self, hash: u32, id: u32) {
        debug_assert_ne!(hash, EMPTY);

        if (self.len + 1) * 2 > self.slots.len() {
            self.grow();
        }

        Self::place(&mut self.slots, Slot { hash, id });
        self.len += 1;
    }

    fn grow(&mut self) {
        let mut slots = vec![Slot::default(); self.slots.len() * 2];

        for slot in self.slots.iter().filter(|slot| slot.hash != EMPTY) {
            Self::place(&mut slots, *slot);
        }

        self.slots = slots;
    }

    fn place(slots: &mut [Slot], slot: Slot) {
        let mask = slots.len() - 1;
        let mut pos = slot.hash as usize & mask;

        while slots[pos].hash != EMPTY {
            pos = (pos + 1) & mask;
        }

        slots[pos] = slot;
    }
}
