use bytes::Bytes;

/// Fixed slots holding the last-sent frame for each in-window sequence number.
///
/// Slot `seq % capacity` belongs to `seq` while `seq` is inside the window. A
/// slot is not cleared when the window slides past it, only overwritten when
/// its index is reused, so callers must only read sequence numbers they know
/// are outstanding.
#[derive(Debug, Clone)]
pub struct UnackedRing {
    slots: Box<[Option<Bytes>]>,
}

impl UnackedRing {
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0);
        Self {
            slots: (0..capacity)
                .map(|_| None)
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, seq_num: u32) -> usize {
        seq_num as usize % self.slots.len()
    }

    /// Store `frame` for `seq_num`, returning whatever the slot held before.
    pub fn store(&mut self, seq_num: u32, frame: Bytes) -> Option<Bytes> {
        let index = self.index(seq_num);
        self.slots[index].replace(frame)
    }

    pub fn get(&self, seq_num: u32) -> Option<&Bytes> {
        self.slots[self.index(seq_num)].as_ref()
    }
}
