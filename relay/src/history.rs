//! Snapshot history backing the time-travel operations.
use crate::Snapshot;

/// Recorded snapshots with a cursor.
///
/// Index 0 is the snapshot taken when the machine started; every later
/// entry corresponds to a step that changed the configuration or the
/// context. The cursor marks the snapshot the machine currently reflects.
#[derive(Debug, Default)]
pub(crate) struct History {
    snapshots: Vec<Snapshot>,
    cursor: usize,
}

impl History {
    /// Appends a snapshot and moves the cursor onto it.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
        self.cursor = self.snapshots.len() - 1;
    }

    /// Moves the cursor back by at most `n` and returns the snapshot there.
    pub fn rewind(&mut self, n: usize) -> &Snapshot {
        self.cursor -= n.min(self.cursor);
        &self.snapshots[self.cursor]
    }

    /// Moves the cursor forward by at most `n` and returns the snapshot
    /// there.
    pub fn forward(&mut self, n: usize) -> &Snapshot {
        let room = self.snapshots.len() - 1 - self.cursor;
        self.cursor += n.min(room);
        &self.snapshots[self.cursor]
    }

    /// True when the cursor sits on the most recent snapshot.
    pub fn at_tail(&self) -> bool {
        self.cursor + 1 == self.snapshots.len()
    }

    /// Discards every snapshot strictly after the cursor. A send while
    /// rewound branches off here.
    pub fn truncate_to_cursor(&mut self) {
        self.snapshots.truncate(self.cursor + 1);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
