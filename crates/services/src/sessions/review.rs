/// Read-only cursor over ledger indices.
///
/// The cursor is clamped to `[0, len - 1]` and never touches live session
/// state; the controller owns it only while reviewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewNavigator {
    index: usize,
    len: usize,
}

impl ReviewNavigator {
    /// Cursor over `len` records, starting at the most recent one.
    ///
    /// Returns `None` when there is nothing to review.
    #[must_use]
    pub fn new(len: usize) -> Option<Self> {
        (len > 0).then(|| Self {
            index: len - 1,
            len,
        })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.len
    }

    /// Step forward, saturating at the last record.
    pub fn next(&mut self) -> usize {
        if !self.is_last() {
            self.index += 1;
        }
        self.index
    }

    /// Step back, saturating at the first record.
    pub fn prev(&mut self) -> usize {
        self.index = self.index.saturating_sub(1);
        self.index
    }

    /// Move to `index`, clamped into range.
    pub fn jump(&mut self, index: usize) -> usize {
        self.index = index.min(self.len.saturating_sub(1));
        self.index
    }
}
