use drill_core::model::ProblemRecord;

/// Append-only log of resolved problems, in resolution order.
///
/// Records are handed out by shared reference only; there is no way to
/// change or remove one after `append`.
#[derive(Debug, Clone)]
pub struct SessionLedger<P> {
    records: Vec<ProblemRecord<P>>,
}

impl<P> Default for SessionLedger<P> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<P> SessionLedger<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its index.
    pub(crate) fn append(&mut self, record: ProblemRecord<P>) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn at(&self, index: usize) -> Option<&ProblemRecord<P>> {
        self.records.get(index)
    }

    #[must_use]
    pub fn last(&self) -> Option<&ProblemRecord<P>> {
        self.records.last()
    }

    #[must_use]
    pub fn records(&self) -> &[ProblemRecord<P>] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProblemRecord<P>> {
        self.records.iter()
    }
}
