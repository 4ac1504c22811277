/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub flagged: usize,
    pub remaining: usize,
    /// Zero-based position of the current question.
    pub index: usize,
    pub is_complete: bool,
}

impl SessionProgress {
    /// One-based position for display, e.g. "3 / 10".
    #[must_use]
    pub fn position(&self) -> usize {
        (self.index + 1).min(self.total)
    }
}
