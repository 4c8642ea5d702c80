//! Visible-window derivation over a message log.

/// Bounded view over the tail of an append-only log.
///
/// The lower bound is an index anchored to the log and only ever moves
/// backward (toward older entries) via [`grow`](Self::grow); the upper
/// bound is implicitly the log tail. Live appends therefore show up at
/// the bottom immediately, without disturbing how far back the reader
/// has scrolled.
#[derive(Debug, Clone)]
pub struct MessageWindow {
    oldest: usize,
    page_size: usize,
}

impl MessageWindow {
    pub fn new(page_size: usize) -> Self {
        Self {
            oldest: 0,
            page_size: page_size.max(1),
        }
    }

    /// Anchor at the most recent page of a freshly loaded log, so a
    /// joined conversation opens at its tail.
    pub fn reset(&mut self, log_len: usize) {
        self.oldest = log_len.saturating_sub(self.page_size);
    }

    /// Reveal one more page of older entries. Returns whether the window
    /// actually grew; at the top of the log this is a no-op.
    pub fn grow(&mut self) -> bool {
        if self.oldest == 0 {
            return false;
        }
        self.oldest = self.oldest.saturating_sub(self.page_size);
        true
    }

    /// Whether older entries remain hidden above the window.
    pub fn has_older(&self) -> bool {
        self.oldest > 0
    }

    /// The visible slice of `entries`, oldest first.
    pub fn slice<'a, T>(&self, entries: &'a [T]) -> &'a [T] {
        &entries[self.oldest.min(entries.len())..]
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
