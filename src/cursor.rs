//! Restartable index cursor shared by duct windows and lineage traversals.
//!
//! Positions may step outside `[0, len)`; reads there yield nothing, the same
//! way an iterator one-before-begin or one-past-end does.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCursor {
    pos: isize,
    len: usize,
}

impl IndexCursor {
    pub fn new(len: usize) -> Self {
        Self { pos: 0, len }
    }

    pub fn position(&self) -> isize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index into the backing sequence, if in bounds.
    pub fn index(&self) -> Option<usize> {
        if self.pos >= 0 && (self.pos as usize) < self.len {
            Some(self.pos as usize)
        } else {
            None
        }
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    pub fn retreat(&mut self) {
        self.pos -= 1;
    }

    /// A copy shifted by `k` (negative moves backward).
    pub fn offset(&self, k: isize) -> Self {
        Self { pos: self.pos + k, len: self.len }
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Elements left from the current position to the end.
    pub fn remaining(&self) -> usize {
        if self.pos < 0 {
            self.len
        } else {
            self.len.saturating_sub(self.pos as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_arithmetic() {
        let c = IndexCursor::new(5);
        assert_eq!(c.offset(3).index(), Some(3));
        assert_eq!(c.offset(3).offset(-2).index(), Some(1));
        assert_eq!(c.offset(5).index(), None);
        assert_eq!(c.offset(-1).index(), None);
    }

    #[test]
    fn test_step_out_and_back() {
        let mut c = IndexCursor::new(2);
        c.retreat();
        assert_eq!(c.index(), None);
        c.advance();
        assert_eq!(c.index(), Some(0));
        c.advance();
        c.advance();
        assert_eq!(c.index(), None);
        assert_eq!(c.remaining(), 0);
        c.rewind();
        assert_eq!(c.remaining(), 2);
    }
}
