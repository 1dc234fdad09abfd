use serde::{Deserialize, Serialize};

/// Byte-offset span into the program source a scenario carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Placeholder for nodes built without source text (tests, synthesized expressions).
    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clamp to a source of `len` bytes so diagnostics never index past the end.
    pub fn clamp(self, len: usize) -> Span {
        let start = self.start.min(len);
        Span::new(start, self.end.clamp(start, len))
    }
}

impl From<[usize; 2]> for Span {
    fn from(pair: [usize; 2]) -> Self {
        Span::new(pair[0], pair[1])
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
