//! Call-scoped re-entrancy guard
//!
//! Rebuilding a title's seasons fetches raw season data through the same
//! provider accessor the remapper hooks into. The scope value is passed
//! explicitly down every such call so the nested fetch reaches the upstream
//! provider instead of recursing into the remapper, without blocking any
//! unrelated recognition running at the same time.

/// Position of a call inside one recognition chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecognitionScope {
    depth: u8,
}

impl RecognitionScope {
    /// Scope for a call that did not originate from the engine itself
    pub fn root() -> Self {
        Self { depth: 0 }
    }

    /// Scope for a call made from inside the engine
    pub fn nested(self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
        }
    }

    pub fn is_nested(self) -> bool {
        self.depth > 0
    }

    pub fn depth(self) -> u8 {
        self.depth
    }
}
