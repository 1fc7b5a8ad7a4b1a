use super::intern::Symbol;

/// A location in a source file, as recorded by the parser on every node it
/// produces. Line and column are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub file: Symbol,
    pub line: u32,
    pub column: u32,
}

impl Anchor {
    pub fn new(file: impl Into<Symbol>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Used for values synthesized by the prover which have no better origin
    pub fn builtin() -> Self {
        Self::new("<builtin>", 0, 0)
    }
}

impl core::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
