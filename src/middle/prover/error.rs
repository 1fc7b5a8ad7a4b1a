use colored::Colorize;
use itertools::Itertools;

use crate::{
    frontend::{anchor::Anchor, intern::Symbol},
    middle::{
        prover::builtin::{ArgKind, Builtin},
        qualifier::UniqueId,
        ty::{Type, TypeError},
    },
};

pub type Result<T> = std::result::Result<T, ProveError>;

#[derive(Debug, thiserror::Error)]
pub enum ProveErrorKind {
    #[error("cannot merge {first} with {second} (other edge at {other})")]
    MergeMismatch {
        first: Type,
        second: Type,
        other: Anchor,
    },
    #[error("expected argument {index} to be {expected} but found {actual}")]
    ArgumentTypeMismatch {
        index: usize,
        expected: Type,
        actual: Type,
    },
    #[error("expected {expected} argument(s) but found {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },
    #[error("no parameter named `{0}`")]
    UnknownKeyword(Symbol),
    #[error("parameter `{0}` is given more than once")]
    DuplicateArgument(Symbol),
    #[error("argument {index} of `{builtin}` must be {expected}, found {actual}")]
    InvalidBuiltinArgument {
        builtin: Builtin,
        index: usize,
        expected: ArgKind,
        actual: Type,
    },
    #[error("`{builtin}` takes {} argument(s) but {actual} were given", format_range(*.min, *.max))]
    InvalidBuiltinArgumentCount {
        builtin: Builtin,
        min: usize,
        max: Option<usize>,
        actual: usize,
    },
    #[error("value {id} used after it was moved (moved at {moved_at})")]
    UseAfterMove { id: UniqueId, moved_at: Anchor },
    #[error("value {id} is not alive here")]
    NotAlive { id: UniqueId },
    #[error("view of {id} escapes the scope the value lives in")]
    ViewEscapesScope { id: UniqueId },
    #[error("cannot move a view of type {0}")]
    CannotMoveView(Type),
    #[error("cannot move {id} while a loop argument views it")]
    LoopViewMoved { id: UniqueId },
    #[error("loop iteration invalidates {id}, which was alive when the loop was entered")]
    LoopInvalidatesOuterValue { id: UniqueId },
    #[error("pass case moves {id}, which the following case still requires")]
    PassCaseMovesValue { id: UniqueId },
    #[error("loop argument types did not settle after {0} attempts")]
    LoopDidNotConverge(u32),
    #[error("specialization of `{name}` exceeded the maximum recursion depth of {limit}")]
    RecursionOverflow { name: Symbol, limit: u32 },
    #[error("recursive use of `{name}` relied on signature {published}, but its final signature is {actual}")]
    InconsistentRecursiveSignature {
        name: Symbol,
        published: Type,
        actual: Type,
    },
    #[error("`{0}` is called recursively before any of its return types are known")]
    UntypedRecursiveCall(Symbol),
    #[error("`{0}` was declared but never defined")]
    ForwardDeclaration(Symbol),
    #[error("values of type {0} cannot be called")]
    NotCallable(Type),
    #[error("unbound symbol `{0}`")]
    UnboundSymbol(Symbol),
    #[error("parameter `{0}` is not bound in this context")]
    UnboundParameter(Symbol),
    #[error("`{0}` captures a runtime value of another function")]
    CapturedRuntimeValue(Symbol),
    #[error("no enclosing template for the scope of `{0}`")]
    MissingClosureFrame(Symbol),
    #[error("merge outside of its label")]
    MergeOutsideLabel,
    #[error("`{0}` outside of a loop")]
    OutsideLoop(Builtin),
    #[error("loop arguments used outside of their loop")]
    LoopArgumentsOutsideLoop,
    #[error("cannot return from inside an inline expansion")]
    ReturnInInline,
    #[error("this expression never returns, but is not the last one")]
    NoReturnNotLast,
    #[error("condition must be bool, found {0}")]
    NonBoolCondition(Type),
    #[error("switch expression must be an integer, found {0}")]
    NonIntegerSwitch(Type),
    #[error("expected a constant {0}")]
    ExpectedConstant(&'static str),
    #[error("argument index {index} is out of range for {ty}")]
    ArgumentIndexOutOfRange { index: usize, ty: Type },
    #[error("node is reserved but was never filled in")]
    UnfinishedNode,
    #[error("callee is not a template")]
    NotATemplate,
    #[error(transparent)]
    Type(#[from] TypeError),
}

fn format_range(min: usize, max: Option<usize>) -> String {
    match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    }
}

/// One step of the specialization stack that led to an error
#[derive(Debug, Clone)]
pub enum TraceFrame {
    Specialize {
        name: Symbol,
        args: Vec<Type>,
        anchor: Anchor,
    },
    Inline {
        name: Symbol,
        anchor: Anchor,
    },
}

impl core::fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceFrame::Specialize { name, args, anchor } => write!(
                f,
                "while specializing `{name}` for ({}) {}",
                args.iter().join(" "),
                format!("(at {anchor})").white()
            ),
            TraceFrame::Inline { name, anchor } => write!(
                f,
                "while expanding inline `{name}` {}",
                format!("(at {anchor})").white()
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ProveError {
    pub kind: ProveErrorKind,
    pub anchor: Anchor,
    pub trace: Vec<TraceFrame>,
}

impl ProveError {
    pub fn new(kind: ProveErrorKind, anchor: Anchor) -> Self {
        Self {
            kind,
            anchor,
            trace: vec![],
        }
    }

    pub fn with_trace(mut self, frame: TraceFrame) -> Self {
        self.trace.push(frame);
        self
    }

    /// Renders the diagnostic with the specialization stack, innermost frame
    /// first
    pub fn report(&self) -> String {
        let mut out = format!(
            "{}: {} {}",
            "error".red(),
            self.kind,
            format!("(at {})", self.anchor).white()
        );

        for frame in &self.trace {
            out.push('\n');
            out.push_str(&format!("{}: {frame}", "note".cyan()));
        }

        out
    }
}

/// Shorthand for returning an error from a prover routine
pub(crate) fn fail<T>(kind: ProveErrorKind, anchor: Anchor) -> Result<T> {
    Err(ProveError::new(kind, anchor))
}

/// Attaches a source location to errors coming from the type layer
pub(crate) trait WithAnchor<T> {
    fn at(self, anchor: Anchor) -> Result<T>;
}

impl<T> WithAnchor<T> for std::result::Result<T, TypeError> {
    fn at(self, anchor: Anchor) -> Result<T> {
        self.map_err(|error| ProveError::new(error.into(), anchor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ty::TypeContext;

    #[test]
    fn report_includes_anchor_and_trace() {
        let mut types = TypeContext::new();
        let i32 = types.int(32);

        let error = ProveError::new(
            ProveErrorKind::UseAfterMove {
                id: UniqueId::new(3),
                moved_at: Anchor::new("main.sc", 2, 5),
            },
            Anchor::new("main.sc", 4, 1),
        )
        .with_trace(TraceFrame::Specialize {
            name: "consume".into(),
            args: vec![i32],
            anchor: Anchor::new("main.sc", 10, 3),
        });

        let report = strip_ansi_escapes::strip_str(error.report());

        assert_eq!(
            report,
            indoc::indoc! {"
                error: value 3 used after it was moved (moved at main.sc:2:5) (at main.sc:4:1)
                note: while specializing `consume` for (i32) (at main.sc:10:3)"}
        );
    }

    #[test]
    fn builtin_count_ranges() {
        assert_eq!(format_range(2, Some(2)), "2");
        assert_eq!(format_range(1, Some(3)), "1 to 3");
        assert_eq!(format_range(1, None), "at least 1");
    }
}
