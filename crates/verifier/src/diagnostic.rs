use std::fmt;

use toccata_cfg::{Block, Loop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    InvalidBlockRef,
    InvalidLoopRef,
    EdgeNotSymmetric,
    ForwardEdgeDecreasesId,
    BackEdgeToNonHeader,
    DominatorIdNotLower,
    DominatorListMissingChild,
    DominatedListCycle,
    DominatedChildIdNotHigher,
    DominatedChildBackLinkBroken,
    PostdomPathDeadEnd,
    PostdomUnreachable,
    LoopHeaderMismatch,
    HeaderNotLoopHeader,
    LoopBlockIdBelowHeader,
    LoopMembershipBroken,
    LoopNotClosed,
    LoopExitIdBelowHeader,
    LoopExitInsideLoop,
    LoopExitsNotSorted,
}

impl DiagnosticCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::InvalidBlockRef => 1,
            Self::InvalidLoopRef => 2,
            Self::EdgeNotSymmetric => 100,
            Self::ForwardEdgeDecreasesId => 101,
            Self::BackEdgeToNonHeader => 102,
            Self::DominatorIdNotLower => 200,
            Self::DominatorListMissingChild => 201,
            Self::DominatedListCycle => 202,
            Self::DominatedChildIdNotHigher => 203,
            Self::DominatedChildBackLinkBroken => 204,
            Self::PostdomPathDeadEnd => 300,
            Self::PostdomUnreachable => 301,
            Self::LoopHeaderMismatch => 400,
            Self::HeaderNotLoopHeader => 401,
            Self::LoopBlockIdBelowHeader => 402,
            Self::LoopMembershipBroken => 403,
            Self::LoopNotClosed => 404,
            Self::LoopExitIdBelowHeader => 405,
            Self::LoopExitInsideLoop => 406,
            Self::LoopExitsNotSorted => 407,
        }
    }

    pub fn as_str(self) -> String {
        format!("CFG{:04}", self.as_u16())
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => "error".fmt(f),
            Self::Warning => "warning".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Graph,
    Block(Block),
    Edge { from: Block, to: Block },
    Loop(Loop),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph => "graph".fmt(f),
            Self::Block(block) => block.fmt(f),
            Self::Edge { from, to } => write!(f, "edge {from} -> {to}"),
            Self::Loop(lp) => lp.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub primary: Location,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(
        code: DiagnosticCode,
        severity: Severity,
        message: impl Into<String>,
        primary: Location,
    ) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            primary,
            notes: Vec::new(),
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>, primary: Location) -> Self {
        Self::new(code, Severity::Error, message, primary)
    }

    pub fn with_note(mut self, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            message: message.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} [{}] {} @ {}",
            self.severity, self.code, self.message, self.primary
        )?;

        for note in &self.notes {
            writeln!(f, "  note: {}", note.message)?;
        }

        Ok(())
    }
}
