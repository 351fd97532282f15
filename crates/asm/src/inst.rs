//! The capability contract an architecture's instruction type must satisfy
//! to be analyzed by this crate.

use crate::{Loc, LocSet};

/// A sequence of decoded instructions belonging to one function body.
///
/// Indices are stable for the lifetime of the analysis; the sequence is
/// never mutated by it.
pub trait Seq {
    type Inst: Inst;

    fn len(&self) -> usize;

    fn get(&self, i: usize) -> &Self::Inst;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<I: Inst> Seq for [I] {
    type Inst = I;

    fn len(&self) -> usize {
        <[I]>::len(self)
    }

    fn get(&self, i: usize) -> &I {
        &self[i]
    }
}

impl<I: Inst> Seq for Vec<I> {
    type Inst = I;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, i: usize) -> &I {
        &self[i]
    }
}

/// A single decoded machine instruction.
pub trait Inst {
    /// The address of this instruction.
    fn pc(&self) -> u64;

    /// How control leaves this instruction.
    fn control(&self) -> Control;

    /// The storage locations this instruction reads and writes.
    fn effects(&self) -> (LocSet, LocSet);

    /// Convenience accessor for the read half of [`Inst::effects`].
    fn reads(&self, loc: Loc) -> bool {
        self.effects().0.contains(loc)
    }

    /// Convenience accessor for the write half of [`Inst::effects`].
    fn writes(&self, loc: Loc) -> bool {
        self.effects().1.contains(loc)
    }
}

/// Normalized classification of how an instruction transfers control.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub kind: ControlKind,

    /// Whether a fall-through successor exists in addition to the transfer
    /// described by `kind`.
    pub conditional: bool,

    /// The statically resolved destination, for `Jump` and `Call`. `None`
    /// when the destination cannot be determined (a computed transfer).
    pub target: Option<u64>,
}

impl Control {
    pub fn jump(target: Option<u64>, conditional: bool) -> Self {
        Self {
            kind: ControlKind::Jump,
            conditional,
            target,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Control falls through to the next instruction.
    #[default]
    None,

    /// An unconditional or conditional transfer to `target`.
    Jump,

    /// A call with a return continuation; falls through like `None`.
    Call,

    /// An unconditional or conditional function return.
    Ret,

    /// Termination with no defined successor, e.g. a trap or an
    /// undefined instruction.
    Exit,
}
