//! Per-opcode effect tables.
//!
//! `arg_effects` gives the read/write direction of each explicit operand
//! position, keyed by opcode and operand count. `implicit_effects` gives
//! the registers an opcode touches beyond its explicit operands; where
//! those vary with operand width, the table is additionally keyed by the
//! operand-size class of the first operand.

use crate::inst::{Op, Reg, Size};

/// The direction of one operand access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dir {
    R,
    W,
    Rw,
}

impl Dir {
    pub(crate) fn reads(self) -> bool {
        matches!(self, Dir::R | Dir::Rw)
    }

    pub(crate) fn writes(self) -> bool {
        matches!(self, Dir::W | Dir::Rw)
    }
}

pub(crate) fn arg_effects(op: Op, nargs: usize) -> Option<&'static [Dir]> {
    use Dir::*;
    use Op::*;

    Some(match (op, nargs) {
        (
            Mov | Movsx | Movsxd | Movzx | Lea
            | Movaps | Movups | Movdqa | Movdqu | Movd | Movq
            | Cvtsi2ss | Cvtsi2sd | Cvttss2si | Cvttsd2si
            | Bsf | Bsr | Popcnt | Lzcnt | Tzcnt,
            2,
        ) => &[W, R],

        // A conditional move leaves the destination alone when the
        // condition fails.
        (
            Cmova | Cmovae | Cmovb | Cmovbe | Cmove | Cmovg | Cmovge | Cmovl | Cmovle | Cmovne
            | Cmovno | Cmovnp | Cmovns | Cmovo | Cmovp | Cmovs,
            2,
        ) => &[Rw, R],

        (
            Seta | Setae | Setb | Setbe | Sete | Setg | Setge | Setl | Setle | Setne
            | Setno | Setnp | Setns | Seto | Setp | Sets,
            1,
        ) => &[W],

        (
            Add | Adc | Sub | Sbb | And | Or | Xor
            | Shl | Shr | Sar | Rol | Ror
            | Btc | Btr | Bts
            | Xorps | Xorpd | Pxor
            | Addss | Addsd | Subss | Subsd | Mulss | Mulsd | Divss | Divsd,
            2,
        ) => &[Rw, R],

        (Cmp | Test | Bt | Ucomiss | Ucomisd, 2) => &[R, R],

        (Not | Neg | Inc | Dec, 1) => &[Rw],

        (Mul | Imul | Div | Idiv, 1) => &[R],
        (Imul, 2) => &[Rw, R],
        (Imul, 3) => &[W, R, R],

        (Push, 1) => &[R],
        (Pop, 1) => &[W],
        (Xchg | Xadd, 2) => &[Rw, Rw],
        (Cmpxchg, 2) => &[Rw, R],

        // Control transfers read their target operand; relative targets
        // are filtered out by the effect computation.
        (
            Call | Ret | Jmp
            | Ja | Jae | Jb | Jbe | Jcxz | Je | Jecxz | Jg | Jge | Jl | Jle | Jne | Jno | Jnp
            | Jns | Jo | Jp | Jrcxz | Js
            | Loop | Loope | Loopne | Xbegin,
            1,
        ) => &[R],

        _ => return None,
    })
}

/// Registers read and written beyond the explicit operands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Implicit {
    pub(crate) read: &'static [Reg],
    pub(crate) write: &'static [Reg],
}

pub(crate) fn implicit_effects(op: Op, nargs: usize, size: Option<Size>) -> Option<Implicit> {
    use Op::*;
    use Reg::*;

    let (read, write): (&'static [Reg], &'static [Reg]) = match (op, nargs, size) {
        // Stack maintenance.
        (Push | Pop | Call | Ret | Lret, _, None) => (&[Rsp], &[Rsp]),

        (Loop | Loope | Loopne, 1, None) => (&[Rcx], &[Rcx]),
        (Jcxz, 1, None) => (&[Cx], &[]),
        (Jecxz, 1, None) => (&[Ecx], &[]),
        (Jrcxz, 1, None) => (&[Rcx], &[]),

        // Widening conversions.
        (Cbw, 0, None) => (&[Al], &[Ax]),
        (Cwde, 0, None) => (&[Ax], &[Eax]),
        (Cdqe, 0, None) => (&[Eax], &[Rax]),
        (Cwd, 0, None) => (&[Ax], &[Dx]),
        (Cdq, 0, None) => (&[Eax], &[Edx]),
        (Cqo, 0, None) => (&[Rax], &[Rdx]),

        // String operations. The direction flag is not a modeled
        // location; REP repetition is handled by control classification.
        (Movsb | Movsw | Movsd | Movsq, 0, None) => (&[Rsi, Rdi], &[Rsi, Rdi]),
        (Cmpsb | Cmpsw | Cmpsd | Cmpsq, 0, None) => (&[Rsi, Rdi], &[Rsi, Rdi]),
        (Stosb, 0, None) => (&[Al, Rdi], &[Rdi]),
        (Stosw, 0, None) => (&[Ax, Rdi], &[Rdi]),
        (Stosd, 0, None) => (&[Eax, Rdi], &[Rdi]),
        (Stosq, 0, None) => (&[Rax, Rdi], &[Rdi]),
        (Lodsb, 0, None) => (&[Rsi], &[Al, Rsi]),
        (Lodsw, 0, None) => (&[Rsi], &[Ax, Rsi]),
        (Lodsd, 0, None) => (&[Rsi], &[Eax, Rsi]),
        (Lodsq, 0, None) => (&[Rsi], &[Rax, Rsi]),
        (Scasb, 0, None) => (&[Al, Rdi], &[Rdi]),
        (Scasw, 0, None) => (&[Ax, Rdi], &[Rdi]),
        (Scasd, 0, None) => (&[Eax, Rdi], &[Rdi]),
        (Scasq, 0, None) => (&[Rax, Rdi], &[Rdi]),

        // The widening multiply/divide family operates on fixed registers
        // picked by the operand width. Only the one-operand forms do.
        (Mul | Imul, 1, Some(Size::B8)) => (&[Al], &[Ax]),
        (Mul | Imul, 1, Some(Size::B16)) => (&[Ax], &[Ax, Dx]),
        (Mul | Imul, 1, Some(Size::B32)) => (&[Eax], &[Eax, Edx]),
        (Mul | Imul, 1, Some(Size::B64)) => (&[Rax], &[Rax, Rdx]),
        (Div | Idiv, 1, Some(Size::B8)) => (&[Ax], &[Ax]),
        (Div | Idiv, 1, Some(Size::B16)) => (&[Ax, Dx], &[Ax, Dx]),
        (Div | Idiv, 1, Some(Size::B32)) => (&[Eax, Edx], &[Eax, Edx]),
        (Div | Idiv, 1, Some(Size::B64)) => (&[Rax, Rdx], &[Rax, Rdx]),

        (Cmpxchg, 2, Some(Size::B8)) => (&[Al], &[Al]),
        (Cmpxchg, 2, Some(Size::B16)) => (&[Ax], &[Ax]),
        (Cmpxchg, 2, Some(Size::B32)) => (&[Eax], &[Eax]),
        (Cmpxchg, 2, Some(Size::B64)) => (&[Rax], &[Rax]),

        _ => return None,
    };

    Some(Implicit { read, write })
}
