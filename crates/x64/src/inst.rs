//! The decoded x86-64 instruction model.
//!
//! Decoding raw bytes is an external decoder's job; this crate consumes its
//! output. [`Inst`] carries the decoded opcode, operands, and prefixes of
//! one instruction, and implements the [`cadenza_asm::Inst`] capability
//! contract on top of them.

use std::fmt;

use smallvec::SmallVec;

use cadenza_asm::{Control, ControlKind, LocSet};

use crate::effects;

/// An x86-64 register, as named by the decoder.
///
/// The discriminants are laid out in contiguous ranges per register class;
/// the effect model relies on that ordering to map a register to its
/// canonical storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Reg {
    // 8-bit, low byte.
    Al, Cl, Dl, Bl, Spl, Bpl, Sil, Dil, R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,
    // 8-bit, high byte of the low word.
    Ah, Ch, Dh, Bh,
    // 16-bit.
    Ax, Cx, Dx, Bx, Sp, Bp, Si, Di, R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w,
    // 32-bit.
    Eax, Ecx, Edx, Ebx, Esp, Ebp, Esi, Edi, R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d,
    // 64-bit.
    Rax, Rcx, Rdx, Rbx, Rsp, Rbp, Rsi, Rdi, R8, R9, R10, R11, R12, R13, R14, R15,
    // Instruction pointer.
    Ip, Eip, Rip,
    // x87 stack.
    F0, F1, F2, F3, F4, F5, F6, F7,
    // MMX.
    M0, M1, M2, M3, M4, M5, M6, M7,
    // XMM.
    X0, X1, X2, X3, X4, X5, X6, X7, X8, X9, X10, X11, X12, X13, X14, X15,
    // Segment.
    Es, Cs, Ss, Ds, Fs, Gs,
}

impl Reg {
    pub(crate) fn between(self, lo: Reg, hi: Reg) -> bool {
        (lo as u8) <= (self as u8) && (self as u8) <= (hi as u8)
    }

    pub(crate) fn offset_from(self, base: Reg) -> u8 {
        self as u8 - base as u8
    }

    /// The operand-size class of this register, for the size-keyed part of
    /// the implicit-effect table.
    pub(crate) fn size(self) -> Option<Size> {
        if self.between(Reg::Al, Reg::Bh) {
            Some(Size::B8)
        } else if self.between(Reg::Ax, Reg::R15w) {
            Some(Size::B16)
        } else if self.between(Reg::Eax, Reg::R15d) {
            Some(Size::B32)
        } else if self.between(Reg::Rax, Reg::R15) {
            Some(Size::B64)
        } else {
            None
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Operand-size class of an instruction's first operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Size {
    B8,
    B16,
    B32,
    B64,
}

impl Size {
    pub(crate) fn from_mem_bytes(mem_bytes: u8) -> Option<Size> {
        match mem_bytes {
            1 => Some(Size::B8),
            2 => Some(Size::B16),
            4 => Some(Size::B32),
            8 => Some(Size::B64),
            _ => None,
        }
    }
}

/// A memory operand: `segment:[base + index*scale + disp]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    pub segment: Option<Reg>,
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: u8,
    pub disp: i64,
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(segment) = self.segment {
            write!(f, "{segment}:")?;
        }
        f.write_str("[")?;
        let mut sep = "";
        if let Some(base) = self.base {
            write!(f, "{base}")?;
            sep = " + ";
        }
        if let Some(index) = self.index {
            write!(f, "{sep}{index}*{}", self.scale)?;
            sep = " + ";
        }
        match self.disp {
            0 => {}
            d if d < 0 => write!(f, " - {:#x}", d.unsigned_abs())?,
            d => write!(f, "{sep}{d:#x}")?,
        }
        f.write_str("]")
    }
}

/// A decoded instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Reg(Reg),
    Mem(Mem),
    Imm(i64),
    /// A pc-relative control-transfer displacement, counted from the end
    /// of the instruction.
    Rel(i32),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Reg(reg) => write!(f, "{reg}"),
            Arg::Mem(mem) => write!(f, "{mem}"),
            Arg::Imm(imm) => write!(f, "{imm}"),
            Arg::Rel(rel) => write!(f, ".{rel:+}"),
        }
    }
}

/// An instruction prefix, as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Lock,
    Rep,
    Repn,
    OpSize,
    AddrSize,
}

/// Decoded opcodes. A curated subset of the instruction set: the full
/// control-transfer group plus the common integer, string, and SSE
/// instructions the effect tables model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Bytes the decoder could not decode.
    Invalid,

    // Control transfer.
    Call, Ret, Lret, Ud1, Ud2, Jmp,
    Ja, Jae, Jb, Jbe, Jcxz, Je, Jecxz, Jg, Jge, Jl, Jle, Jne, Jno, Jnp, Jns, Jo, Jp, Jrcxz, Js,
    Loop, Loope, Loopne, Xbegin,

    // Data movement.
    Mov, Movsx, Movsxd, Movzx, Lea, Xchg, Push, Pop,
    Cmova, Cmovae, Cmovb, Cmovbe, Cmove, Cmovg, Cmovge, Cmovl, Cmovle, Cmovne,
    Cmovno, Cmovnp, Cmovns, Cmovo, Cmovp, Cmovs,
    Seta, Setae, Setb, Setbe, Sete, Setg, Setge, Setl, Setle, Setne,
    Setno, Setnp, Setns, Seto, Setp, Sets,

    // Integer arithmetic and logic.
    Add, Adc, Sub, Sbb, Cmp, Test, And, Or, Xor, Not, Neg, Inc, Dec,
    Imul, Mul, Idiv, Div,
    Shl, Shr, Sar, Rol, Ror,
    Bsf, Bsr, Bt, Btc, Btr, Bts, Popcnt, Lzcnt, Tzcnt,
    Xadd, Cmpxchg,
    Cbw, Cwde, Cdqe, Cwd, Cdq, Cqo,

    // String operations.
    Movsb, Movsw, Movsd, Movsq,
    Stosb, Stosw, Stosd, Stosq,
    Lodsb, Lodsw, Lodsd, Lodsq,
    Scasb, Scasw, Scasd, Scasq,
    Cmpsb, Cmpsw, Cmpsd, Cmpsq,

    // SSE.
    Movaps, Movups, Movdqa, Movdqu, Movd, Movq,
    Xorps, Xorpd, Pxor,
    Addss, Addsd, Subss, Subsd, Mulss, Mulsd, Divss, Divsd,
    Ucomiss, Ucomisd,
    Cvtsi2ss, Cvtsi2sd, Cvttss2si, Cvttsd2si,

    Nop,
}

impl Op {
    /// Whether a `Rel` operand of this opcode is a control-transfer target
    /// rather than a memory reference.
    pub(crate) fn is_control_transfer(self) -> bool {
        use Op::*;
        matches!(
            self,
            Call | Ret | Lret | Jmp
                | Ja | Jae | Jb | Jbe | Jcxz | Je | Jecxz | Jg | Jge | Jl | Jle | Jne | Jno
                | Jnp | Jns | Jo | Jp | Jrcxz | Js
                | Loop | Loope | Loopne | Xbegin
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// One decoded x86-64 instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub op: Op,
    pub args: SmallVec<[Arg; 4]>,
    pub prefixes: SmallVec<[Prefix; 4]>,

    /// Size in bytes of the memory operand, if any.
    pub mem_bytes: u8,

    /// Encoded length of the instruction in bytes.
    pub len: u8,

    /// The address of this instruction.
    pub pc: u64,
}

impl Inst {
    pub fn new(op: Op, pc: u64, len: u8) -> Self {
        Self {
            op,
            args: SmallVec::new(),
            prefixes: SmallVec::new(),
            mem_bytes: 0,
            len,
            pc,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefixes.push(prefix);
        self
    }

    pub fn with_mem_bytes(mut self, mem_bytes: u8) -> Self {
        self.mem_bytes = mem_bytes;
        self
    }

    fn classify_control(&self) -> Control {
        // A REP/REPN-prefixed instruction may repeat: model it as a
        // conditional jump back to itself, whatever the opcode says.
        if self
            .prefixes
            .iter()
            .any(|p| matches!(p, Prefix::Rep | Prefix::Repn))
        {
            return Control::jump(Some(self.pc), true);
        }

        let mut c = Control::default();
        match self.op {
            Op::Call => c.kind = ControlKind::Call,
            Op::Ret | Op::Lret => {
                c.kind = ControlKind::Ret;
                return c;
            }
            Op::Ud1 | Op::Ud2 => {
                c.kind = ControlKind::Exit;
                return c;
            }
            Op::Jmp => c.kind = ControlKind::Jump,
            Op::Ja | Op::Jae | Op::Jb | Op::Jbe | Op::Jcxz | Op::Je | Op::Jecxz | Op::Jg
            | Op::Jge | Op::Jl | Op::Jle | Op::Jne | Op::Jno | Op::Jnp | Op::Jns | Op::Jo
            | Op::Jp | Op::Jrcxz | Op::Js | Op::Loop | Op::Loope | Op::Loopne | Op::Xbegin => {
                c.kind = ControlKind::Jump;
                c.conditional = true;
            }
            _ => return c,
        }

        debug_assert_eq!(self.args.len(), 1, "control transfer expects one operand");
        if let Some(Arg::Rel(rel)) = self.args.first() {
            // Relative displacements count from the end of the
            // instruction. Register and memory targets stay unresolved.
            c.target = Some(
                self.pc
                    .wrapping_add(self.len as u64)
                    .wrapping_add(*rel as i64 as u64),
            );
        }
        c
    }
}

impl cadenza_asm::Inst for Inst {
    fn pc(&self) -> u64 {
        self.pc
    }

    fn control(&self) -> Control {
        self.classify_control()
    }

    fn effects(&self) -> (LocSet, LocSet) {
        effects::compute(self)
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for prefix in &self.prefixes {
            match prefix {
                Prefix::Lock => f.write_str("lock ")?,
                Prefix::Rep => f.write_str("rep ")?,
                Prefix::Repn => f.write_str("repn ")?,
                Prefix::OpSize | Prefix::AddrSize => {}
            }
        }
        write!(f, "{}", self.op)?;
        for (i, arg) in self.args.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{arg}")?;
        }
        Ok(())
    }
}
