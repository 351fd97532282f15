//! Mapping from decoded registers to canonical storage locations.
//!
//! The x86-64 enumeration packs 16 general-purpose, 8 x87, 8 MMX, 16 XMM,
//! and 6 segment locations after the shared memory sentinel. Narrow views
//! of a general-purpose register share the containing register's location.

use cadenza_asm::Loc;

use crate::inst::Reg;

const GP: u8 = 0;
const FP: u8 = GP + 16;
const MMX: u8 = FP + 8;
const XMM: u8 = MMX + 8;
const SEG: u8 = XMM + 16;

const LOC_NAMES: [&str; 54] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
    "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7",
    "m0", "m1", "m2", "m3", "m4", "m5", "m6", "m7",
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15",
    "es", "cs", "ss", "ds", "fs", "gs",
];

/// The canonical location a register maps to, and whether writing the
/// register only covers part of that location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegLoc {
    pub loc: Loc,

    /// An 8- or 16-bit view: writing it preserves the containing
    /// register's remaining bits, so a write is really a read-modify-write
    /// of the full location. 32-bit views zero-extend and are full writes.
    pub partial: bool,
}

/// Maps `reg` to its storage location. Returns `None` for the instruction
/// pointer, which is not modeled as a location even when it serves as the
/// base of a position-relative memory operand.
pub fn reg_loc(reg: Reg) -> Option<RegLoc> {
    use Reg::*;

    if reg.between(Ip, Rip) {
        return None;
    }

    let (class, offset, partial) = if reg.between(Al, R15b) {
        (GP, reg.offset_from(Al), true)
    } else if reg.between(Ah, Bh) {
        // High-byte views belong to the same containing register as the
        // corresponding low-byte ones.
        (GP, reg.offset_from(Ah), true)
    } else if reg.between(Ax, R15w) {
        (GP, reg.offset_from(Ax), true)
    } else if reg.between(Eax, R15d) {
        (GP, reg.offset_from(Eax), false)
    } else if reg.between(Rax, R15) {
        (GP, reg.offset_from(Rax), false)
    } else if reg.between(F0, F7) {
        (FP, reg.offset_from(F0), false)
    } else if reg.between(M0, M7) {
        (MMX, reg.offset_from(M0), false)
    } else if reg.between(X0, X15) {
        (XMM, reg.offset_from(X0), false)
    } else {
        (SEG, reg.offset_from(Es), false)
    };

    Some(RegLoc {
        loc: Loc::arch(class + offset),
        partial,
    })
}

/// The display name of a location, `None` if it is outside the x86-64
/// enumeration.
pub fn loc_name(loc: Loc) -> Option<&'static str> {
    if loc == Loc::MEM {
        return Some("mem");
    }
    LOC_NAMES.get(loc.bit() as usize - 1).copied()
}
