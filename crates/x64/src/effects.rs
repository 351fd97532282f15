//! Read/write-set computation for decoded instructions.

use cadenza_asm::{Loc, LocSet};

use crate::info::{self, Dir};
use crate::inst::{Arg, Inst, Op, Reg, Size};
use crate::loc::reg_loc;

#[derive(Default)]
struct EffectSet {
    read: LocSet,
    write: LocSet,
}

impl EffectSet {
    fn reg(&mut self, reg: Reg, dir: Dir) {
        let Some(mapped) = reg_loc(reg) else {
            // The instruction pointer only ever appears as the implicit
            // base of a position-relative memory operand.
            debug_assert!(!dir.writes(), "write of the instruction pointer");
            return;
        };

        let mut dir = dir;
        if mapped.partial && dir == Dir::W {
            // A narrow write keeps the containing register's remaining
            // bits: a read-modify-write of the full location.
            dir = Dir::Rw;
        }
        if dir.reads() {
            self.read.insert(mapped.loc);
        }
        if dir.writes() {
            self.write.insert(mapped.loc);
        }
    }

    fn mem(&mut self, dir: Dir) {
        if dir.reads() {
            self.read.insert(Loc::MEM);
        }
        if dir.writes() {
            self.write.insert(Loc::MEM);
        }
    }
}

/// Computes the set of storage locations `inst` reads and writes.
pub(crate) fn compute(inst: &Inst) -> (LocSet, LocSet) {
    let mut effects = EffectSet::default();

    // Explicit operands, by table position.
    let dirs = info::arg_effects(inst.op, inst.args.len()).unwrap_or(&[]);
    for (arg, &dir) in inst.args.iter().zip(dirs) {
        match arg {
            Arg::Reg(reg) => effects.reg(*reg, dir),

            Arg::Mem(mem) => {
                // Address computation reads its registers whatever the
                // operand's own direction is.
                if let Some(segment) = mem.segment {
                    effects.reg(segment, Dir::R);
                }
                if let Some(base) = mem.base {
                    effects.reg(base, Dir::R);
                }
                if let Some(index) = mem.index {
                    effects.reg(index, Dir::R);
                }
                if inst.op == Op::Lea {
                    // lea computes the address without touching memory.
                    continue;
                }
                effects.mem(dir);
            }

            Arg::Imm(_) => {
                debug_assert!(!dir.writes(), "immediate operand cannot be written")
            }

            Arg::Rel(_) => {
                // A control-transfer target, not a memory reference.
                if !inst.op.is_control_transfer() {
                    effects.mem(dir);
                }
            }
        }
    }

    // Implicit registers, looked up by opcode alone first, then keyed by
    // the operand-size class of the first operand.
    let implicit = info::implicit_effects(inst.op, inst.args.len(), None)
        .or_else(|| info::implicit_effects(inst.op, inst.args.len(), size_class(inst)));
    if let Some(implicit) = implicit {
        for &reg in implicit.read {
            effects.reg(reg, Dir::R);
        }
        for &reg in implicit.write {
            effects.reg(reg, Dir::W);
        }
    }

    // xor-ing a register with itself is the idiomatic way to zero it; the
    // apparent read carries no dependency on the old value.
    if matches!(inst.op, Op::Xor | Op::Xorps | Op::Xorpd | Op::Pxor)
        && inst.args.len() == 2
        && inst.args[0] == inst.args[1]
    {
        effects.read.clear();
    }

    (effects.read, effects.write)
}

fn size_class(inst: &Inst) -> Option<Size> {
    match inst.args.first()? {
        Arg::Reg(reg) => reg.size(),
        Arg::Mem(_) => Size::from_mem_bytes(inst.mem_bytes),
        Arg::Imm(_) | Arg::Rel(_) => None,
    }
}
