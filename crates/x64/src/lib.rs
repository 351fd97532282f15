pub mod inst;
pub mod loc;

mod effects;
mod info;

pub use inst::{Arg, Inst, Mem, Op, Prefix, Reg};
pub use loc::{loc_name, reg_loc, RegLoc};
