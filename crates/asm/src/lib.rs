pub mod cfg;
pub mod inst;
pub mod loc;

pub use cfg::{BasicBlock, BlockId, Edge, FlowGraph, FlowGraphError};
pub use inst::{Control, ControlKind, Inst, Seq};
pub use loc::{Alias, Loc, LocSet};
