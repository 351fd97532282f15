//! Basic-block graph construction over a linear instruction sequence.
//!
//! The builder partitions one function's instruction sequence into basic
//! blocks, wires bidirectional successor/predecessor edges, and prunes
//! blocks unreachable from the entry. It depends on instructions only
//! through the [`Seq`]/[`Inst`] capability traits, never on a concrete
//! architecture.

use cranelift_entity::{entity_impl, packed_option::PackedOption, EntitySet, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{Control, ControlKind, Inst, Seq};

/// An opaque reference to a [`BasicBlock`] in a [`FlowGraph`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// A control-flow edge (either successor or predecessor) between two basic
/// blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The neighboring block this edge leads to.
    pub block: BlockId,

    /// The index of this edge in the reverse direction. E.g., if this is a
    /// successor edge, the index of the matching edge in the successor's
    /// `preds` list. Kept consistent so either side of an edge can be found
    /// from the other without a scan.
    pub rindex: u32,
}

/// A maximal sequence of instructions with a single control-flow entry at
/// the top and a single exit from the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// The instructions of this block are the range `[start, end)` of
    /// indices into the original sequence.
    pub start: usize,
    pub end: usize,

    /// The exit from this block, copied from its last instruction. Plain
    /// blocks with a single fall-through exit have `ControlKind::None`.
    ///
    /// The number of successors is determined by this:
    ///
    /// | kind        | `succs.len()`                |
    /// |-------------|------------------------------|
    /// | `None`      | 1                            |
    /// | `Call`      | 1                            |
    /// | `Jump`      | 1, or 2 if conditional       |
    /// | `Ret`       | 0, or 1 if conditional       |
    /// | `Exit`      | 0, or 1 if conditional       |
    pub control: Control,

    pub succs: SmallVec<[Edge; 2]>,
    pub preds: SmallVec<[Edge; 4]>,
}

impl BasicBlock {
    fn new(start: usize, end: usize, control: Control) -> Self {
        Self {
            start,
            end,
            control,
            succs: SmallVec::new(),
            preds: SmallVec::new(),
        }
    }

    /// The instruction-index range covered by this block. Empty only for
    /// the synthetic entry block.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowGraphError {
    /// A jump's destination could not be statically determined (a computed
    /// jump). Successor discovery would be unsound, so no graph is built.
    #[error("jump with unknown target at pc {pc:#x}")]
    UnresolvedControlFlow { pc: u64 },
}

/// The basic-block graph of one function body.
///
/// The entry is always block 0: a synthetic, empty block with no
/// predecessors and a single successor, the first real block. This holds
/// even when the function's first instruction is itself a branch target.
/// Blocks unreachable from the entry do not appear; surviving blocks are
/// numbered densely in original order.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    blocks: PrimaryMap<BlockId, BasicBlock>,
}

impl FlowGraph {
    /// Builds the basic-block graph of `seq`.
    ///
    /// Transfers that leave the function (tail calls, out-of-function
    /// branches) and blocks that fall off the end of the sequence are
    /// treated as process exits from this function's point of view. The
    /// only failure is [`FlowGraphError::UnresolvedControlFlow`].
    pub fn build<S: Seq + ?Sized>(seq: &S) -> Result<FlowGraph, FlowGraphError> {
        // Find the start of each basic block.
        let mut start_pcs: Vec<u64> = Vec::new();
        let mut pcs: FxHashMap<u64, usize> =
            FxHashMap::with_capacity_and_hasher(seq.len(), Default::default());
        let mut new_block = true;
        for i in 0..seq.len() {
            let inst = seq.get(i);
            let pc = inst.pc();
            pcs.insert(pc, i);

            if new_block {
                start_pcs.push(pc);
                new_block = false;
            }

            let c = inst.control();
            match c.kind {
                ControlKind::Jump => {
                    let Some(target) = c.target else {
                        return Err(FlowGraphError::UnresolvedControlFlow { pc });
                    };
                    start_pcs.push(target);
                    new_block = true;
                }
                ControlKind::Ret | ControlKind::Exit => new_block = true,
                ControlKind::None | ControlKind::Call => {}
            }
        }

        // Sort and dedup the starts so the sequence can be broken into
        // blocks. Starts outside of this sequence (e.g., tail calls to
        // other functions) contribute no boundary.
        start_pcs.sort_unstable();
        start_pcs.dedup();
        start_pcs.retain(|pc| pcs.contains_key(pc));

        // Materialize the blocks, with the synthetic entry in front.
        let mut blocks: PrimaryMap<BlockId, BasicBlock> =
            PrimaryMap::with_capacity(1 + start_pcs.len());
        let entry = blocks.push(BasicBlock::new(0, 0, Control::default()));
        let mut block_at: FxHashMap<u64, BlockId> =
            FxHashMap::with_capacity_and_hasher(start_pcs.len(), Default::default());
        for (i, &start_pc) in start_pcs.iter().enumerate() {
            let start = pcs[&start_pc];
            let end = match start_pcs.get(i + 1) {
                Some(next_pc) => pcs[next_pc],
                None => seq.len(),
            };

            let id = blocks.push(BasicBlock::new(start, end, seq.get(end - 1).control()));
            block_at.insert(start_pc, id);
        }

        if blocks.len() == 1 {
            blocks[entry].control.kind = ControlKind::Exit;
            return Ok(FlowGraph { blocks });
        }

        // Wire the control-flow edges.
        let ids: Vec<BlockId> = blocks.keys().collect();
        for (i, &id) in ids.iter().enumerate() {
            let control = blocks[id].control;
            let mut next = false;
            let mut alt = None;

            match control.kind {
                ControlKind::None | ControlKind::Call => next = true,

                ControlKind::Jump => {
                    if control.conditional {
                        next = true;
                    }
                    match control.target.and_then(|pc| block_at.get(&pc)) {
                        // Jump outside the function; turn this into an
                        // exit.
                        None => blocks[id].control.kind = ControlKind::Exit,
                        Some(&target) => alt = Some(target),
                    }
                }

                ControlKind::Ret | ControlKind::Exit => {
                    if control.conditional {
                        next = true;
                    }
                }
            }

            if next {
                match ids.get(i + 1) {
                    Some(&fallthrough) => add_edge(&mut blocks, id, fallthrough),
                    // The block falls off the end of the sequence, which
                    // must mean it ends with a no-return call. Turn it
                    // into an exit.
                    None => blocks[id].control.kind = ControlKind::Exit,
                }
            }
            if let Some(alt) = alt {
                add_edge(&mut blocks, id, alt);
            }
        }

        // Mark the blocks reachable from the entry, with an explicit
        // worklist so pathological inputs cannot exhaust the call stack.
        let mut reachable = EntitySet::new();
        let mut n_reachable = 0;
        let mut worklist = vec![entry];
        while let Some(block) = worklist.pop() {
            if reachable.contains(block) {
                continue;
            }
            reachable.insert(block);
            n_reachable += 1;
            for edge in &blocks[block].succs {
                if !reachable.contains(edge.block) {
                    worklist.push(edge.block);
                }
            }
        }
        if n_reachable == blocks.len() {
            return Ok(FlowGraph { blocks });
        }

        // Sweep the unreachable blocks, renumbering the survivors densely
        // in original order.
        let mut pruned: PrimaryMap<BlockId, BasicBlock> = PrimaryMap::with_capacity(n_reachable);
        let mut remap: SecondaryMap<BlockId, PackedOption<BlockId>> = SecondaryMap::new();
        for (id, block) in blocks.iter() {
            if reachable.contains(id) {
                remap[id] = pruned.push(block.clone()).into();
            }
        }

        // Filter the predecessor lists down to survivors. Each dropped
        // entry shifts the ones after it, so the reverse index stored on
        // the surviving predecessor's successor entry must be restored.
        let mut rindex_fixes = Vec::new();
        for (_, block) in pruned.iter_mut() {
            let old_preds = std::mem::take(&mut block.preds);
            for edge in old_preds {
                let Some(pred) = remap[edge.block].expand() else {
                    continue;
                };
                rindex_fixes.push((pred, edge.rindex as usize, block.preds.len() as u32));
                block.preds.push(Edge {
                    block: pred,
                    rindex: edge.rindex,
                });
            }
        }
        for (pred, succ_index, rindex) in rindex_fixes {
            pruned[pred].succs[succ_index].rindex = rindex;
        }

        // A successor of a reachable block is itself reachable, so the
        // successor lists only need renumbering.
        for (_, block) in pruned.iter_mut() {
            for edge in &mut block.succs {
                edge.block = remap[edge.block].unwrap();
            }
        }

        Ok(FlowGraph { blocks: pruned })
    }

    /// The synthetic entry block.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The blocks of the graph, in dense id order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter()
    }

    pub fn succs_of(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[block].succs.iter().map(|edge| edge.block)
    }

    pub fn preds_of(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[block].preds.iter().map(|edge| edge.block)
    }
}

impl std::ops::Index<BlockId> for FlowGraph {
    type Output = BasicBlock;

    fn index(&self, block: BlockId) -> &BasicBlock {
        &self.blocks[block]
    }
}

fn add_edge(blocks: &mut PrimaryMap<BlockId, BasicBlock>, from: BlockId, to: BlockId) {
    let rindex = blocks[to].preds.len() as u32;
    blocks[from].succs.push(Edge { block: to, rindex });
    let rindex = blocks[from].succs.len() as u32 - 1;
    blocks[to].preds.push(Edge { block: from, rindex });
}
