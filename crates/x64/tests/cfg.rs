//! End-to-end graph construction over decoded x86-64 sequences.

use cadenza_asm::{BlockId, ControlKind, FlowGraph, FlowGraphError, Inst as _, Loc};
use cadenza_x64::{reg_loc, Arg, Inst, Mem, Op, Prefix, Reg};

/// A summing loop:
///
/// ```text
/// 0x1000: test rdx, rdx
/// 0x1003: je   0x100d
/// 0x1005: add  rax, [rdi]
/// 0x1008: dec  rdx
/// 0x100b: jne  0x1005
/// 0x100d: ret
/// ```
fn sum_loop() -> Vec<Inst> {
    vec![
        Inst::new(Op::Test, 0x1000, 3).with_args([Arg::Reg(Reg::Rdx), Arg::Reg(Reg::Rdx)]),
        Inst::new(Op::Je, 0x1003, 2).with_args([Arg::Rel(8)]),
        Inst::new(Op::Add, 0x1005, 3)
            .with_args([
                Arg::Reg(Reg::Rax),
                Arg::Mem(Mem {
                    base: Some(Reg::Rdi),
                    ..Mem::default()
                }),
            ])
            .with_mem_bytes(8),
        Inst::new(Op::Dec, 0x1008, 3).with_args([Arg::Reg(Reg::Rdx)]),
        Inst::new(Op::Jne, 0x100b, 2).with_args([Arg::Rel(-8)]),
        Inst::new(Op::Ret, 0x100d, 1),
    ]
}

#[test]
fn loop_graph() {
    let seq = sum_loop();
    let graph = FlowGraph::build(&seq).unwrap();

    // Entry, the guard, the loop body, and the return.
    assert_eq!(graph.num_blocks(), 4);

    let entry = graph.entry();
    assert!(graph[entry].preds.is_empty());
    let guard = graph.succs_of(entry).next().unwrap();
    assert_eq!(guard, BlockId(1));

    let guard_block = &graph[guard];
    assert_eq!(guard_block.range(), 0..2);
    assert_eq!(guard_block.control.kind, ControlKind::Jump);
    assert!(guard_block.control.conditional);
    assert_eq!(guard_block.succs.len(), 2);
    let body = guard_block.succs[0].block;
    let ret = guard_block.succs[1].block;

    let body_block = &graph[body];
    assert_eq!(body_block.range(), 2..5);
    // Fall-through to ret first, then the back edge.
    assert_eq!(body_block.succs.len(), 2);
    assert_eq!(body_block.succs[0].block, ret);
    assert_eq!(body_block.succs[1].block, body);

    let ret_block = &graph[ret];
    assert_eq!(ret_block.range(), 5..6);
    assert_eq!(ret_block.control.kind, ControlKind::Ret);
    assert!(ret_block.succs.is_empty());
    assert_eq!(ret_block.preds.len(), 2);

    // Every edge is mutually indexed.
    for (id, block) in graph.blocks() {
        for (i, edge) in block.succs.iter().enumerate() {
            let back = graph[edge.block].preds[edge.rindex as usize];
            assert_eq!((back.block, back.rindex as usize), (id, i));
        }
    }
}

#[test]
fn loop_body_effects() {
    let seq = sum_loop();
    let (read, write) = seq[2].effects();

    let rax = reg_loc(Reg::Rax).unwrap().loc;
    let rdi = reg_loc(Reg::Rdi).unwrap().loc;
    assert!(read.contains(rax));
    assert!(read.contains(rdi));
    assert!(read.contains(Loc::MEM));
    assert!(write.contains(rax));
    assert!(!write.contains(Loc::MEM));
}

#[test]
fn rep_prefixed_store_forms_a_self_loop() {
    // 0x2000: xor eax, eax; 0x2002: rep stosb; 0x2004: ret
    let seq = vec![
        Inst::new(Op::Xor, 0x2000, 2).with_args([Arg::Reg(Reg::Eax), Arg::Reg(Reg::Eax)]),
        Inst::new(Op::Stosb, 0x2002, 2).with_prefix(Prefix::Rep),
        Inst::new(Op::Ret, 0x2004, 1),
    ];
    let graph = FlowGraph::build(&seq).unwrap();

    assert_eq!(graph.num_blocks(), 4);
    let rep = &graph[BlockId(2)];
    assert_eq!(rep.range(), 1..2);
    assert_eq!(rep.control.kind, ControlKind::Jump);
    assert!(rep.control.conditional);
    // Fall-through to ret plus the repeat edge back to itself.
    assert_eq!(rep.succs.len(), 2);
    assert_eq!(rep.succs[0].block, BlockId(3));
    assert_eq!(rep.succs[1].block, BlockId(2));
}

#[test]
fn computed_jump_fails_the_build() {
    let seq = vec![
        Inst::new(Op::Mov, 0x3000, 3).with_args([Arg::Reg(Reg::Rax), Arg::Reg(Reg::Rdi)]),
        Inst::new(Op::Jmp, 0x3003, 2).with_args([Arg::Reg(Reg::Rax)]),
    ];
    assert_eq!(
        FlowGraph::build(&seq).unwrap_err(),
        FlowGraphError::UnresolvedControlFlow { pc: 0x3003 }
    );
}

#[test]
fn tail_call_out_of_the_function() {
    // A jump past the end of the sequence becomes an exit.
    let seq = vec![
        Inst::new(Op::Pop, 0x4000, 1).with_args([Arg::Reg(Reg::Rbp)]),
        Inst::new(Op::Jmp, 0x4001, 5).with_args([Arg::Rel(0x100)]),
    ];
    let graph = FlowGraph::build(&seq).unwrap();

    assert_eq!(graph.num_blocks(), 2);
    let body = &graph[BlockId(1)];
    assert_eq!(body.range(), 0..2);
    assert_eq!(body.control.kind, ControlKind::Exit);
    assert!(body.succs.is_empty());
}

#[test]
fn dead_code_after_unconditional_jump_is_pruned() {
    // 0x5000: jmp 0x5003; 0x5002: nop (dead); 0x5003: ret
    let seq = vec![
        Inst::new(Op::Jmp, 0x5000, 2).with_args([Arg::Rel(1)]),
        Inst::new(Op::Nop, 0x5002, 1),
        Inst::new(Op::Ret, 0x5003, 1),
    ];
    let graph = FlowGraph::build(&seq).unwrap();

    assert_eq!(graph.num_blocks(), 3);
    assert!(graph.blocks().all(|(_, block)| !block.range().contains(&1)));
    let ids: Vec<BlockId> = graph.blocks().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![BlockId(0), BlockId(1), BlockId(2)]);
}
