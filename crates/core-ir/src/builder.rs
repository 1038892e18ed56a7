use core_event::{MemOrdering, SVal, SmpFenceKind};

use crate::inst::{
    BinOp, BlockId, Callee, CmpPred, FunId, Inst, Intrinsic, Operand, Phi, Reg, RmwOp,
    Terminator,
};
use crate::module::{BasicBlock, Function, Global, Module};
use crate::types::Type;
use core_event::SAddr;

/// Builds one function. Blocks are created explicitly; instructions go to
/// the block last switched to. Registers are dispensed by the builder so
/// SSA ids stay unique per function.
pub struct FunctionBuilder {
    name: String,
    params: Vec<Reg>,
    blocks: Vec<(Vec<Phi>, Vec<Inst>, Option<Terminator>)>,
    current: usize,
    next_reg: u32,
}

impl FunctionBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            blocks: vec![(Vec::new(), Vec::new(), None)],
            current: 0,
            next_reg: 0,
        }
    }

    pub fn param(&mut self) -> Reg {
        let r = self.fresh();
        self.params.push(r);
        r
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push((Vec::new(), Vec::new(), None));
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn switch_to(&mut self, bb: BlockId) {
        debug_assert!((bb.0 as usize) < self.blocks.len(), "unknown block");
        self.current = bb.0 as usize;
    }

    pub fn current_block(&self) -> BlockId {
        BlockId(self.current as u32)
    }

    fn fresh(&mut self) -> Reg {
        let r = Reg(self.next_reg);
        self.next_reg += 1;
        r
    }

    fn push(&mut self, inst: Inst) {
        debug_assert!(
            self.blocks[self.current].2.is_none(),
            "appending to a terminated block"
        );
        self.blocks[self.current].1.push(inst);
    }

    fn terminate(&mut self, term: Terminator) {
        debug_assert!(self.blocks[self.current].2.is_none(), "block already terminated");
        self.blocks[self.current].2 = Some(term);
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(BlockId, Operand)>) -> Reg {
        let dst = self.fresh();
        self.blocks[self.current].0.push(Phi { dst, ty, incoming });
        dst
    }

    pub fn bin(&mut self, op: BinOp, ty: Type, lhs: Operand, rhs: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Bin { dst, op, ty, lhs, rhs });
        dst
    }

    pub fn cmp(&mut self, pred: CmpPred, ty: Type, lhs: Operand, rhs: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Cmp { dst, pred, ty, lhs, rhs });
        dst
    }

    pub fn select(&mut self, cond: Operand, then_val: Operand, else_val: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Select { dst, cond, then_val, else_val });
        dst
    }

    pub fn zext(&mut self, from: Type, to: Type, src: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::ZExt { dst, from, to, src });
        dst
    }

    pub fn sext(&mut self, from: Type, to: Type, src: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::SExt { dst, from, to, src });
        dst
    }

    pub fn trunc(&mut self, from: Type, to: Type, src: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Trunc { dst, from, to, src });
        dst
    }

    pub fn ptr_add(&mut self, base: Operand, offset: Operand) -> Reg {
        let dst = self.fresh();
        self.push(Inst::PtrAdd { dst, base, offset });
        dst
    }

    pub fn alloca(&mut self, ty: Type) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Alloca { dst, ty });
        dst
    }

    pub fn load(&mut self, ty: Type, addr: Operand, ord: MemOrdering) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Load { dst, ty, addr, ord });
        dst
    }

    pub fn store(&mut self, ty: Type, addr: Operand, value: Operand, ord: MemOrdering) {
        self.push(Inst::Store { ty, addr, value, ord });
    }

    pub fn rmw(
        &mut self,
        ty: Type,
        addr: Operand,
        op: RmwOp,
        operand: Operand,
        ord: MemOrdering,
    ) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Rmw { dst, ty, addr, op, operand, ord });
        dst
    }

    /// Returns the old value; success is old == expected.
    pub fn cmpxchg(
        &mut self,
        ty: Type,
        addr: Operand,
        expected: Operand,
        new: Operand,
        ord: MemOrdering,
    ) -> Reg {
        let dst = self.fresh();
        self.push(Inst::CmpXchg { dst, ty, addr, expected, new, ord });
        dst
    }

    pub fn fence(&mut self, ord: MemOrdering) {
        self.push(Inst::Fence { ord });
    }

    pub fn smp_fence(&mut self, kind: SmpFenceKind) {
        self.push(Inst::SmpFence { kind });
    }

    pub fn call(&mut self, callee: Callee, args: Vec<Operand>) -> Reg {
        let dst = self.fresh();
        self.push(Inst::Call { dst: Some(dst), callee, args });
        dst
    }

    pub fn call_void(&mut self, callee: Callee, args: Vec<Operand>) {
        self.push(Inst::Call { dst: None, callee, args });
    }

    pub fn intrinsic(&mut self, intr: Intrinsic, args: Vec<Operand>) -> Reg {
        self.call(Callee::Intrinsic(intr), args)
    }

    pub fn intrinsic_void(&mut self, intr: Intrinsic, args: Vec<Operand>) {
        self.call_void(Callee::Intrinsic(intr), args)
    }

    pub fn assume(&mut self, cond: Operand) {
        self.intrinsic_void(Intrinsic::Assume, vec![cond]);
    }

    pub fn assert(&mut self, cond: Operand) {
        self.intrinsic_void(Intrinsic::Assert, vec![cond]);
    }

    pub fn nondet(&mut self) -> Reg {
        self.intrinsic(Intrinsic::NondetInt, vec![])
    }

    pub fn thread_create(&mut self, body: FunId, arg: Operand) -> Reg {
        self.intrinsic(Intrinsic::ThreadCreate, vec![Operand::Fun(body), arg])
    }

    pub fn thread_join(&mut self, tid: Operand) -> Reg {
        self.intrinsic(Intrinsic::ThreadJoin, vec![tid])
    }

    pub fn br(&mut self, bb: BlockId) {
        self.terminate(Terminator::Br(bb));
    }

    pub fn cond_br(&mut self, cond: Operand, then_bb: BlockId, else_bb: BlockId) {
        self.terminate(Terminator::CondBr { cond, then_bb, else_bb });
    }

    pub fn switch(&mut self, value: Operand, cases: Vec<(u64, BlockId)>, default: BlockId) {
        self.terminate(Terminator::Switch { value, cases, default });
    }

    pub fn ret(&mut self) {
        self.terminate(Terminator::Ret(None));
    }

    pub fn ret_val(&mut self, value: Operand) {
        self.terminate(Terminator::Ret(Some(value)));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    fn build(self) -> Function {
        let blocks = self
            .blocks
            .into_iter()
            .map(|(phis, insts, term)| BasicBlock {
                phis,
                insts,
                term: term.unwrap_or(Terminator::Unreachable),
            })
            .collect();
        Function {
            name: self.name,
            params: self.params,
            blocks,
            num_regs: self.next_reg,
        }
    }
}

/// Builds a whole module: globals plus functions.
#[derive(Default)]
pub struct ProgramBuilder {
    globals: Vec<Global>,
    functions: Vec<Function>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global; returns the operand naming it.
    pub fn global(&mut self, name: &str, ty: Type, init: Option<i64>) -> Operand {
        let id = crate::inst::GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            name: name.to_string(),
            ty,
            init: init.map(SVal::from_i64),
            addr: SAddr::static_addr(0),
        });
        Operand::Global(id)
    }

    /// Start a function. The id it will get is the next add order, so
    /// mutually recursive setups should pre-compute ids with `next_fun_id`.
    pub fn function(&self, name: &str) -> FunctionBuilder {
        FunctionBuilder::new(name)
    }

    pub fn next_fun_id(&self) -> FunId {
        FunId(self.functions.len() as u32)
    }

    pub fn add_function(&mut self, fb: FunctionBuilder) -> FunId {
        let id = self.next_fun_id();
        self.functions.push(fb.build());
        id
    }

    /// Lay out globals and produce the module. Annotation is a separate
    /// pass (`annotate_module`) so embedders can skip it.
    pub fn finish(self) -> Module {
        let mut module = Module {
            globals: self.globals,
            functions: self.functions,
            info: Default::default(),
        };
        module.layout();
        module
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}
