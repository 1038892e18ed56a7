use core_event::{
    AAccess, AType, AddressSpace, ASize, AssumeKind, Event, EventDeps, MemOrdering, SAddr,
    SVal, StorageDuration, WriteAttr,
};
use core_graph::{ReadKind, WriteKind};
use core_ir::{
    eval_bin, eval_cmp, Annotation, BinOp, BlockId, Callee, CmpPred, FunId, Inst, Intrinsic,
    Module, Operand, Reg, RmwOp, SExpr, SourceLoc, Terminator, Type,
};
use tracing::trace;

use crate::arena::Arena;
use crate::thread::{Frame, MicroOp, Resume, ThreadState, ThreadStatus};
use crate::{InterpError, PendingEvent, PendingKind, StepResult};

/// Placeholder register standing for "the value this load observes" in
/// annotations synthesized by the lowering handlers (locks, barriers,
/// condvars); user-code annotations use the load's real SSA register.
const SYNTH_REG: Reg = Reg(u32::MAX);

fn synth_annot(kind: AssumeKind, pred: CmpPred, expect: SVal) -> Annotation {
    Annotation {
        kind,
        expr: SExpr::Cmp {
            pred,
            lhs: Box::new(SExpr::Register(SYNTH_REG)),
            rhs: Box::new(SExpr::Concrete(expect)),
        },
    }
}

/// The interpreter: a resumable state machine per simulated thread over one
/// immutable module.
pub struct Interpreter<'m> {
    module: &'m Module,
    threads: Vec<ThreadState>,
    arena: Arena,
    atexit: Vec<FunId>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self { module, threads: Vec::new(), arena: Arena::new(), atexit: Vec::new() }
    }

    /// Create thread 0 running `main`.
    pub fn spawn_main(&mut self) -> i32 {
        debug_assert!(self.threads.is_empty(), "main is spawned first");
        let fun = self.module.fun_id("main").expect("module validated");
        self.spawn(fun, SVal::new(0))
    }

    /// Create a new simulated thread running `fun(arg)`.
    pub fn spawn(&mut self, fun: FunId, arg: SVal) -> i32 {
        let id = self.threads.len() as i32;
        let f = self.module.fun(fun);
        let params = f.params.first().map(|&r| (r, arg)).into_iter().collect();
        self.threads.push(ThreadState::new(id, fun, f.num_regs, params));
        id
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn thread(&self, tid: i32) -> &ThreadState {
        &self.threads[tid as usize]
    }

    pub fn status(&self, tid: i32) -> ThreadStatus {
        self.threads[tid as usize].status
    }

    pub fn block(&mut self, tid: i32) {
        self.threads[tid as usize].status = ThreadStatus::Blocked;
    }

    pub fn finish(&mut self, tid: i32, result: SVal) {
        let t = &mut self.threads[tid as usize];
        t.status = ThreadStatus::Finished;
        t.result = result;
    }

    /// Put an event back so the next step yields it again (e.g. a join on a
    /// still-running thread).
    pub fn defer(&mut self, tid: i32, ev: PendingEvent) {
        let t = &mut self.threads[tid as usize];
        debug_assert!(t.pending.is_none(), "one deferred event at a time");
        t.pending = Some(ev);
    }

    /// Release a simulated heap region (the graph-restriction callback for
    /// regions allocated past a cut).
    pub fn release_region(&mut self, addr: SAddr) {
        self.arena.free(addr);
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Run the thread until its next event of interest.
    pub fn step(&mut self, tid: i32) -> Result<StepResult, InterpError> {
        if self.threads[tid as usize].status != ThreadStatus::Runnable {
            return Ok(StepResult::Idle);
        }
        loop {
            if let Some(ev) = self.threads[tid as usize].pending.take() {
                return Ok(StepResult::Event(ev));
            }
            if let Some(op) = self.threads[tid as usize].micro.pop_front() {
                return Ok(StepResult::Event(self.exec_micro(tid, op)));
            }
            let (fun, bb, idx) = {
                let fr = self.threads[tid as usize].frame();
                (fr.fun, fr.block, fr.inst)
            };
            let block = self.module.fun(fun).block(bb);
            if idx < block.insts.len() {
                let inst = block.insts[idx].clone();
                let at = SourceLoc { fun, block: bb, inst: idx as u32 };
                self.threads[tid as usize].frame_mut().inst += 1;
                if let Some(result) = self.exec_inst(tid, &inst, at)? {
                    return Ok(result);
                }
            } else {
                let term = block.term.clone();
                if let Some(result) = self.exec_term(tid, &term)? {
                    return Ok(result);
                }
            }
        }
    }

    /// Feed the observed value of the last load-like event back. `pos` is
    /// the label position the driver created (dependency source); `None`
    /// is poison.
    pub fn resume_with(
        &mut self,
        tid: i32,
        pos: Event,
        value: Option<SVal>,
    ) -> Result<(), InterpError> {
        let resume = self.threads[tid as usize]
            .resume
            .take()
            .expect("resume_with answers a suspended load");
        let t = &mut self.threads[tid as usize];
        match resume {
            Resume::ToReg(r) => {
                t.set_reg(r, value);
                t.deps.set_data_event(r, pos);
            }
            Resume::Discard => {}
            Resume::Fai { dst, op, operand, access, ord, is_barrier } => {
                let old = value.ok_or(InterpError::UninitializedRead("atomic update"))?;
                if let Some(r) = dst {
                    t.set_reg(r, Some(old));
                    t.deps.set_data_event(r, pos);
                }
                let new = match op {
                    RmwOp::Xchg => operand,
                    RmwOp::Add => SVal::new(old.get().wrapping_add(operand.get())),
                    RmwOp::Sub => SVal::new(old.get().wrapping_sub(operand.get())),
                    RmwOp::And => SVal::new(old.get() & operand.get()),
                    RmwOp::Or => SVal::new(old.get() | operand.get()),
                    RmwOp::Xor => SVal::new(old.get() ^ operand.get()),
                };
                let mut deps = EventDeps::new();
                deps.data.insert(pos);
                t.pending = Some(PendingEvent {
                    ord,
                    deps,
                    kind: PendingKind::Store {
                        access,
                        value: new,
                        kind: WriteKind::Fai { is_barrier },
                        attrs: WriteAttr::empty(),
                    },
                });
            }
            Resume::Cas { dst, expected, swap, access, ord, is_lock } => {
                let old = value.ok_or(InterpError::UninitializedRead("compare-exchange"))?;
                if let Some(r) = dst {
                    t.set_reg(r, Some(old));
                    t.deps.set_data_event(r, pos);
                }
                if old == expected {
                    let mut deps = EventDeps::new();
                    deps.cas.insert(pos);
                    t.pending = Some(PendingEvent {
                        ord,
                        deps,
                        kind: PendingKind::Store {
                            access,
                            value: swap,
                            kind: WriteKind::Cas { is_lock },
                            attrs: WriteAttr::empty(),
                        },
                    });
                } else if is_lock {
                    t.pending = Some(PendingEvent {
                        ord: MemOrdering::NotAtomic,
                        deps: EventDeps::new(),
                        kind: PendingKind::LockBlocked,
                    });
                }
            }
            Resume::AssumeCheck { equal, expect, kind } => {
                let got = value.ok_or(InterpError::UninitializedRead("assume"))?;
                let sat = (got == expect) == equal;
                if !sat {
                    t.pending = Some(PendingEvent {
                        ord: MemOrdering::NotAtomic,
                        deps: EventDeps::new(),
                        kind: PendingKind::AssumeBlocked { kind },
                    });
                }
            }
            Resume::CondGen { cv, mutex } => {
                let gen = value.ok_or(InterpError::UninitializedRead("condvar wait"))?;
                t.micro.push_back(MicroOp::AssumeLoad {
                    access: cv,
                    equal: false,
                    expect: gen,
                    barrier: false,
                });
                t.micro.push_back(MicroOp::LockCas { addr: mutex });
            }
        }
        Ok(())
    }

    fn exec_micro(&mut self, tid: i32, op: MicroOp) -> PendingEvent {
        let t = &mut self.threads[tid as usize];
        match op {
            MicroOp::Store { access, value, ord } => PendingEvent {
                ord,
                deps: EventDeps::new(),
                kind: PendingKind::Store {
                    access,
                    value,
                    kind: WriteKind::Plain,
                    attrs: WriteAttr::empty(),
                },
            },
            MicroOp::LockCas { addr } => {
                let access = AAccess::new(addr, ASize::new(4), AType::Unsigned);
                t.resume = Some(Resume::Cas {
                    dst: None,
                    expected: SVal::new(0),
                    swap: SVal::new(1),
                    access,
                    ord: MemOrdering::AcquireRelease,
                    is_lock: true,
                });
                PendingEvent {
                    ord: MemOrdering::AcquireRelease,
                    deps: EventDeps::new(),
                    kind: PendingKind::Load {
                        access,
                        kind: ReadKind::Cas {
                            expected: SVal::new(0),
                            swap: SVal::new(1),
                            is_lock: true,
                        },
                        annot: Some(synth_annot(
                            AssumeKind::Spinloop,
                            CmpPred::Eq,
                            SVal::new(0),
                        )),
                    },
                }
            }
            MicroOp::AssumeLoad { access, equal, expect, barrier } => {
                let kind = if barrier { AssumeKind::Barrier } else { AssumeKind::Spinloop };
                t.resume = Some(Resume::AssumeCheck { equal, expect, kind });
                PendingEvent {
                    ord: MemOrdering::Acquire,
                    deps: EventDeps::new(),
                    kind: PendingKind::Load {
                        access,
                        kind: ReadKind::Plain,
                        annot: Some(synth_annot(
                            kind,
                            if equal { CmpPred::Eq } else { CmpPred::Ne },
                            expect,
                        )),
                    },
                }
            }
            MicroOp::Fai { access, op, operand, ord, is_barrier } => {
                t.resume = Some(Resume::Fai {
                    dst: None,
                    op,
                    operand,
                    access,
                    ord,
                    is_barrier,
                });
                PendingEvent {
                    ord,
                    deps: EventDeps::new(),
                    kind: PendingKind::Load {
                        access,
                        kind: ReadKind::Fai { is_barrier },
                        annot: None,
                    },
                }
            }
            MicroOp::CondGenLoad { cv, mutex } => {
                t.resume = Some(Resume::CondGen { cv, mutex });
                PendingEvent {
                    ord: MemOrdering::Acquire,
                    deps: EventDeps::new(),
                    kind: PendingKind::Load { access: cv, kind: ReadKind::Plain, annot: None },
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Instruction execution
    // -----------------------------------------------------------------

    fn value(&self, tid: i32, op: Operand) -> Option<SVal> {
        match op {
            Operand::Reg(r) => self.threads[tid as usize].reg(r),
            Operand::Const(v) => Some(v),
            Operand::Global(g) => Some(SVal::from_addr(self.module.global(g).addr)),
            Operand::Fun(f) => Some(SVal::new(u64::from(f.0))),
        }
    }

    fn addr_of(&self, tid: i32, op: Operand) -> Result<SAddr, InterpError> {
        self.value(tid, op)
            .map(|v| SAddr::from_raw(v.get()))
            .ok_or(InterpError::UninitializedRead("address computation"))
    }

    fn access(&self, tid: i32, ty: &Type, addr: Operand) -> Result<AAccess, InterpError> {
        let addr = self.addr_of(tid, addr)?;
        let kind = if matches!(ty, Type::Ptr) { AType::Pointer } else { AType::Unsigned };
        Ok(AAccess::new(addr, ASize::new(ty.size().max(1) as u32), kind))
    }

    fn flow_deps(&mut self, tid: i32, dst: Reg, operands: &[Operand]) {
        let t = &mut self.threads[tid as usize];
        for op in operands {
            if let Operand::Reg(src) = op {
                t.deps.update_data(dst, *src);
            }
        }
    }

    /// Execute one straight-line instruction; `Some` means the thread
    /// suspends with an event (or finishes).
    fn exec_inst(
        &mut self,
        tid: i32,
        inst: &Inst,
        at: SourceLoc,
    ) -> Result<Option<StepResult>, InterpError> {
        match inst {
            Inst::Bin { dst, op, ty, lhs, rhs } => {
                let result = match (self.value(tid, *lhs), self.value(tid, *rhs)) {
                    (Some(l), Some(r)) => {
                        eval_bin(*op, l, r).map(|v| mask_to(ty, v))
                    }
                    _ => None,
                };
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*lhs, *rhs]);
            }
            Inst::Cmp { dst, pred, ty, lhs, rhs } => {
                let result = match (self.value(tid, *lhs), self.value(tid, *rhs)) {
                    (Some(l), Some(r)) => {
                        let (l, r) = normalize_cmp(ty, *pred, l, r);
                        Some(SVal::from(eval_cmp(*pred, l, r)))
                    }
                    _ => None,
                };
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*lhs, *rhs]);
            }
            Inst::Select { dst, cond, then_val, else_val } => {
                let result = match self.value(tid, *cond) {
                    Some(c) if !c.is_zero() => self.value(tid, *then_val),
                    Some(_) => self.value(tid, *else_val),
                    None => None,
                };
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*cond, *then_val, *else_val]);
            }
            Inst::ZExt { dst, from, src, .. } => {
                let result = self.value(tid, *src).map(|v| v.truncate(from.bits()));
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*src]);
            }
            Inst::SExt { dst, from, src, .. } => {
                let result = self.value(tid, *src).map(|v| v.sign_extend(from.bits()));
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*src]);
            }
            Inst::Trunc { dst, to, src, .. } => {
                let result = self.value(tid, *src).map(|v| v.truncate(to.bits()));
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*src]);
            }
            Inst::PtrAdd { dst, base, offset } => {
                let result = match (self.value(tid, *base), self.value(tid, *offset)) {
                    (Some(b), Some(o)) => Some(SVal::new(b.get().wrapping_add(o.get()))),
                    _ => None,
                };
                self.threads[tid as usize].set_reg(*dst, result);
                self.flow_deps(tid, *dst, &[*base, *offset]);
            }
            Inst::Alloca { dst, ty } => {
                let addr = self.arena.alloc(
                    tid as u32,
                    ty.size().max(1),
                    ty.align(),
                    StorageDuration::Automatic,
                    AddressSpace::User,
                );
                self.threads[tid as usize].set_reg(*dst, Some(SVal::from_addr(addr)));
            }
            Inst::Load { dst, ty, addr, ord } => {
                let access = self.access(tid, ty, *addr)?;
                check_alignment(&access, *ord)?;
                let t = &mut self.threads[tid as usize];
                if let Operand::Reg(r) = addr {
                    t.deps.update_addr_po(*r);
                }
                let deps = t.deps.deps_for_access(addr.as_reg(), None);
                let annot = self.module.info.load_annotations.get(&at).cloned();
                t.resume = Some(Resume::ToReg(*dst));
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: *ord,
                    deps,
                    kind: PendingKind::Load { access, kind: ReadKind::Plain, annot },
                })));
            }
            Inst::Store { ty, addr, value, ord } => {
                let access = self.access(tid, ty, *addr)?;
                check_alignment(&access, *ord)?;
                let v = self
                    .value(tid, *value)
                    .ok_or(InterpError::UninitializedRead("store"))?;
                let t = &mut self.threads[tid as usize];
                if let Operand::Reg(r) = addr {
                    t.deps.update_addr_po(*r);
                }
                let deps = t.deps.deps_for_access(addr.as_reg(), value.as_reg());
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: *ord,
                    deps,
                    kind: PendingKind::Store {
                        access,
                        value: mask_to(ty, v),
                        kind: WriteKind::Plain,
                        attrs: WriteAttr::empty(),
                    },
                })));
            }
            Inst::Rmw { dst, ty, addr, op, operand, ord } => {
                let access = self.access(tid, ty, *addr)?;
                check_alignment(&access, *ord)?;
                let operand_v = self
                    .value(tid, *operand)
                    .ok_or(InterpError::UninitializedRead("atomic update"))?;
                let t = &mut self.threads[tid as usize];
                if let Operand::Reg(r) = addr {
                    t.deps.update_addr_po(*r);
                }
                let deps = t.deps.deps_for_access(addr.as_reg(), operand.as_reg());
                t.resume = Some(Resume::Fai {
                    dst: Some(*dst),
                    op: *op,
                    operand: operand_v,
                    access,
                    ord: *ord,
                    is_barrier: false,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: *ord,
                    deps,
                    kind: PendingKind::Load {
                        access,
                        kind: ReadKind::Fai { is_barrier: false },
                        annot: None,
                    },
                })));
            }
            Inst::CmpXchg { dst, ty, addr, expected, new, ord } => {
                let access = self.access(tid, ty, *addr)?;
                check_alignment(&access, *ord)?;
                let expected_v = self
                    .value(tid, *expected)
                    .ok_or(InterpError::UninitializedRead("compare-exchange"))?;
                let new_v = self
                    .value(tid, *new)
                    .ok_or(InterpError::UninitializedRead("compare-exchange"))?;
                let t = &mut self.threads[tid as usize];
                if let Operand::Reg(r) = addr {
                    t.deps.update_addr_po(*r);
                }
                let mut deps = t.deps.deps_for_access(addr.as_reg(), new.as_reg());
                if let Some(r) = expected.as_reg() {
                    deps.cas.update(&t.deps.data_deps(r));
                }
                t.resume = Some(Resume::Cas {
                    dst: Some(*dst),
                    expected: expected_v,
                    swap: new_v,
                    access,
                    ord: *ord,
                    is_lock: false,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: *ord,
                    deps,
                    kind: PendingKind::Load {
                        access,
                        kind: ReadKind::Cas {
                            expected: expected_v,
                            swap: new_v,
                            is_lock: false,
                        },
                        annot: None,
                    },
                })));
            }
            Inst::Fence { ord } => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: *ord,
                    deps: EventDeps::new(),
                    kind: PendingKind::Fence,
                })));
            }
            Inst::SmpFence { kind } => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::SmpFence { kind: *kind },
                })));
            }
            Inst::Call { dst, callee, args } => {
                return self.exec_call(tid, *dst, callee, args);
            }
        }
        Ok(None)
    }

    fn exec_call(
        &mut self,
        tid: i32,
        dst: Option<Reg>,
        callee: &Callee,
        args: &[Operand],
    ) -> Result<Option<StepResult>, InterpError> {
        let target = match callee {
            Callee::Fun(f) => Some(*f),
            Callee::Indirect(op) => {
                let v = self
                    .value(tid, *op)
                    .ok_or(InterpError::UninitializedRead("indirect call"))?;
                let id = v.get();
                if id as usize >= self.module.functions.len() {
                    return Err(InterpError::BadIndirectCall);
                }
                Some(FunId(id as u32))
            }
            Callee::Intrinsic(_) => None,
        };
        if let Some(fun) = target {
            let f = self.module.fun(fun);
            let mut params = Vec::new();
            for (i, &p) in f.params.iter().enumerate() {
                let v = args.get(i).and_then(|&a| self.value(tid, a));
                params.push((p, v));
            }
            let mut regs = vec![None; f.num_regs as usize];
            for (r, v) in params {
                regs[r.0 as usize] = v;
            }
            self.threads[tid as usize].frames.push(Frame {
                fun,
                block: BlockId(0),
                prev_block: None,
                inst: 0,
                regs,
                ret_to: dst,
            });
            return Ok(None);
        }
        let Callee::Intrinsic(intr) = callee else { unreachable!("handled above") };
        self.exec_intrinsic(tid, dst, *intr, args)
    }

    fn exec_intrinsic(
        &mut self,
        tid: i32,
        dst: Option<Reg>,
        intr: Intrinsic,
        args: &[Operand],
    ) -> Result<Option<StepResult>, InterpError> {
        let arg = |i: usize| -> Option<SVal> {
            args.get(i).and_then(|&a| self.value(tid, a))
        };
        match intr {
            Intrinsic::Assert => {
                let cond =
                    arg(0).ok_or(InterpError::UninitializedRead("assertion"))?;
                if cond.is_zero() {
                    return Err(InterpError::AssertionFailure);
                }
            }
            Intrinsic::Assume => {
                let cond = arg(0).ok_or(InterpError::UninitializedRead("assume"))?;
                if cond.is_zero() {
                    return Ok(Some(StepResult::Event(PendingEvent {
                        ord: MemOrdering::NotAtomic,
                        deps: EventDeps::new(),
                        kind: PendingKind::AssumeBlocked { kind: AssumeKind::User },
                    })));
                }
            }
            Intrinsic::NondetInt => {
                let v = self.threads[tid as usize].next_nondet();
                if let Some(r) = dst {
                    self.threads[tid as usize].set_reg(r, Some(v));
                }
            }
            Intrinsic::LoopBegin | Intrinsic::SpinStart => {}
            Intrinsic::SpinEnd => {
                let cond = arg(0).ok_or(InterpError::UninitializedRead("spin end"))?;
                if cond.is_zero() {
                    return Ok(Some(StepResult::Event(PendingEvent {
                        ord: MemOrdering::NotAtomic,
                        deps: EventDeps::new(),
                        kind: PendingKind::AssumeBlocked { kind: AssumeKind::Spinloop },
                    })));
                }
            }
            Intrinsic::OptBegin => {
                self.threads[tid as usize].resume = Some(match dst {
                    Some(r) => Resume::ToReg(r),
                    None => Resume::Discard,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::OptBegin,
                })));
            }
            Intrinsic::Malloc | Intrinsic::AlignedAlloc => {
                let (align, size) = if intr == Intrinsic::AlignedAlloc {
                    (
                        arg(0).ok_or(InterpError::UninitializedRead("allocation"))?.get(),
                        arg(1).ok_or(InterpError::UninitializedRead("allocation"))?.get(),
                    )
                } else {
                    (8, arg(0).ok_or(InterpError::UninitializedRead("allocation"))?.get())
                };
                let addr = self.arena.alloc(
                    tid as u32,
                    size,
                    align,
                    StorageDuration::Heap,
                    AddressSpace::User,
                );
                if let Some(r) = dst {
                    self.threads[tid as usize].set_reg(r, Some(SVal::from_addr(addr)));
                }
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::Malloc {
                        addr,
                        size,
                        duration: StorageDuration::Heap,
                        space: AddressSpace::User,
                    },
                })));
            }
            Intrinsic::Free => {
                let addr = SAddr::from_raw(
                    arg(0).ok_or(InterpError::UninitializedRead("free"))?.get(),
                );
                if !self.arena.free(addr) {
                    return Err(InterpError::InvalidFree(addr));
                }
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::Free { addr },
                })));
            }
            Intrinsic::ThreadCreate => {
                let fun = match args.first() {
                    Some(Operand::Fun(f)) => *f,
                    Some(&op) => {
                        let v = self
                            .value(tid, op)
                            .ok_or(InterpError::UninitializedRead("thread create"))?;
                        if v.get() as usize >= self.module.functions.len() {
                            return Err(InterpError::BadIndirectCall);
                        }
                        FunId(v.get() as u32)
                    }
                    None => return Err(InterpError::BadIndirectCall),
                };
                let arg_v = arg(1).unwrap_or(SVal::new(0));
                self.threads[tid as usize].resume = Some(match dst {
                    Some(r) => Resume::ToReg(r),
                    None => Resume::Discard,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::ThreadCreate { fun, arg: arg_v },
                })));
            }
            Intrinsic::ThreadJoin => {
                let t = arg(0).ok_or(InterpError::UninitializedRead("join"))?;
                let joined = t.as_i64();
                if joined < 0 || joined as usize >= self.threads.len() {
                    return Err(InterpError::BadJoin(joined));
                }
                self.threads[tid as usize].resume = Some(match dst {
                    Some(r) => Resume::ToReg(r),
                    None => Resume::Discard,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::Acquire,
                    deps: EventDeps::new(),
                    kind: PendingKind::ThreadJoin { tid: joined as i32 },
                })));
            }
            Intrinsic::ThreadExit => {
                let result = arg(0).unwrap_or(SVal::new(0));
                self.threads[tid as usize].frames.clear();
                return Ok(Some(StepResult::Finished { result }));
            }
            Intrinsic::MutexInit | Intrinsic::MutexDestroy => {
                if intr == Intrinsic::MutexInit {
                    let m = self.mutex_access(tid, args)?;
                    self.threads[tid as usize].micro.push_back(MicroOp::Store {
                        access: m,
                        value: SVal::new(0),
                        ord: MemOrdering::Relaxed,
                    });
                }
            }
            Intrinsic::MutexLock => {
                let m = self.mutex_access(tid, args)?;
                self.threads[tid as usize]
                    .micro
                    .push_back(MicroOp::LockCas { addr: m.addr });
            }
            Intrinsic::MutexTrylock => {
                let m = self.mutex_access(tid, args)?;
                let t = &mut self.threads[tid as usize];
                t.resume = Some(Resume::Cas {
                    dst,
                    expected: SVal::new(0),
                    swap: SVal::new(1),
                    access: m,
                    ord: MemOrdering::AcquireRelease,
                    is_lock: false,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::AcquireRelease,
                    deps: EventDeps::new(),
                    kind: PendingKind::Load {
                        access: m,
                        kind: ReadKind::Cas {
                            expected: SVal::new(0),
                            swap: SVal::new(1),
                            is_lock: false,
                        },
                        annot: None,
                    },
                })));
            }
            Intrinsic::MutexUnlock => {
                let m = self.mutex_access(tid, args)?;
                self.threads[tid as usize].micro.push_back(MicroOp::Store {
                    access: m,
                    value: SVal::new(0),
                    ord: MemOrdering::Release,
                });
            }
            Intrinsic::BarrierInit => {
                let m = self.mutex_access(tid, args)?;
                let n = arg(1).ok_or(InterpError::UninitializedRead("barrier init"))?;
                self.threads[tid as usize].micro.push_back(MicroOp::Store {
                    access: m,
                    value: n,
                    ord: MemOrdering::Relaxed,
                });
            }
            Intrinsic::BarrierWait => {
                let m = self.mutex_access(tid, args)?;
                let t = &mut self.threads[tid as usize];
                t.micro.push_back(MicroOp::Fai {
                    access: m,
                    op: RmwOp::Sub,
                    operand: SVal::new(1),
                    ord: MemOrdering::AcquireRelease,
                    is_barrier: true,
                });
                t.micro.push_back(MicroOp::AssumeLoad {
                    access: m,
                    equal: true,
                    expect: SVal::new(0),
                    barrier: true,
                });
            }
            Intrinsic::CondInit | Intrinsic::CondDestroy => {
                if intr == Intrinsic::CondInit {
                    let cv = self.mutex_access(tid, args)?;
                    self.threads[tid as usize].micro.push_back(MicroOp::Store {
                        access: cv,
                        value: SVal::new(0),
                        ord: MemOrdering::Relaxed,
                    });
                }
            }
            Intrinsic::CondWait => {
                let cv = self.mutex_access(tid, args)?;
                let m = self.addr_of(
                    tid,
                    *args.get(1).ok_or(InterpError::UninitializedRead("condvar wait"))?,
                )?;
                let t = &mut self.threads[tid as usize];
                // Unlock, snapshot the generation, wait for it to move,
                // then re-acquire.
                t.micro.push_back(MicroOp::Store {
                    access: AAccess::new(m, ASize::new(4), AType::Unsigned),
                    value: SVal::new(0),
                    ord: MemOrdering::Release,
                });
                t.micro.push_back(MicroOp::CondGenLoad { cv, mutex: m });
            }
            Intrinsic::CondSignal | Intrinsic::CondBroadcast => {
                let cv = self.mutex_access(tid, args)?;
                self.threads[tid as usize].micro.push_back(MicroOp::Fai {
                    access: cv,
                    op: RmwOp::Add,
                    operand: SVal::new(1),
                    ord: MemOrdering::Release,
                    is_barrier: false,
                });
            }
            Intrinsic::RcuReadLock => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::RcuLock,
                })));
            }
            Intrinsic::RcuReadUnlock => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::RcuUnlock,
                })));
            }
            Intrinsic::RcuSynchronize => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::RcuSync,
                })));
            }
            Intrinsic::AtExit => {
                if let Some(Operand::Fun(f)) = args.first() {
                    self.atexit.push(*f);
                }
            }
            Intrinsic::DskOpen => {
                let tag = arg(0).unwrap_or(SVal::new(0));
                let fd = SVal::new(self.arena.fresh_fd());
                if let Some(r) = dst {
                    self.threads[tid as usize].set_reg(r, Some(fd));
                }
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::DskOpen { path: format!("file{}", tag.get()), fd },
                })));
            }
            Intrinsic::DskRead => {
                let addr = SAddr::from_raw(
                    arg(0).ok_or(InterpError::UninitializedRead("disk read"))?.get(),
                );
                let access = AAccess::new(addr, ASize::new(8), AType::Unsigned);
                let t = &mut self.threads[tid as usize];
                t.resume = Some(match dst {
                    Some(r) => Resume::ToReg(r),
                    None => Resume::Discard,
                });
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::Relaxed,
                    deps: EventDeps::new(),
                    kind: PendingKind::Load { access, kind: ReadKind::Disk, annot: None },
                })));
            }
            Intrinsic::DskWrite => {
                let addr = SAddr::from_raw(
                    arg(0).ok_or(InterpError::UninitializedRead("disk write"))?.get(),
                );
                let value = arg(1).ok_or(InterpError::UninitializedRead("disk write"))?;
                let access = AAccess::new(addr, ASize::new(8), AType::Unsigned);
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::Relaxed,
                    deps: EventDeps::new(),
                    kind: PendingKind::Store {
                        access,
                        value,
                        kind: WriteKind::Disk(core_graph::DiskWriteKind::Plain),
                        attrs: WriteAttr::empty(),
                    },
                })));
            }
            Intrinsic::DskFsync => {
                let inode = SAddr::from_raw(
                    arg(0).ok_or(InterpError::UninitializedRead("fsync"))?.get(),
                );
                let size = arg(1).map(|v| v.get()).unwrap_or(0);
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::DskFsync { inode, size },
                })));
            }
            Intrinsic::DskSync => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::DskSync,
                })));
            }
            Intrinsic::DskPbarrier => {
                return Ok(Some(StepResult::Event(PendingEvent {
                    ord: MemOrdering::NotAtomic,
                    deps: EventDeps::new(),
                    kind: PendingKind::DskPbarrier,
                })));
            }
        }
        Ok(None)
    }

    fn mutex_access(&self, tid: i32, args: &[Operand]) -> Result<AAccess, InterpError> {
        let addr = self.addr_of(
            tid,
            *args.first().ok_or(InterpError::UninitializedRead("sync object"))?,
        )?;
        Ok(AAccess::new(addr, ASize::new(4), AType::Unsigned))
    }

    fn exec_term(
        &mut self,
        tid: i32,
        term: &Terminator,
    ) -> Result<Option<StepResult>, InterpError> {
        match term {
            Terminator::Br(bb) => {
                self.jump(tid, *bb);
                Ok(None)
            }
            Terminator::CondBr { cond, then_bb, else_bb } => {
                let c = self
                    .value(tid, *cond)
                    .ok_or(InterpError::UninitializedRead("branch"))?;
                if let Some(r) = cond.as_reg() {
                    self.threads[tid as usize].deps.update_ctrl(r);
                }
                self.jump(tid, if c.is_zero() { *else_bb } else { *then_bb });
                Ok(None)
            }
            Terminator::Switch { value, cases, default } => {
                let v = self
                    .value(tid, *value)
                    .ok_or(InterpError::UninitializedRead("switch"))?;
                if let Some(r) = value.as_reg() {
                    self.threads[tid as usize].deps.update_ctrl(r);
                }
                let target = cases
                    .iter()
                    .find(|(c, _)| *c == v.get())
                    .map(|(_, bb)| *bb)
                    .unwrap_or(*default);
                self.jump(tid, target);
                Ok(None)
            }
            Terminator::Ret(value) => {
                let v = value.as_ref().and_then(|op| self.value(tid, *op));
                let t = &mut self.threads[tid as usize];
                let frame = t.frames.pop().expect("ret with a frame");
                if let Some(caller) = t.frames.last_mut() {
                    if let Some(r) = frame.ret_to {
                        let slot = r.0 as usize;
                        if slot >= caller.regs.len() {
                            caller.regs.resize(slot + 1, None);
                        }
                        caller.regs[slot] = v;
                    }
                    Ok(None)
                } else {
                    // Thread body returned. Main drains atexit handlers
                    // first, last registered first.
                    if tid == 0 {
                        if let Some(f) = self.atexit.pop() {
                            let num_regs = self.module.fun(f).num_regs;
                            self.threads[tid as usize].frames.push(Frame {
                                fun: f,
                                block: BlockId(0),
                                prev_block: None,
                                inst: 0,
                                regs: vec![None; num_regs as usize],
                                ret_to: None,
                            });
                            return Ok(None);
                        }
                    }
                    trace!(target: "interp", tid, "thread_finished");
                    Ok(Some(StepResult::Finished { result: v.unwrap_or(SVal::new(0)) }))
                }
            }
            Terminator::Unreachable => Err(InterpError::UnreachableExecuted),
        }
    }

    /// Transfer to a block, resolving its phis against the block we left.
    fn jump(&mut self, tid: i32, target: BlockId) {
        let from = self.threads[tid as usize].frame().block;
        let fun = self.threads[tid as usize].frame().fun;
        let block = self.module.fun(fun).block(target);
        // Phis read their inputs simultaneously, against pre-jump state.
        let mut writes: Vec<(Reg, Option<SVal>, Option<Reg>)> = Vec::new();
        for phi in &block.phis {
            let incoming = phi
                .incoming
                .iter()
                .find(|(bb, _)| *bb == from)
                .map(|(_, op)| *op);
            let v = incoming.and_then(|op| self.value(tid, op));
            writes.push((phi.dst, v, incoming.and_then(|op| op.as_reg())));
        }
        let t = &mut self.threads[tid as usize];
        for (dst, v, src) in writes {
            t.set_reg(dst, v);
            if let Some(s) = src {
                t.deps.update_data(dst, s);
            }
        }
        let frame = t.frame_mut();
        frame.prev_block = Some(from);
        frame.block = target;
        frame.inst = 0;
    }
}

fn mask_to(ty: &Type, v: SVal) -> SVal {
    let bits = ty.bits();
    if bits == 0 || bits >= 64 {
        v
    } else {
        v.truncate(bits)
    }
}

fn normalize_cmp(ty: &Type, pred: CmpPred, l: SVal, r: SVal) -> (SVal, SVal) {
    let bits = ty.bits();
    if bits == 0 || bits >= 64 {
        return (l, r);
    }
    let signed = matches!(pred, CmpPred::SLt | CmpPred::SLe | CmpPred::SGt | CmpPred::SGe);
    if signed {
        (l.sign_extend(bits), r.sign_extend(bits))
    } else {
        (l.truncate(bits), r.truncate(bits))
    }
}

fn check_alignment(access: &AAccess, ord: MemOrdering) -> Result<(), InterpError> {
    if !ord.is_atomic() {
        return Ok(());
    }
    let size = u64::from(access.size.bytes()).max(1);
    if access.addr.offset() % size != 0 {
        return Err(InterpError::UnalignedAtomic(access.addr));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ir::ProgramBuilder;

    #[test]
    fn pure_computation_folds_without_events() {
        let mut pb = ProgramBuilder::new();
        let mut f = pb.function("main");
        let a = f.bin(BinOp::Add, Type::I32, Operand::imm(2), Operand::imm(3));
        let c = f.cmp(CmpPred::Eq, Type::I32, a.into(), Operand::imm(5));
        f.assert(c.into());
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        match interp.step(0).unwrap() {
            StepResult::Finished { .. } => {}
            other => panic!("expected clean finish, got {other:?}"),
        }
    }

    #[test]
    fn load_suspends_and_resumes_with_value() {
        let mut pb = ProgramBuilder::new();
        let x = pb.global("x", Type::I32, Some(0));
        let mut f = pb.function("main");
        let v = f.load(Type::I32, x, MemOrdering::Acquire);
        let c = f.cmp(CmpPred::Eq, Type::I32, v.into(), Operand::imm(7));
        f.assert(c.into());
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        let ev = match interp.step(0).unwrap() {
            StepResult::Event(ev) => ev,
            other => panic!("expected load event, got {other:?}"),
        };
        assert!(matches!(ev.kind, PendingKind::Load { .. }));
        interp.resume_with(0, Event::new(0, 1), Some(SVal::new(7))).unwrap();
        assert!(matches!(interp.step(0).unwrap(), StepResult::Finished { .. }));
    }

    #[test]
    fn failed_assert_after_wrong_value() {
        let mut pb = ProgramBuilder::new();
        let x = pb.global("x", Type::I32, Some(0));
        let mut f = pb.function("main");
        let v = f.load(Type::I32, x, MemOrdering::Relaxed);
        f.assert(v.into());
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        let _ = interp.step(0).unwrap();
        interp.resume_with(0, Event::new(0, 1), Some(SVal::new(0))).unwrap();
        assert_eq!(interp.step(0).unwrap_err(), InterpError::AssertionFailure);
    }

    #[test]
    fn poison_into_branch_is_an_error() {
        let mut pb = ProgramBuilder::new();
        let x = pb.global("x", Type::I32, None);
        let mut f = pb.function("main");
        let exit = f.new_block();
        let v = f.load(Type::I32, x, MemOrdering::Relaxed);
        f.cond_br(v.into(), exit, exit);
        f.switch_to(exit);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        let _ = interp.step(0).unwrap();
        // The driver answers with poison (uninitialized location).
        interp.resume_with(0, Event::new(0, 1), None).unwrap();
        assert!(matches!(
            interp.step(0).unwrap_err(),
            InterpError::UninitializedRead("branch")
        ));
    }

    #[test]
    fn rmw_yields_read_then_paired_write() {
        let mut pb = ProgramBuilder::new();
        let x = pb.global("x", Type::I32, Some(0));
        let mut f = pb.function("main");
        let _old = f.rmw(Type::I32, x, RmwOp::Add, Operand::imm(1), MemOrdering::Relaxed);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        let ev = match interp.step(0).unwrap() {
            StepResult::Event(ev) => ev,
            other => panic!("expected fai read, got {other:?}"),
        };
        assert!(matches!(
            ev.kind,
            PendingKind::Load { kind: ReadKind::Fai { .. }, .. }
        ));
        interp.resume_with(0, Event::new(0, 1), Some(SVal::new(5))).unwrap();
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent {
                kind: PendingKind::Store { value, kind: WriteKind::Fai { .. }, .. },
                ..
            }) => assert_eq!(value, SVal::new(6)),
            other => panic!("expected fai write, got {other:?}"),
        }
    }

    #[test]
    fn mutex_lock_lowering_emits_lock_cas() {
        let mut pb = ProgramBuilder::new();
        let m = pb.global("m", Type::I32, Some(0));
        let mut f = pb.function("main");
        f.intrinsic_void(Intrinsic::MutexLock, vec![m]);
        f.intrinsic_void(Intrinsic::MutexUnlock, vec![m]);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        let ev = match interp.step(0).unwrap() {
            StepResult::Event(ev) => ev,
            other => panic!("expected lock cas, got {other:?}"),
        };
        match ev.kind {
            PendingKind::Load { kind: ReadKind::Cas { is_lock, .. }, annot, .. } => {
                assert!(is_lock);
                assert!(annot.is_some());
            }
            other => panic!("expected cas read, got {other:?}"),
        }
        // Lock free: the CAS succeeds, the write half follows.
        interp.resume_with(0, Event::new(0, 1), Some(SVal::new(0))).unwrap();
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent {
                kind: PendingKind::Store { kind: WriteKind::Cas { is_lock: true }, .. },
                ..
            }) => {}
            other => panic!("expected cas write, got {other:?}"),
        }
    }

    #[test]
    fn lock_held_parks_the_thread() {
        let mut pb = ProgramBuilder::new();
        let m = pb.global("m", Type::I32, Some(0));
        let mut f = pb.function("main");
        f.intrinsic_void(Intrinsic::MutexLock, vec![m]);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        let _ = interp.step(0).unwrap();
        // Lock observed taken: no write, a blocked marker instead.
        interp.resume_with(0, Event::new(0, 1), Some(SVal::new(1))).unwrap();
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent { kind: PendingKind::LockBlocked, .. }) => {}
            other => panic!("expected lock block, got {other:?}"),
        }
    }

    #[test]
    fn barrier_wait_lowers_to_fai_then_annotated_wait() {
        let mut pb = ProgramBuilder::new();
        let b = pb.global("b", Type::I32, Some(0));
        let mut f = pb.function("main");
        f.intrinsic_void(Intrinsic::BarrierInit, vec![b, Operand::imm(1)]);
        f.intrinsic_void(Intrinsic::BarrierWait, vec![b]);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        // Init store.
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent { kind: PendingKind::Store { value, .. }, .. }) => {
                assert_eq!(value, SVal::new(1));
            }
            other => panic!("expected init store, got {other:?}"),
        }
        // Arrival decrement.
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent {
                kind: PendingKind::Load { kind: ReadKind::Fai { is_barrier }, .. },
                ..
            }) => assert!(is_barrier),
            other => panic!("expected barrier fai, got {other:?}"),
        }
        interp.resume_with(0, Event::new(0, 2), Some(SVal::new(1))).unwrap();
        // The paired write of the decrement.
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent { kind: PendingKind::Store { value, .. }, .. }) => {
                assert_eq!(value, SVal::new(0));
            }
            other => panic!("expected barrier write, got {other:?}"),
        }
        // Wait-for-zero load, annotated as a barrier assume.
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent {
                kind: PendingKind::Load { annot: Some(a), .. },
                ..
            }) => assert_eq!(a.kind, AssumeKind::Barrier),
            other => panic!("expected annotated wait, got {other:?}"),
        }
        // All arrived: the wait is satisfied and the thread finishes.
        interp.resume_with(0, Event::new(0, 4), Some(SVal::new(0))).unwrap();
        assert!(matches!(interp.step(0).unwrap(), StepResult::Finished { .. }));
    }

    #[test]
    fn condvar_signal_lowers_to_generation_bump() {
        let mut pb = ProgramBuilder::new();
        let cv = pb.global("cv", Type::I32, Some(0));
        let mut f = pb.function("main");
        f.intrinsic_void(Intrinsic::CondSignal, vec![cv]);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent {
                kind: PendingKind::Load { kind: ReadKind::Fai { .. }, .. },
                ..
            }) => {}
            other => panic!("expected generation fai, got {other:?}"),
        }
        interp.resume_with(0, Event::new(0, 1), Some(SVal::new(3))).unwrap();
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent { kind: PendingKind::Store { value, .. }, .. }) => {
                assert_eq!(value, SVal::new(4));
            }
            other => panic!("expected generation write, got {other:?}"),
        }
    }

    #[test]
    fn atexit_handlers_run_after_main_returns() {
        let mut pb = ProgramBuilder::new();
        let x = pb.global("x", Type::I32, Some(0));
        let mut handler = pb.function("handler");
        handler.store(Type::I32, x, Operand::imm(9), MemOrdering::Relaxed);
        handler.ret();
        // The handler id is known before main is added.
        let handler_id = pb.add_function(handler);
        let mut f = pb.function("main");
        f.intrinsic_void(Intrinsic::AtExit, vec![Operand::Fun(handler_id)]);
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut interp = Interpreter::new(&module);
        interp.spawn_main();
        // Main returns, then the handler's store appears before the finish.
        match interp.step(0).unwrap() {
            StepResult::Event(PendingEvent { kind: PendingKind::Store { value, .. }, .. }) => {
                assert_eq!(value, SVal::new(9));
            }
            other => panic!("expected handler store, got {other:?}"),
        }
        assert!(matches!(interp.step(0).unwrap(), StepResult::Finished { .. }));
    }

    #[test]
    fn nondet_streams_are_deterministic_per_thread() {
        let mut pb = ProgramBuilder::new();
        let mut f = pb.function("main");
        f.ret();
        pb.add_function(f);
        let module = pb.finish();
        let mut a = Interpreter::new(&module);
        a.spawn_main();
        let mut b = Interpreter::new(&module);
        b.spawn_main();
        let xs: Vec<_> = (0..4).map(|_| a.threads[0].next_nondet()).collect();
        let ys: Vec<_> = (0..4).map(|_| b.threads[0].next_nondet()).collect();
        assert_eq!(xs, ys);
    }
}
