use std::fmt;
use std::str::FromStr;

use core_event::{MemOrdering, SVal, SmpFenceKind};

use crate::types::Type;

/// An SSA register, unique within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Index of a function within the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunId(pub u32);

/// Index of a global within the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Const(SVal),
    Global(GlobalId),
    Fun(FunId),
}

impl Operand {
    pub const fn imm(value: i64) -> Self {
        Operand::Const(SVal::from_i64(value))
    }

    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    ULt,
    ULe,
    UGt,
    UGe,
    SLt,
    SLe,
    SGt,
    SGe,
}

/// Read-modify-write flavour of an atomic `rmw` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RmwOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Xchg,
}

/// The modeled internal functions. Each has a handler in the interpreter
/// that may emit several labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Assert,
    Assume,
    NondetInt,
    LoopBegin,
    SpinStart,
    SpinEnd,
    OptBegin,
    Malloc,
    AlignedAlloc,
    Free,
    ThreadCreate,
    ThreadJoin,
    ThreadExit,
    MutexInit,
    MutexLock,
    MutexTrylock,
    MutexUnlock,
    MutexDestroy,
    BarrierInit,
    BarrierWait,
    CondInit,
    CondWait,
    CondSignal,
    CondBroadcast,
    CondDestroy,
    RcuReadLock,
    RcuReadUnlock,
    RcuSynchronize,
    AtExit,
    DskOpen,
    DskRead,
    DskWrite,
    DskFsync,
    DskSync,
    DskPbarrier,
}

impl FromStr for Intrinsic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Intrinsic::*;
        Ok(match s {
            "assert" => Assert,
            "assume" => Assume,
            "nondet_int" => NondetInt,
            "loop_begin" => LoopBegin,
            "spin_start" => SpinStart,
            "spin_end" => SpinEnd,
            "opt_begin" => OptBegin,
            "malloc" => Malloc,
            "aligned_alloc" => AlignedAlloc,
            "free" => Free,
            "thread_create" => ThreadCreate,
            "thread_join" => ThreadJoin,
            "thread_exit" => ThreadExit,
            "mutex_init" => MutexInit,
            "mutex_lock" => MutexLock,
            "mutex_trylock" => MutexTrylock,
            "mutex_unlock" => MutexUnlock,
            "mutex_destroy" => MutexDestroy,
            "barrier_init" => BarrierInit,
            "barrier_wait" => BarrierWait,
            "cond_init" => CondInit,
            "cond_wait" => CondWait,
            "cond_signal" => CondSignal,
            "cond_broadcast" => CondBroadcast,
            "cond_destroy" => CondDestroy,
            "rcu_read_lock" => RcuReadLock,
            "rcu_read_unlock" => RcuReadUnlock,
            "rcu_synchronize" => RcuSynchronize,
            "atexit" => AtExit,
            "open" => DskOpen,
            "disk_read" => DskRead,
            "disk_write" => DskWrite,
            "fsync" => DskFsync,
            "sync" => DskSync,
            "pbarrier" => DskPbarrier,
            other => return Err(format!("unknown intrinsic `{other}`")),
        })
    }
}

/// Call target: a module function, a modeled internal function, or an
/// indirect call through a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Fun(FunId),
    Intrinsic(Intrinsic),
    Indirect(Operand),
}

/// A phi node; phis are listed at the head of their block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    pub dst: Reg,
    pub ty: Type,
    pub incoming: Vec<(BlockId, Operand)>,
}

/// Straight-line instructions. Lifetime markers and debug intrinsics are
/// dropped by the front ends, so nothing here is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Bin { dst: Reg, op: BinOp, ty: Type, lhs: Operand, rhs: Operand },
    Cmp { dst: Reg, pred: CmpPred, ty: Type, lhs: Operand, rhs: Operand },
    Select { dst: Reg, cond: Operand, then_val: Operand, else_val: Operand },
    ZExt { dst: Reg, from: Type, to: Type, src: Operand },
    SExt { dst: Reg, from: Type, to: Type, src: Operand },
    Trunc { dst: Reg, from: Type, to: Type, src: Operand },
    /// Byte-offset pointer arithmetic.
    PtrAdd { dst: Reg, base: Operand, offset: Operand },
    Alloca { dst: Reg, ty: Type },
    Load { dst: Reg, ty: Type, addr: Operand, ord: MemOrdering },
    Store { ty: Type, addr: Operand, value: Operand, ord: MemOrdering },
    Rmw { dst: Reg, ty: Type, addr: Operand, op: RmwOp, operand: Operand, ord: MemOrdering },
    CmpXchg { dst: Reg, ty: Type, addr: Operand, expected: Operand, new: Operand, ord: MemOrdering },
    Fence { ord: MemOrdering },
    SmpFence { kind: SmpFenceKind },
    Call { dst: Option<Reg>, callee: Callee, args: Vec<Operand> },
}

impl Inst {
    /// The register this instruction defines, if any.
    pub fn def(&self) -> Option<Reg> {
        match self {
            Inst::Bin { dst, .. }
            | Inst::Cmp { dst, .. }
            | Inst::Select { dst, .. }
            | Inst::ZExt { dst, .. }
            | Inst::SExt { dst, .. }
            | Inst::Trunc { dst, .. }
            | Inst::PtrAdd { dst, .. }
            | Inst::Alloca { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::Rmw { dst, .. }
            | Inst::CmpXchg { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } => *dst,
            Inst::Store { .. } | Inst::Fence { .. } | Inst::SmpFence { .. } => None,
        }
    }

    /// The operands this instruction reads.
    pub fn uses(&self) -> Vec<Operand> {
        match self {
            Inst::Bin { lhs, rhs, .. } | Inst::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Select { cond, then_val, else_val, .. } => vec![*cond, *then_val, *else_val],
            Inst::ZExt { src, .. } | Inst::SExt { src, .. } | Inst::Trunc { src, .. } => {
                vec![*src]
            }
            Inst::PtrAdd { base, offset, .. } => vec![*base, *offset],
            Inst::Alloca { .. } => vec![],
            Inst::Load { addr, .. } => vec![*addr],
            Inst::Store { addr, value, .. } => vec![*addr, *value],
            Inst::Rmw { addr, operand, .. } => vec![*addr, *operand],
            Inst::CmpXchg { addr, expected, new, .. } => vec![*addr, *expected, *new],
            Inst::Fence { .. } | Inst::SmpFence { .. } => vec![],
            Inst::Call { callee, args, .. } => {
                let mut out = args.clone();
                if let Callee::Indirect(op) = callee {
                    out.push(*op);
                }
                out
            }
        }
    }
}

/// Block terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Operand, then_bb: BlockId, else_bb: BlockId },
    Switch { value: Operand, cases: Vec<(u64, BlockId)>, default: BlockId },
    Ret(Option<Operand>),
    Unreachable,
}
