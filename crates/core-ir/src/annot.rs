use ahash::AHashMap;
use core_event::{AssumeKind, SVal};

use crate::inst::{BlockId, Callee, FunId, Inst, Intrinsic, Operand, Reg};
use crate::module::{Module, SourceLoc};
use crate::sexpr::SExpr;

/// A pruning annotation attached to a load: the symbolic condition of an
/// `assume` downstream of the loaded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub kind: AssumeKind,
    pub expr: SExpr,
}

impl Annotation {
    /// Whether a candidate value for the annotated load can satisfy the
    /// assume. Unknown evaluations never prune.
    pub fn admits(&self, load_reg: Reg, value: SVal) -> bool {
        let env = |r: Reg| (r == load_reg).then_some(value);
        match self.expr.eval(&env) {
            Some(v) => !v.is_zero(),
            None => true,
        }
    }
}

const MAX_TRACE_DEPTH: u32 = 64;

/// Trace every `assume`/`spin_end` condition in the module back through SSA
/// and attach an annotation to each load the condition hinges on. Purely a
/// pruning aid: loads left unannotated cost exploration time, not
/// correctness.
pub fn annotate_module(module: &mut Module) {
    let mut annotations: AHashMap<SourceLoc, Annotation> = AHashMap::new();
    for (fi, fun) in module.functions.iter().enumerate() {
        let fun_id = FunId(fi as u32);
        // Register definitions; phis are boundaries the tracer gives up on.
        let mut defs: AHashMap<Reg, (BlockId, u32)> = AHashMap::new();
        for (bi, block) in fun.blocks.iter().enumerate() {
            for (ii, inst) in block.insts.iter().enumerate() {
                if let Some(dst) = inst.def() {
                    defs.insert(dst, (BlockId(bi as u32), ii as u32));
                }
            }
        }
        for block in &fun.blocks {
            for inst in &block.insts {
                let Inst::Call { callee: Callee::Intrinsic(intr), args, .. } = inst else {
                    continue;
                };
                let kind = match intr {
                    Intrinsic::Assume => AssumeKind::User,
                    Intrinsic::SpinEnd => AssumeKind::Spinloop,
                    _ => continue,
                };
                let Some(&cond) = args.first() else { continue };
                let Some(expr) = trace(fun_id, module, &defs, cond, 0) else {
                    continue;
                };
                let regs = expr.registers();
                // Only single-load conditions are usable for pruning: the
                // driver substitutes one candidate value at a time.
                if regs.len() != 1 {
                    continue;
                }
                let load_reg = regs[0];
                let Some(&(load_bb, load_idx)) = defs.get(&load_reg) else {
                    continue;
                };
                let loc = SourceLoc { fun: fun_id, block: load_bb, inst: load_idx };
                annotations.insert(loc, Annotation { kind, expr });
            }
        }
    }
    module.info.load_annotations.extend(annotations);
}

fn trace(
    fun: FunId,
    module: &Module,
    defs: &AHashMap<Reg, (BlockId, u32)>,
    op: Operand,
    depth: u32,
) -> Option<SExpr> {
    if depth > MAX_TRACE_DEPTH {
        return None;
    }
    match op {
        Operand::Const(v) => Some(SExpr::Concrete(v)),
        Operand::Global(_) | Operand::Fun(_) => None,
        Operand::Reg(r) => {
            let &(bb, idx) = defs.get(&r)?;
            let inst = &module.fun(fun).blocks[bb.0 as usize].insts[idx as usize];
            let sub = |op: Operand| trace(fun, module, defs, op, depth + 1);
            match inst {
                Inst::Load { dst, .. } => Some(SExpr::Register(*dst)),
                Inst::Bin { op, lhs, rhs, .. } => Some(SExpr::Bin {
                    op: *op,
                    lhs: Box::new(sub(*lhs)?),
                    rhs: Box::new(sub(*rhs)?),
                }),
                Inst::Cmp { pred, lhs, rhs, .. } => Some(SExpr::Cmp {
                    pred: *pred,
                    lhs: Box::new(sub(*lhs)?),
                    rhs: Box::new(sub(*rhs)?),
                }),
                Inst::Select { cond, then_val, else_val, .. } => Some(SExpr::Select {
                    cond: Box::new(sub(*cond)?),
                    then_expr: Box::new(sub(*then_val)?),
                    else_expr: Box::new(sub(*else_val)?),
                }),
                Inst::ZExt { to, src, .. } => {
                    Some(SExpr::ZExt { bits: to.bits(), expr: Box::new(sub(*src)?) })
                }
                Inst::SExt { to, src, .. } => {
                    Some(SExpr::SExt { bits: to.bits(), expr: Box::new(sub(*src)?) })
                }
                Inst::Trunc { to, src, .. } => {
                    Some(SExpr::Trunc { bits: to.bits(), expr: Box::new(sub(*src)?) })
                }
                // RMWs, calls, allocas and pointer arithmetic end the trace.
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::inst::CmpPred;
    use crate::types::Type;
    use core_event::MemOrdering;

    #[test]
    fn assume_on_loaded_flag_annotates_the_load() {
        let mut pb = ProgramBuilder::new();
        let flag = pb.global("flag", Type::I32, Some(0));
        let mut f = pb.function("main");
        let v = f.load(Type::I32, flag, MemOrdering::Acquire);
        let c = f.cmp(CmpPred::Eq, Type::I32, v.into(), Operand::imm(1));
        f.assume(c.into());
        f.ret();
        pb.add_function(f);
        let mut module = pb.finish();
        annotate_module(&mut module);

        assert_eq!(module.info.load_annotations.len(), 1);
        let annot = module.info.load_annotations.values().next().unwrap();
        assert_eq!(annot.kind, AssumeKind::User);
        assert!(annot.admits(v, SVal::new(1)));
        assert!(!annot.admits(v, SVal::new(0)));
    }

    #[test]
    fn two_load_conditions_are_left_unannotated() {
        let mut pb = ProgramBuilder::new();
        let x = pb.global("x", Type::I32, Some(0));
        let y = pb.global("y", Type::I32, Some(0));
        let mut f = pb.function("main");
        let a = f.load(Type::I32, x, MemOrdering::Relaxed);
        let b = f.load(Type::I32, y, MemOrdering::Relaxed);
        let c = f.cmp(CmpPred::Eq, Type::I32, a.into(), b.into());
        f.assume(c.into());
        f.ret();
        pb.add_function(f);
        let mut module = pb.finish();
        annotate_module(&mut module);
        assert!(module.info.load_annotations.is_empty());
    }
}
