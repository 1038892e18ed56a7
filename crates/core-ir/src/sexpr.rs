use core_event::SVal;

use crate::inst::{BinOp, CmpPred, Reg};

/// A symbolic value expression over SSA registers.
///
/// The algebra is closed: constants, registers, select, logical not,
/// width casts, the integer binary operations and the comparisons. The
/// annotator builds these from `assume` conditions; the driver evaluates
/// them against candidate read values to cull infeasible reads-from choices.
/// Evaluation is best-effort: an unbound register makes the result unknown,
/// and unknown never prunes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    Concrete(SVal),
    Register(Reg),
    Select { cond: Box<SExpr>, then_expr: Box<SExpr>, else_expr: Box<SExpr> },
    Not(Box<SExpr>),
    ZExt { bits: u32, expr: Box<SExpr> },
    SExt { bits: u32, expr: Box<SExpr> },
    Trunc { bits: u32, expr: Box<SExpr> },
    Bin { op: BinOp, lhs: Box<SExpr>, rhs: Box<SExpr> },
    Cmp { pred: CmpPred, lhs: Box<SExpr>, rhs: Box<SExpr> },
}

impl SExpr {
    pub fn concrete(v: u64) -> Self {
        SExpr::Concrete(SVal::new(v))
    }

    /// All registers mentioned by the expression, in first-seen order.
    pub fn registers(&self) -> Vec<Reg> {
        let mut out = Vec::new();
        self.collect_registers(&mut out);
        out
    }

    fn collect_registers(&self, out: &mut Vec<Reg>) {
        match self {
            SExpr::Concrete(_) => {}
            SExpr::Register(r) => {
                if !out.contains(r) {
                    out.push(*r);
                }
            }
            SExpr::Select { cond, then_expr, else_expr } => {
                cond.collect_registers(out);
                then_expr.collect_registers(out);
                else_expr.collect_registers(out);
            }
            SExpr::Not(e)
            | SExpr::ZExt { expr: e, .. }
            | SExpr::SExt { expr: e, .. }
            | SExpr::Trunc { expr: e, .. } => e.collect_registers(out),
            SExpr::Bin { lhs, rhs, .. } | SExpr::Cmp { lhs, rhs, .. } => {
                lhs.collect_registers(out);
                rhs.collect_registers(out);
            }
        }
    }

    /// Evaluate under a register assignment. `None` means the value cannot
    /// be determined (unbound register, division by zero).
    pub fn eval(&self, env: &dyn Fn(Reg) -> Option<SVal>) -> Option<SVal> {
        match self {
            SExpr::Concrete(v) => Some(*v),
            SExpr::Register(r) => env(*r),
            SExpr::Select { cond, then_expr, else_expr } => {
                if cond.eval(env)?.is_zero() {
                    else_expr.eval(env)
                } else {
                    then_expr.eval(env)
                }
            }
            SExpr::Not(e) => Some(SVal::from(e.eval(env)?.is_zero())),
            SExpr::ZExt { bits, expr } => Some(expr.eval(env)?.truncate(*bits)),
            SExpr::SExt { bits, expr } => Some(expr.eval(env)?.sign_extend(*bits)),
            SExpr::Trunc { bits, expr } => Some(expr.eval(env)?.truncate(*bits)),
            SExpr::Bin { op, lhs, rhs } => {
                let l = lhs.eval(env)?;
                let r = rhs.eval(env)?;
                eval_bin(*op, l, r)
            }
            SExpr::Cmp { pred, lhs, rhs } => {
                let l = lhs.eval(env)?;
                let r = rhs.eval(env)?;
                Some(SVal::from(eval_cmp(*pred, l, r)))
            }
        }
    }
}

/// Evaluate one binary operation; `None` on division by zero.
pub fn eval_bin(op: BinOp, l: SVal, r: SVal) -> Option<SVal> {
    let (a, b) = (l.get(), r.get());
    Some(SVal::new(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::UDiv => a.checked_div(b)?,
        BinOp::SDiv => (l.as_i64().checked_div(r.as_i64())?) as u64,
        BinOp::URem => a.checked_rem(b)?,
        BinOp::SRem => (l.as_i64().checked_rem(r.as_i64())?) as u64,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::LShr => a.wrapping_shr(b as u32),
        BinOp::AShr => (l.as_i64().wrapping_shr(b as u32)) as u64,
    }))
}

/// Evaluate one comparison predicate.
pub fn eval_cmp(pred: CmpPred, l: SVal, r: SVal) -> bool {
    let (a, b) = (l.get(), r.get());
    let (sa, sb) = (l.as_i64(), r.as_i64());
    match pred {
        CmpPred::Eq => a == b,
        CmpPred::Ne => a != b,
        CmpPred::ULt => a < b,
        CmpPred::ULe => a <= b,
        CmpPred::UGt => a > b,
        CmpPred::UGe => a >= b,
        CmpPred::SLt => sa < sb,
        CmpPred::SLe => sa <= sb,
        CmpPred::SGt => sa > sb,
        CmpPred::SGe => sa >= sb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg_is(r: Reg, v: u64) -> impl Fn(Reg) -> Option<SVal> {
        move |q| (q == r).then(|| SVal::new(v))
    }

    #[test]
    fn evaluates_comparison_against_register() {
        // (r0 == 1)
        let e = SExpr::Cmp {
            pred: CmpPred::Eq,
            lhs: Box::new(SExpr::Register(Reg(0))),
            rhs: Box::new(SExpr::concrete(1)),
        };
        assert_eq!(e.eval(&reg_is(Reg(0), 1)), Some(SVal::new(1)));
        assert_eq!(e.eval(&reg_is(Reg(0), 2)), Some(SVal::new(0)));
        assert_eq!(e.eval(&reg_is(Reg(7), 1)), None);
    }

    #[test]
    fn division_by_zero_is_unknown_not_a_panic() {
        let e = SExpr::Bin {
            op: BinOp::UDiv,
            lhs: Box::new(SExpr::concrete(4)),
            rhs: Box::new(SExpr::Register(Reg(0))),
        };
        assert_eq!(e.eval(&reg_is(Reg(0), 0)), None);
        assert_eq!(e.eval(&reg_is(Reg(0), 2)), Some(SVal::new(2)));
    }

    #[test]
    fn signed_comparisons_respect_sign() {
        let e = SExpr::Cmp {
            pred: CmpPred::SLt,
            lhs: Box::new(SExpr::Concrete(SVal::from_i64(-1))),
            rhs: Box::new(SExpr::concrete(0)),
        };
        assert_eq!(e.eval(&|_| None), Some(SVal::new(1)));
    }

    #[test]
    fn register_collection_dedupes() {
        let e = SExpr::Bin {
            op: BinOp::Add,
            lhs: Box::new(SExpr::Register(Reg(3))),
            rhs: Box::new(SExpr::Register(Reg(3))),
        };
        assert_eq!(e.registers(), vec![Reg(3)]);
    }
}
