use ahash::AHashMap;
use core_event::MemOrdering;

use crate::inst::{
    BinOp, BlockId, Callee, CmpPred, FunId, Inst, Intrinsic, Operand, Phi, Reg, RmwOp,
    Terminator,
};
use crate::module::{BasicBlock, Function, Global, Module};
use crate::types::Type;
use crate::IrError;
use core_event::{SAddr, SVal};

/// Parse a `.wir` textual module.
///
/// The format is line-oriented: `global` declarations, then `fn` bodies made
/// of labeled blocks with one instruction per line. `@name` references
/// globals and functions, `rN` references SSA registers, bare integers are
/// constants. Orderings are spelled `na|rlx|acq|rel|acq_rel|sc` and default
/// to `na` where omitted. `#` starts a comment.
pub fn parse_module(text: &str) -> Result<Module, IrError> {
    Parser::new(text).run()
}

struct Parser<'a> {
    lines: Vec<(usize, &'a str)>,
    pos: usize,
    globals: Vec<Global>,
    global_ids: AHashMap<String, u32>,
    fun_ids: AHashMap<String, u32>,
}

fn err(line: usize, msg: impl Into<String>) -> IrError {
    IrError::Parse { line, msg: msg.into() }
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| {
                let l = l.split('#').next().unwrap_or("").trim();
                (i + 1, l)
            })
            .filter(|(_, l)| !l.is_empty())
            .collect();
        Self {
            lines,
            pos: 0,
            globals: Vec::new(),
            global_ids: AHashMap::new(),
            fun_ids: AHashMap::new(),
        }
    }

    fn run(mut self) -> Result<Module, IrError> {
        // Pre-scan function names so calls can refer forward.
        let mut n = 0u32;
        for &(ln, line) in &self.lines {
            if let Some(rest) = line.strip_prefix("fn ") {
                let name = rest
                    .split('(')
                    .next()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| err(ln, "missing function name"))?;
                if self.fun_ids.insert(name.to_string(), n).is_some() {
                    return Err(err(ln, format!("duplicate function `{name}`")));
                }
                n += 1;
            }
        }

        let mut functions = Vec::new();
        while self.pos < self.lines.len() {
            let (ln, line) = self.lines[self.pos];
            if line.starts_with("global ") {
                self.parse_global(ln, line)?;
                self.pos += 1;
            } else if line.starts_with("fn ") {
                functions.push(self.parse_function()?);
            } else {
                return Err(err(ln, format!("expected `global` or `fn`, got `{line}`")));
            }
        }

        let mut module = Module {
            globals: self.globals,
            functions,
            info: Default::default(),
        };
        // LKMM-only primitives in the input suggest the kernel model.
        let uses_lkmm = module.functions.iter().any(|f| {
            f.blocks.iter().any(|b| {
                b.insts.iter().any(|i| {
                    matches!(i, Inst::SmpFence { .. })
                        || matches!(
                            i,
                            Inst::Call {
                                callee: Callee::Intrinsic(
                                    Intrinsic::RcuReadLock
                                        | Intrinsic::RcuReadUnlock
                                        | Intrinsic::RcuSynchronize
                                ),
                                ..
                            }
                        )
                })
            })
        });
        if uses_lkmm {
            module.info.model_hint = Some("lkmm".to_string());
        }
        module.layout();
        module.validate()?;
        Ok(module)
    }

    fn parse_global(&mut self, ln: usize, line: &str) -> Result<(), IrError> {
        // global x : i32 [= init]
        let rest = line.strip_prefix("global ").expect("caller checked prefix");
        let (name_part, rest) = rest
            .split_once(':')
            .ok_or_else(|| err(ln, "expected `global <name> : <type>`"))?;
        let name = name_part.trim();
        let (ty_part, init) = match rest.split_once('=') {
            Some((t, v)) => {
                let v = v.trim().parse::<i64>().map_err(|_| err(ln, "bad initializer"))?;
                (t.trim(), Some(SVal::from_i64(v)))
            }
            None => (rest.trim(), None),
        };
        let ty = parse_type(ln, ty_part)?;
        let id = self.globals.len() as u32;
        if self.global_ids.insert(name.to_string(), id).is_some() {
            return Err(err(ln, format!("duplicate global `{name}`")));
        }
        self.globals.push(Global {
            name: name.to_string(),
            ty,
            init,
            addr: SAddr::static_addr(0),
        });
        Ok(())
    }

    fn parse_function(&mut self) -> Result<Function, IrError> {
        let (ln, header) = self.lines[self.pos];
        self.pos += 1;
        let rest = header.strip_prefix("fn ").expect("caller checked prefix");
        let open = rest.find('(').ok_or_else(|| err(ln, "missing `(` in fn header"))?;
        let name = rest[..open].trim().to_string();
        let close = rest.find(')').ok_or_else(|| err(ln, "missing `)` in fn header"))?;
        let params: Vec<Reg> = rest[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_reg(ln, s))
            .collect::<Result<_, _>>()?;
        if !rest[close + 1..].trim_start().starts_with('{') {
            return Err(err(ln, "expected `{` after fn header"));
        }

        // Collect the body and the block labels (in order of appearance).
        let start = self.pos;
        let mut blocks: AHashMap<String, u32> = AHashMap::new();
        let mut order = Vec::new();
        loop {
            if self.pos >= self.lines.len() {
                return Err(err(ln, format!("unterminated body of `{name}`")));
            }
            let (bln, line) = self.lines[self.pos];
            if line == "}" {
                break;
            }
            if let Some(label) = line.strip_suffix(':') {
                if blocks.insert(label.to_string(), order.len() as u32).is_some() {
                    return Err(err(bln, format!("duplicate block label `{label}`")));
                }
                order.push(label.to_string());
            }
            self.pos += 1;
        }
        let end = self.pos;
        self.pos += 1; // consume `}`
        if order.is_empty() {
            return Err(err(ln, format!("function `{name}` has no blocks")));
        }

        let mut out: Vec<(Vec<Phi>, Vec<Inst>, Option<Terminator>)> =
            (0..order.len()).map(|_| (Vec::new(), Vec::new(), None)).collect();
        let mut current: Option<usize> = None;
        let mut max_reg = params.iter().map(|r| r.0 + 1).max().unwrap_or(0);

        for i in start..end {
            let (iln, line) = self.lines[i];
            if let Some(label) = line.strip_suffix(':') {
                current = Some(blocks[label] as usize);
                continue;
            }
            let bb = current.ok_or_else(|| err(iln, "instruction before first block label"))?;
            if out[bb].2.is_some() {
                return Err(err(iln, "instruction after block terminator"));
            }
            let ctx = InstCtx { blocks: &blocks, globals: &self.global_ids, funs: &self.fun_ids };
            match parse_line(iln, line, &ctx)? {
                Parsed::Phi(phi) => {
                    if !out[bb].1.is_empty() {
                        return Err(err(iln, "phi after non-phi instruction"));
                    }
                    max_reg = max_reg.max(phi.dst.0 + 1);
                    out[bb].0.push(phi);
                }
                Parsed::Inst(inst) => {
                    if let Some(d) = inst.def() {
                        max_reg = max_reg.max(d.0 + 1);
                    }
                    out[bb].1.push(inst);
                }
                Parsed::Term(t) => out[bb].2 = Some(t),
            }
        }

        let blocks = out
            .into_iter()
            .enumerate()
            .map(|(i, (phis, insts, term))| {
                term.map(|term| BasicBlock { phis, insts, term })
                    .ok_or_else(|| err(ln, format!("block `{}` lacks a terminator", order[i])))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Function { name, params, blocks, num_regs: max_reg })
    }
}

struct InstCtx<'a> {
    blocks: &'a AHashMap<String, u32>,
    globals: &'a AHashMap<String, u32>,
    funs: &'a AHashMap<String, u32>,
}

enum Parsed {
    Phi(Phi),
    Inst(Inst),
    Term(Terminator),
}

fn parse_type(ln: usize, s: &str) -> Result<Type, IrError> {
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let (len, elem) = inner
            .split_once('x')
            .ok_or_else(|| err(ln, "expected `[N x ty]`"))?;
        let len = len.trim().parse::<u64>().map_err(|_| err(ln, "bad array length"))?;
        return Ok(Type::Array(Box::new(parse_type(ln, elem)?), len));
    }
    match s {
        "void" => Ok(Type::Void),
        "ptr" => Ok(Type::Ptr),
        _ => s
            .strip_prefix('i')
            .and_then(|bits| bits.parse::<u32>().ok())
            .filter(|b| matches!(b, 1 | 8 | 16 | 32 | 64))
            .map(Type::Int)
            .ok_or_else(|| err(ln, format!("unknown type `{s}`"))),
    }
}

fn parse_reg(ln: usize, s: &str) -> Result<Reg, IrError> {
    s.strip_prefix('r')
        .and_then(|n| n.parse::<u32>().ok())
        .map(Reg)
        .ok_or_else(|| err(ln, format!("expected register, got `{s}`")))
}

fn parse_operand(ln: usize, s: &str, ctx: &InstCtx) -> Result<Operand, IrError> {
    let s = s.trim();
    if let Some(name) = s.strip_prefix('@') {
        if let Some(&g) = ctx.globals.get(name) {
            return Ok(Operand::Global(crate::inst::GlobalId(g)));
        }
        if let Some(&f) = ctx.funs.get(name) {
            return Ok(Operand::Fun(FunId(f)));
        }
        return Err(err(ln, format!("unknown symbol `@{name}`")));
    }
    if s.starts_with('r') && s[1..].chars().all(|c| c.is_ascii_digit()) && s.len() > 1 {
        return parse_reg(ln, s).map(Operand::Reg);
    }
    s.parse::<i64>()
        .map(Operand::imm)
        .map_err(|_| err(ln, format!("bad operand `{s}`")))
}

fn parse_block_ref(ln: usize, s: &str, ctx: &InstCtx) -> Result<BlockId, IrError> {
    ctx.blocks
        .get(s.trim())
        .map(|&i| BlockId(i))
        .ok_or_else(|| err(ln, format!("unknown block `{}`", s.trim())))
}

fn parse_ord(ln: usize, s: Option<&str>) -> Result<MemOrdering, IrError> {
    match s {
        None => Ok(MemOrdering::NotAtomic),
        Some(s) => s
            .parse::<MemOrdering>()
            .map_err(|_| err(ln, format!("unknown ordering `{s}`"))),
    }
}

fn split_args(s: &str) -> Vec<&str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn parse_line(ln: usize, line: &str, ctx: &InstCtx) -> Result<Parsed, IrError> {
    // Terminators and void instructions first.
    let words: Vec<&str> = line.split_whitespace().collect();
    match words[0] {
        "ret" => {
            let val = words
                .get(1)
                .map(|s| parse_operand(ln, s, ctx))
                .transpose()?;
            return Ok(Parsed::Term(Terminator::Ret(val)));
        }
        "unreachable" => return Ok(Parsed::Term(Terminator::Unreachable)),
        "br" => {
            let rest = line["br".len()..].trim();
            let parts = split_args(rest);
            return match parts.len() {
                1 => Ok(Parsed::Term(Terminator::Br(parse_block_ref(ln, parts[0], ctx)?))),
                3 => Ok(Parsed::Term(Terminator::CondBr {
                    cond: parse_operand(ln, parts[0], ctx)?,
                    then_bb: parse_block_ref(ln, parts[1], ctx)?,
                    else_bb: parse_block_ref(ln, parts[2], ctx)?,
                })),
                _ => Err(err(ln, "expected `br bb` or `br cond, bb, bb`")),
            };
        }
        "switch" => {
            // switch r1, [0 -> bb1, 1 -> bb2], bb3
            let rest = line["switch".len()..].trim();
            let open = rest.find('[').ok_or_else(|| err(ln, "missing `[` in switch"))?;
            let close = rest.find(']').ok_or_else(|| err(ln, "missing `]` in switch"))?;
            let value = parse_operand(ln, rest[..open].trim_end_matches(',').trim(), ctx)?;
            let mut cases = Vec::new();
            for c in split_args(&rest[open + 1..close]) {
                let (v, bb) = c
                    .split_once("->")
                    .ok_or_else(|| err(ln, "expected `val -> bb` in switch case"))?;
                let v = v.trim().parse::<u64>().map_err(|_| err(ln, "bad case value"))?;
                cases.push((v, parse_block_ref(ln, bb, ctx)?));
            }
            let default =
                parse_block_ref(ln, rest[close + 1..].trim().trim_start_matches(','), ctx)?;
            return Ok(Parsed::Term(Terminator::Switch { value, cases, default }));
        }
        "store" => {
            // store <ty> <addr>, <val> [ord]
            let rest = line["store".len()..].trim();
            let mut toks = rest.split_whitespace();
            let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let rest: String = toks.collect::<Vec<_>>().join(" ");
            let (args, ord) = strip_trailing_ord(&rest);
            let parts = split_args(args);
            if parts.len() != 2 {
                return Err(err(ln, "expected `store ty addr, val [ord]`"));
            }
            return Ok(Parsed::Inst(Inst::Store {
                ty,
                addr: parse_operand(ln, parts[0], ctx)?,
                value: parse_operand(ln, parts[1], ctx)?,
                ord: parse_ord(ln, ord)?,
            }));
        }
        "fence" => {
            return Ok(Parsed::Inst(Inst::Fence { ord: parse_ord(ln, words.get(1).copied())? }));
        }
        "smp_fence" => {
            let kind = words
                .get(1)
                .ok_or_else(|| err(ln, "missing smp fence kind"))?
                .parse()
                .map_err(|e: String| err(ln, e))?;
            return Ok(Parsed::Inst(Inst::SmpFence { kind }));
        }
        "call" => {
            let (callee, args) = parse_call(ln, line["call".len()..].trim(), ctx)?;
            return Ok(Parsed::Inst(Inst::Call { dst: None, callee, args }));
        }
        _ => {}
    }

    // `rN = ...` forms.
    let (dst_part, rhs) = line
        .split_once('=')
        .ok_or_else(|| err(ln, format!("unrecognised instruction `{line}`")))?;
    let dst = parse_reg(ln, dst_part.trim())?;
    let rhs = rhs.trim();
    let mut toks = rhs.split_whitespace();
    let op = toks.next().ok_or_else(|| err(ln, "empty instruction"))?;
    let rest = rhs[op.len()..].trim();

    let bin_op = |name: &str| -> Option<BinOp> {
        Some(match name {
            "add" => BinOp::Add,
            "sub" => BinOp::Sub,
            "mul" => BinOp::Mul,
            "udiv" => BinOp::UDiv,
            "sdiv" => BinOp::SDiv,
            "urem" => BinOp::URem,
            "srem" => BinOp::SRem,
            "and" => BinOp::And,
            "or" => BinOp::Or,
            "xor" => BinOp::Xor,
            "shl" => BinOp::Shl,
            "lshr" => BinOp::LShr,
            "ashr" => BinOp::AShr,
            _ => return None,
        })
    };
    let cmp_pred = |name: &str| -> Option<CmpPred> {
        Some(match name {
            "eq" => CmpPred::Eq,
            "ne" => CmpPred::Ne,
            "ult" => CmpPred::ULt,
            "ule" => CmpPred::ULe,
            "ugt" => CmpPred::UGt,
            "uge" => CmpPred::UGe,
            "slt" => CmpPred::SLt,
            "sle" => CmpPred::SLe,
            "sgt" => CmpPred::SGt,
            "sge" => CmpPred::SGe,
            _ => return None,
        })
    };

    if let Some(b) = bin_op(op) {
        let mut toks = rest.split_whitespace();
        let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
        let parts = split_args(rest[rest.find(char::is_whitespace).unwrap_or(0)..].trim());
        if parts.len() != 2 {
            return Err(err(ln, "expected two operands"));
        }
        return Ok(Parsed::Inst(Inst::Bin {
            dst,
            op: b,
            ty,
            lhs: parse_operand(ln, parts[0], ctx)?,
            rhs: parse_operand(ln, parts[1], ctx)?,
        }));
    }
    if let Some(p) = cmp_pred(op) {
        let mut toks = rest.split_whitespace();
        let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
        let parts = split_args(rest[rest.find(char::is_whitespace).unwrap_or(0)..].trim());
        if parts.len() != 2 {
            return Err(err(ln, "expected two operands"));
        }
        return Ok(Parsed::Inst(Inst::Cmp {
            dst,
            pred: p,
            ty,
            lhs: parse_operand(ln, parts[0], ctx)?,
            rhs: parse_operand(ln, parts[1], ctx)?,
        }));
    }

    match op {
        "load" => {
            // rN = load ty addr [ord]
            let mut toks = rest.split_whitespace();
            let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let addr = parse_operand(ln, toks.next().ok_or_else(|| err(ln, "missing addr"))?, ctx)?;
            let ord = parse_ord(ln, toks.next())?;
            Ok(Parsed::Inst(Inst::Load { dst, ty, addr, ord }))
        }
        "fai" => {
            // rN = fai ty addr op operand [ord]
            let mut toks = rest.split_whitespace();
            let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let addr = parse_operand(ln, toks.next().ok_or_else(|| err(ln, "missing addr"))?, ctx)?;
            let op = match toks.next() {
                Some("add") => RmwOp::Add,
                Some("sub") => RmwOp::Sub,
                Some("and") => RmwOp::And,
                Some("or") => RmwOp::Or,
                Some("xor") => RmwOp::Xor,
                Some("xchg") => RmwOp::Xchg,
                other => return Err(err(ln, format!("bad rmw op `{other:?}`"))),
            };
            let operand =
                parse_operand(ln, toks.next().ok_or_else(|| err(ln, "missing operand"))?, ctx)?;
            let ord = parse_ord(ln, toks.next())?;
            Ok(Parsed::Inst(Inst::Rmw { dst, ty, addr, op, operand, ord }))
        }
        "cas" => {
            // rN = cas ty addr, expected, new [ord]
            let mut toks = rest.split_whitespace();
            let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let rest = rest[rest.find(char::is_whitespace).unwrap_or(0)..].trim();
            let (args, ord) = strip_trailing_ord(rest);
            let parts = split_args(args);
            if parts.len() != 3 {
                return Err(err(ln, "expected `cas ty addr, expected, new [ord]`"));
            }
            Ok(Parsed::Inst(Inst::CmpXchg {
                dst,
                ty,
                addr: parse_operand(ln, parts[0], ctx)?,
                expected: parse_operand(ln, parts[1], ctx)?,
                new: parse_operand(ln, parts[2], ctx)?,
                ord: parse_ord(ln, ord)?,
            }))
        }
        "select" => {
            let parts = split_args(rest);
            if parts.len() != 3 {
                return Err(err(ln, "expected `select cond, a, b`"));
            }
            Ok(Parsed::Inst(Inst::Select {
                dst,
                cond: parse_operand(ln, parts[0], ctx)?,
                then_val: parse_operand(ln, parts[1], ctx)?,
                else_val: parse_operand(ln, parts[2], ctx)?,
            }))
        }
        "zext" | "sext" | "trunc" => {
            let mut toks = rest.split_whitespace();
            let from = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let to = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let src = parse_operand(ln, toks.next().ok_or_else(|| err(ln, "missing src"))?, ctx)?;
            Ok(Parsed::Inst(match op {
                "zext" => Inst::ZExt { dst, from, to, src },
                "sext" => Inst::SExt { dst, from, to, src },
                _ => Inst::Trunc { dst, from, to, src },
            }))
        }
        "ptradd" => {
            let parts = split_args(rest);
            if parts.len() != 2 {
                return Err(err(ln, "expected `ptradd base, offset`"));
            }
            Ok(Parsed::Inst(Inst::PtrAdd {
                dst,
                base: parse_operand(ln, parts[0], ctx)?,
                offset: parse_operand(ln, parts[1], ctx)?,
            }))
        }
        "alloca" => Ok(Parsed::Inst(Inst::Alloca { dst, ty: parse_type(ln, rest)? })),
        "phi" => {
            // rN = phi ty [bb0: 0, bb1: r2]
            let mut toks = rest.split_whitespace();
            let ty = parse_type(ln, toks.next().ok_or_else(|| err(ln, "missing type"))?)?;
            let open = rest.find('[').ok_or_else(|| err(ln, "missing `[` in phi"))?;
            let close = rest.find(']').ok_or_else(|| err(ln, "missing `]` in phi"))?;
            let mut incoming = Vec::new();
            for pair in split_args(&rest[open + 1..close]) {
                let (bb, val) = pair
                    .split_once(':')
                    .ok_or_else(|| err(ln, "expected `bb: val` in phi"))?;
                incoming.push((parse_block_ref(ln, bb, ctx)?, parse_operand(ln, val, ctx)?));
            }
            Ok(Parsed::Phi(Phi { dst, ty, incoming }))
        }
        "call" => {
            let (callee, args) = parse_call(ln, rest, ctx)?;
            Ok(Parsed::Inst(Inst::Call { dst: Some(dst), callee, args }))
        }
        other => Err(err(ln, format!("unknown instruction `{other}`"))),
    }
}

/// Peel a trailing ordering token off a comma-separated argument list.
fn strip_trailing_ord(s: &str) -> (&str, Option<&str>) {
    let trimmed = s.trim_end();
    for ord in ["acq_rel", "rlx", "acq", "rel", "sc", "na"] {
        if let Some(head) = trimmed.strip_suffix(ord) {
            if head.ends_with(char::is_whitespace) {
                return (head.trim_end(), Some(ord));
            }
        }
    }
    (trimmed, None)
}

fn parse_call<'a>(
    ln: usize,
    s: &'a str,
    ctx: &InstCtx,
) -> Result<(Callee, Vec<Operand>), IrError> {
    let open = s.find('(').ok_or_else(|| err(ln, "missing `(` in call"))?;
    let close = s.rfind(')').ok_or_else(|| err(ln, "missing `)` in call"))?;
    let target = s[..open].trim();
    let args = split_args(&s[open + 1..close])
        .into_iter()
        .map(|a| parse_operand(ln, a, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let callee = if let Some(name) = target.strip_prefix('@') {
        match ctx.funs.get(name) {
            Some(&f) => Callee::Fun(FunId(f)),
            None => return Err(err(ln, format!("unknown function `@{name}`"))),
        }
    } else if target.starts_with('r') && target[1..].chars().all(|c| c.is_ascii_digit()) {
        Callee::Indirect(Operand::Reg(parse_reg(ln, target)?))
    } else {
        match target.parse::<Intrinsic>() {
            Ok(i) => Callee::Intrinsic(i),
            Err(_) => return Err(IrError::UnsupportedIntrinsic(target.to_string())),
        }
    };
    Ok((callee, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_passing_module() {
        let text = r#"
# message passing
global x : i32 = 0
global y : i32 = 0

fn worker() {
bb0:
  store i32 @x, 42 rlx
  store i32 @y, 1 rel
  ret
}

fn main() {
bb0:
  r0 = call thread_create(@worker, 0)
  r1 = load i32 @y acq
  br r1, bb1, bb2
bb1:
  r2 = load i32 @x rlx
  r3 = eq i32 r2, 42
  call assert(r3)
  br bb2
bb2:
  r4 = call thread_join(r0)
  ret
}
"#;
        let module = parse_module(text).expect("module parses");
        assert_eq!(module.globals.len(), 2);
        assert_eq!(module.functions.len(), 2);
        let main = module.fun(module.fun_id("main").unwrap());
        assert_eq!(main.blocks.len(), 3);
        assert!(matches!(
            main.blocks[0].term,
            Terminator::CondBr { .. }
        ));
        match &main.blocks[0].insts[1] {
            Inst::Load { ord, .. } => assert_eq!(*ord, MemOrdering::Acquire),
            other => panic!("expected load, got {other:?}"),
        }
    }

    #[test]
    fn parses_rmw_and_cas_forms() {
        let text = r#"
global c : i32 = 0
fn main() {
bb0:
  r0 = fai i32 @c add 1 rlx
  r1 = cas i32 @c, 0, 1 acq_rel
  ret
}
"#;
        let module = parse_module(text).unwrap();
        let main = module.fun(module.fun_id("main").unwrap());
        assert!(matches!(main.blocks[0].insts[0], Inst::Rmw { op: RmwOp::Add, .. }));
        assert!(matches!(
            main.blocks[0].insts[1],
            Inst::CmpXchg { ord: MemOrdering::AcquireRelease, .. }
        ));
    }

    #[test]
    fn reports_unknown_symbols_with_line() {
        let text = "fn main() {\nbb0:\n  store i32 @nope, 1 rlx\n  ret\n}\n";
        match parse_module(text) {
            Err(IrError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn phi_and_switch_round_trip() {
        let text = r#"
fn main() {
bb0:
  switch 1, [0 -> bb1, 1 -> bb2], bb1
bb1:
  br bb3
bb2:
  br bb3
bb3:
  r0 = phi i32 [bb1: 7, bb2: 9]
  ret
}
"#;
        let module = parse_module(text).unwrap();
        let main = module.fun(module.fun_id("main").unwrap());
        assert_eq!(main.blocks[3].phis.len(), 1);
        assert!(matches!(main.blocks[0].term, Terminator::Switch { .. }));
    }
}
