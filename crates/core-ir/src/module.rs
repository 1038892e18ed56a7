use ahash::AHashMap;
use core_event::{SAddr, SVal};

use crate::annot::Annotation;
use crate::inst::{BlockId, FunId, GlobalId, Inst, Phi, Reg, Terminator};
use crate::types::Type;
use crate::IrError;

/// A global variable. Statics without an explicit initial value read as
/// poison until first written.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub init: Option<SVal>,
    /// Assigned static address (filled by `Module::layout`).
    pub addr: SAddr,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub phis: Vec<Phi>,
    pub insts: Vec<Inst>,
    pub term: Terminator,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Reg>,
    pub blocks: Vec<BasicBlock>,
    /// One past the highest register id used, for register-file sizing.
    pub num_regs: u32,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }
}

/// Position of an instruction, the key the annotation side table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub fun: FunId,
    pub block: BlockId,
    pub inst: u32,
}

/// Side table accompanying a module: user-facing names, load annotations
/// produced by the annotator, and the front end's memory-model hint.
#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    /// Static address -> source variable name.
    pub var_names: AHashMap<SAddr, String>,
    /// Annotated loads (filled by `annotate_module`).
    pub load_annotations: AHashMap<SourceLoc, Annotation>,
    /// Memory model suggested by the input (e.g. LKMM primitives seen).
    pub model_hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    pub info: ModuleInfo,
}

impl Module {
    pub fn fun(&self, id: FunId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn fun_id(&self, name: &str) -> Option<FunId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunId(i as u32))
    }

    pub fn global_id(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    /// Assign static addresses to globals and record their names in the
    /// side table. Offsets start at 8 so that no global sits at address 0.
    pub fn layout(&mut self) {
        let mut offset = 8u64;
        for g in &mut self.globals {
            let align = g.ty.align().max(1);
            offset = (offset + align - 1) / align * align;
            g.addr = SAddr::static_addr(offset);
            self.info.var_names.insert(g.addr, g.name.clone());
            offset += g.ty.size().max(1);
        }
    }

    /// Structural checks run once before enumeration: an entry point
    /// exists, terminator targets are in range, phis reference known blocks.
    pub fn validate(&self) -> Result<(), IrError> {
        self.fun_id("main")
            .ok_or_else(|| IrError::UnknownFunction("main".into()))?;
        for f in &self.functions {
            if f.blocks.is_empty() {
                return Err(IrError::MalformedModule(format!(
                    "function `{}` has no blocks",
                    f.name
                )));
            }
            let n = f.blocks.len() as u32;
            let check = |bb: BlockId| -> Result<(), IrError> {
                if bb.0 >= n {
                    return Err(IrError::MalformedModule(format!(
                        "function `{}` references unknown block bb{}",
                        f.name, bb.0
                    )));
                }
                Ok(())
            };
            for b in &f.blocks {
                for phi in &b.phis {
                    for (pred, _) in &phi.incoming {
                        check(*pred)?;
                    }
                }
                match &b.term {
                    Terminator::Br(t) => check(*t)?,
                    Terminator::CondBr { then_bb, else_bb, .. } => {
                        check(*then_bb)?;
                        check(*else_bb)?;
                    }
                    Terminator::Switch { cases, default, .. } => {
                        for (_, t) in cases {
                            check(*t)?;
                        }
                        check(*default)?;
                    }
                    Terminator::Ret(_) | Terminator::Unreachable => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_assigns_disjoint_aligned_addresses() {
        let mut m = Module::default();
        m.globals.push(Global {
            name: "a".into(),
            ty: Type::I8,
            init: Some(SVal::new(0)),
            addr: SAddr::static_addr(0),
        });
        m.globals.push(Global {
            name: "b".into(),
            ty: Type::I64,
            init: None,
            addr: SAddr::static_addr(0),
        });
        m.layout();
        assert_eq!(m.globals[0].addr.offset(), 8);
        assert_eq!(m.globals[1].addr.offset(), 16);
        assert_eq!(m.info.var_names[&m.globals[1].addr], "b");
    }

    #[test]
    fn validate_requires_main() {
        let m = Module::default();
        assert!(matches!(m.validate(), Err(IrError::UnknownFunction(_))));
    }
}
