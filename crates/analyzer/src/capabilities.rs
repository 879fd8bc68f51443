//! Capability recording and union refinement
//!
//! While the final propagation pass runs, the engine records which attributes are accessed on
//! bare names and how values flow between symbols. A symbol holding a union of several instance
//! types can then be narrowed to the disjuncts that actually support what the code does with it.

use crate::symbol::{SymbolId, SymbolRef};
use crate::value::{Value, ValueContext};
use indexmap::{IndexMap, IndexSet};
use lantern_core::AnalysisError;

#[derive(Debug, Default)]
pub struct CapabilityRecorder {
    symbols: IndexMap<SymbolId, SymbolRef>,
    attrs: IndexMap<SymbolId, IndexSet<String>>,
    forward: IndexMap<SymbolId, IndexSet<SymbolId>>,
    backward: IndexMap<SymbolId, IndexSet<SymbolId>>,
}

impl CapabilityRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `symbol.attr` was read or written
    pub fn record_attr(&mut self, symbol: &SymbolRef, attr: &str) {
        self.symbols.entry(symbol.id()).or_insert_with(|| symbol.clone());
        self.attrs.entry(symbol.id()).or_default().insert(attr.to_string());
    }

    /// A value flows from `src` into `dst`
    pub fn record_flow(&mut self, src: &SymbolRef, dst: &SymbolRef) {
        if src.id() == dst.id() {
            return;
        }
        self.symbols.entry(src.id()).or_insert_with(|| src.clone());
        self.symbols.entry(dst.id()).or_insert_with(|| dst.clone());
        self.forward.entry(src.id()).or_default().insert(dst.id());
        self.backward.entry(dst.id()).or_default().insert(src.id());
    }

    /// Attributes recorded per symbol
    pub fn capabilities(&self) -> &IndexMap<SymbolId, IndexSet<String>> {
        &self.attrs
    }

    pub fn forward_graph(&self) -> &IndexMap<SymbolId, IndexSet<SymbolId>> {
        &self.forward
    }

    pub fn backward_graph(&self) -> &IndexMap<SymbolId, IndexSet<SymbolId>> {
        &self.backward
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&SymbolRef> {
        self.symbols.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.forward.is_empty()
    }
}

/// Narrow multi-disjunct symbols to the disjuncts that best support their recorded attributes
///
/// Attributes supported by every disjunct, or by none, say nothing and are ignored. Among the
/// rest, a disjunct scores one point per attribute it supports and only the top scorers are kept.
/// Returns the number of symbols narrowed.
pub fn refine_unions(ctx: &ValueContext<'_>, recorder: &CapabilityRecorder) -> Result<usize, AnalysisError> {
    let mut refined = 0;
    for (id, attrs) in recorder.capabilities() {
        let Some(symbol) = recorder.symbol(*id) else { continue };
        let value = symbol.value();
        let disjuncts = value.disjuncts();
        if disjuncts.len() < 2 {
            continue;
        }

        let mut scores = vec![0usize; disjuncts.len()];
        let mut informative = false;
        for attr in attrs {
            let mut support = Vec::with_capacity(disjuncts.len());
            for disjunct in disjuncts {
                support.push(ctx.has_attr(disjunct, attr)?);
            }
            let count = support.iter().filter(|s| **s).count();
            if count == 0 || count == disjuncts.len() {
                continue;
            }
            informative = true;
            for (score, supported) in scores.iter_mut().zip(&support) {
                if *supported {
                    *score += 1;
                }
            }
        }
        if !informative {
            continue;
        }

        let best = scores.iter().copied().max().unwrap_or(0);
        let kept = Value::unite(disjuncts.iter().zip(&scores).filter(|(_, s)| **s == best).map(|(d, _)| d.clone()));
        tracing::debug!("Refined {} from {} to {}", symbol.address(), value, kept);
        symbol.put(kept);
        refined += 1;
    }
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::symbol::{Address, Symbol};
    use crate::value::SourceClass;
    use lantern_core::CancelHandle;
    use lantern_parser::NodeId;

    fn class_with(name: &str, members: &[&str]) -> std::rc::Rc<SourceClass> {
        let class = SourceClass::new(NodeId::fresh(), name, Address::new("/app.py", name), "app");
        for member in members {
            class.members.put(member, Value::None);
        }
        class
    }

    #[test]
    fn test_flow_edges_are_deduplicated() {
        let a = Symbol::new("a", Address::new("/app.py", "a"));
        let b = Symbol::new("b", Address::new("/app.py", "b"));
        let mut recorder = CapabilityRecorder::new();
        recorder.record_flow(&a, &b);
        recorder.record_flow(&a, &b);
        recorder.record_flow(&a, &a);
        assert_eq!(recorder.forward_graph()[&a.id()].len(), 1);
        assert!(recorder.backward_graph()[&b.id()].contains(&a.id()));
        assert!(!recorder.forward_graph().contains_key(&b.id()));
    }

    #[test]
    fn test_refinement_keeps_best_supported_disjuncts() {
        let duck = class_with("Duck", &["quack", "walk"]);
        let robot = class_with("Robot", &["walk"]);
        let x = Symbol::new("x", Address::new("/app.py", "x"));
        x.produce(&Value::unite([Value::Instance(duck.clone()), Value::Instance(robot.clone())]));

        let mut recorder = CapabilityRecorder::new();
        recorder.record_attr(&x, "quack");
        recorder.record_attr(&x, "walk");

        let graph = MemoryGraph::default();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        assert_eq!(refine_unions(&ctx, &recorder).unwrap(), 1);
        assert_eq!(x.value().to_string(), "instance Duck");

        duck.clear();
        robot.clear();
    }

    #[test]
    fn test_uninformative_attributes_do_not_refine() {
        let a = class_with("A", &["shared"]);
        let b = class_with("B", &["shared"]);
        let x = Symbol::new("x", Address::new("/app.py", "x"));
        x.produce(&Value::unite([Value::Instance(a.clone()), Value::Instance(b.clone())]));

        let mut recorder = CapabilityRecorder::new();
        recorder.record_attr(&x, "shared");
        recorder.record_attr(&x, "nobody_has_this");

        let graph = MemoryGraph::default();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        assert_eq!(refine_unions(&ctx, &recorder).unwrap(), 0);
        assert_eq!(x.value().disjuncts().len(), 2);

        a.clear();
        b.clear();
    }
}
