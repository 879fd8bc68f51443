//! The result of a build: every scope the engine created, keyed for lookup
//!
//! Symbol values reference functions and classes, which in turn own symbol tables, so an assembly
//! is a web of `Rc` cycles. Dropping the assembly clears those tables to release the memory.

use crate::sources::{SourceBundle, SourceTree};
use crate::symbol::{Address, SymbolRef, SymbolTable};
use crate::value::{SourceClass, SourceFunction, SourceModule, Value};
use indexmap::IndexMap;
use lantern_core::AnalysisError;
use lantern_parser::NodeId;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Unit of propagation
#[derive(Clone)]
pub(crate) enum WorkItem {
    /// Index into the bundle list
    Module(usize),
    Function(Rc<SourceFunction>),
}

#[derive(Default)]
pub struct Assembly {
    pub(crate) bundles: Vec<SourceBundle>,
    pub(crate) sources: SourceTree,
    pub(crate) classes: IndexMap<NodeId, Rc<SourceClass>>,
    pub(crate) functions: IndexMap<NodeId, Rc<SourceFunction>>,
    pub(crate) lambdas: IndexMap<NodeId, Rc<SourceFunction>>,
    pub(crate) comprehensions: IndexMap<NodeId, Rc<SymbolTable>>,
    pub(crate) order: Vec<WorkItem>,
    pub(crate) python_paths: Vec<PathBuf>,
    addresses: FxHashSet<Address>,
}

impl Assembly {
    pub fn bundles(&self) -> &[SourceBundle] {
        &self.bundles
    }

    pub fn sources(&self) -> &SourceTree {
        &self.sources
    }

    pub fn module(&self, path: &Path) -> Option<&Rc<SourceModule>> {
        self.sources.file(path)
    }

    /// Modules in the order their sources were added
    pub fn modules(&self) -> impl Iterator<Item = &Rc<SourceModule>> {
        self.bundles.iter().filter_map(|b| self.sources.file(&b.path))
    }

    pub fn class(&self, id: NodeId) -> Option<&Rc<SourceClass>> {
        self.classes.get(&id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Rc<SourceClass>> {
        self.classes.values()
    }

    pub fn function(&self, id: NodeId) -> Option<&Rc<SourceFunction>> {
        self.functions.get(&id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Rc<SourceFunction>> {
        self.functions.values()
    }

    pub fn lambda(&self, id: NodeId) -> Option<&Rc<SourceFunction>> {
        self.lambdas.get(&id)
    }

    pub fn comprehension(&self, id: NodeId) -> Option<&Rc<SymbolTable>> {
        self.comprehensions.get(&id)
    }

    /// Roots searched by absolute imports, collected from library bundles
    pub fn python_paths(&self) -> &[PathBuf] {
        &self.python_paths
    }

    /// Number of modules, functions and lambdas each pass propagates
    pub fn work_items(&self) -> usize {
        self.order.len()
    }

    /// Reserve `address` for a new scope, suffixing `[n]` when a sibling scope already took it
    pub(crate) fn claim_address(&mut self, address: Address) -> Address {
        if self.addresses.insert(address.clone()) {
            return address;
        }
        let mut n = 2;
        loop {
            let candidate = Address::new(address.file.clone(), format!("{}[{}]", address.path, n));
            if self.addresses.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Visit every symbol reachable from the analyzed modules exactly once
    ///
    /// Covers package entries, module members, class members, the locals and return symbol of
    /// every function and lambda, and comprehension scopes. Two distinct symbols sharing an address mean two scopes were
    /// given the same address, which is reported as an invariant violation.
    pub fn walk_symbols<F>(&self, mut visit: F) -> Result<(), AnalysisError>
    where
        F: FnMut(&SymbolRef),
    {
        let mut seen_ids = FxHashSet::default();
        let mut seen_addresses: FxHashSet<Address> = FxHashSet::default();
        let mut emit = |symbol: &SymbolRef| -> Result<(), AnalysisError> {
            if !seen_ids.insert(symbol.id()) {
                return Ok(());
            }
            if !seen_addresses.insert(symbol.address().clone()) {
                return Err(AnalysisError::InvariantViolation(format!(
                    "two symbols share the address {}",
                    symbol.address()
                )));
            }
            visit(symbol);
            Ok(())
        };

        for (_, package) in self.sources.dirs() {
            for symbol in package.entries.symbols() {
                emit(&symbol)?;
            }
        }
        for module in self.modules() {
            for symbol in module.members.symbols() {
                emit(&symbol)?;
            }
        }
        for class in self.classes.values() {
            for symbol in class.members.symbols() {
                emit(&symbol)?;
            }
        }
        for function in self.functions.values().chain(self.lambdas.values()) {
            for symbol in function.locals.symbols() {
                emit(&symbol)?;
            }
            emit(&function.returns)?;
        }
        for table in self.comprehensions.values() {
            for symbol in table.symbols() {
                emit(&symbol)?;
            }
        }
        Ok(())
    }

    /// Symbol at `path` within `file`, e.g. `("/src/app.py", "Model.save.self")`
    pub fn find_symbol(&self, file: &Path, path: &str) -> Option<SymbolRef> {
        let mut found = None;
        let _ = self.walk_symbols(|symbol| {
            if found.is_none() && symbol.address().file == file && symbol.address().path == path {
                found = Some(symbol.clone());
            }
        });
        found
    }

    /// Current value of the symbol at `path` within `file`
    pub fn value_of(&self, file: &Path, path: &str) -> Option<Value> {
        self.find_symbol(file, path).map(|s| s.value())
    }
}

impl Drop for Assembly {
    fn drop(&mut self) {
        for class in self.classes.values() {
            class.clear();
        }
        for function in self.functions.values().chain(self.lambdas.values()) {
            function.locals.clear_values();
            function.returns.clear();
            if let Some(dict) = &function.kwarg_dict {
                dict.clear();
            }
        }
        for table in self.comprehensions.values() {
            table.clear_values();
        }
        self.sources.clear();
    }
}
