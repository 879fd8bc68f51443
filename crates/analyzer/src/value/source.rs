//! Values created from analyzed source: functions, classes, modules and packages
//!
//! These objects own symbol tables and are reachable from the values stored in those same tables,
//! so they form reference cycles. Back links that would otherwise keep the whole graph alive
//! (function to class, class to subclass, function to module) are `Weak`; the remaining cycles are
//! broken when the owning assembly is dropped.

use super::Value;
use crate::symbol::{Address, Symbol, SymbolRef, SymbolTable};
use indexmap::IndexMap;
use lantern_parser::{AstNode, NodeId, Parameters};
use rustc_hash::FxHashSet;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

/// Name of the synthetic symbol accumulating a function's return value
pub const RETURN_SYMBOL: &str = "[return]";

/// Dunder slots every class has but that carry no useful value
const EMPTY_CLASS_SLOTS: &[&str] = &["__dict__", "__weakref__"];

/// How the first parameter of a function is bound when it is reached through a class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    None,
    Instance,
    Class,
}

impl Receiver {
    /// Receiver kind for a function with `has_params` defined in a class body, given the names of
    /// its decorators
    pub fn classify(in_class: bool, has_params: bool, decorators: &[&str]) -> Receiver {
        if !in_class || !has_params {
            return Receiver::None;
        }
        if decorators.contains(&"staticmethod") {
            Receiver::None
        } else if decorators.contains(&"classmethod") {
            Receiver::Class
        } else {
            Receiver::Instance
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub symbol: SymbolRef,
    pub keyword_only: bool,
}

/// Keyword arguments collected by a `**kwargs` parameter
#[derive(Debug, Default)]
pub struct KwargDict {
    entries: RefCell<IndexMap<String, Value>>,
}

impl KwargDict {
    pub fn new() -> Rc<Self> {
        Rc::new(KwargDict::default())
    }

    pub fn add(&self, name: &str, value: &Value) {
        let mut entries = self.entries.borrow_mut();
        let merged = match entries.get(name) {
            Some(current) => Value::unite([current.clone(), value.clone()]),
            None => value.clone(),
        };
        entries.insert(name.to_string(), merged);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.borrow().get(name).cloned()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Union of every collected value
    pub fn values(&self) -> Value {
        Value::unite(self.entries.borrow().values().cloned())
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

pub struct SourceFunction {
    pub id: NodeId,
    pub name: String,
    /// Definition node (a `def` or a `lambda`)
    pub node: Rc<AstNode>,
    pub locals: Rc<SymbolTable>,
    pub params: Vec<Param>,
    pub vararg: Option<SymbolRef>,
    pub kwarg: Option<SymbolRef>,
    pub kwarg_dict: Option<Rc<KwargDict>>,
    pub returns: SymbolRef,
    pub receiver: Receiver,
    pub class: Option<Weak<SourceClass>>,
    pub module: Weak<SourceModule>,
}

impl SourceFunction {
    /// Create a function whose local scope is chained to `parent`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: NodeId, name: &str, node: Rc<AstNode>, params: &Parameters, address: Address, parent: Rc<SymbolTable>,
        receiver: Receiver, class: Option<&Rc<SourceClass>>, module: &Rc<SourceModule>,
    ) -> Rc<Self> {
        let locals = SymbolTable::new(address.clone(), Some(parent));
        let vararg = params.vararg.as_ref().map(|v| locals.create(&v.name));
        let (kwarg, kwarg_dict) = match &params.kwarg {
            Some(kw) => {
                let dict = KwargDict::new();
                let symbol = locals.create(&kw.name);
                symbol.produce(&Value::KwargDict(dict.clone()));
                (Some(symbol), Some(dict))
            }
            None => (None, None),
        };
        let params = params
            .params
            .iter()
            .map(|p| Param { name: p.name.clone(), symbol: locals.create(&p.name), keyword_only: p.keyword_only })
            .collect();
        let returns = Symbol::new(RETURN_SYMBOL, address.child(RETURN_SYMBOL));

        Rc::new(SourceFunction {
            id,
            name: name.to_string(),
            node,
            locals,
            params,
            vararg,
            kwarg,
            kwarg_dict,
            returns,
            receiver,
            class: class.map(Rc::downgrade),
            module: Rc::downgrade(module),
        })
    }

    pub fn class(&self) -> Option<Rc<SourceClass>> {
        self.class.as_ref().and_then(Weak::upgrade)
    }

    pub fn module(&self) -> Option<Rc<SourceModule>> {
        self.module.upgrade()
    }

    pub fn address(&self) -> &Address {
        self.locals.address()
    }

    /// Parameter symbol for `name`, positional or keyword-only
    pub fn param(&self, name: &str) -> Option<&SymbolRef> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.symbol)
    }
}

pub struct SourceClass {
    pub id: NodeId,
    pub name: String,
    pub members: Rc<SymbolTable>,
    pub bases: RefCell<Vec<Value>>,
    subclasses: RefCell<Vec<Weak<SourceClass>>>,
    framework: Cell<Option<&'static str>>,
}

impl SourceClass {
    pub fn new(id: NodeId, name: &str, address: Address, module_name: &str) -> Rc<Self> {
        let members = SymbolTable::new(address, None);
        let class = Rc::new(SourceClass {
            id,
            name: name.to_string(),
            members,
            bases: RefCell::new(Vec::new()),
            subclasses: RefCell::new(Vec::new()),
            framework: Cell::new(None),
        });
        class.members.put("__name__", Value::str(name));
        class.members.put("__module__", Value::str(module_name));
        class.members.put("__doc__", Value::Str(None));
        class.members.put("__bases__", Value::list(Value::builtin_type(super::BuiltinType::Type)));
        class.members.put("__class__", Value::Class(class.clone()));
        for slot in EMPTY_CLASS_SLOTS {
            class.members.create(slot);
        }
        class
    }

    pub fn address(&self) -> &Address {
        self.members.address()
    }

    /// Record `subclass` as a direct subclass, ignoring repeats
    pub fn add_subclass(&self, subclass: &Rc<SourceClass>) {
        let mut subclasses = self.subclasses.borrow_mut();
        if subclasses.iter().any(|s| std::ptr::eq(s.as_ptr(), Rc::as_ptr(subclass))) {
            return;
        }
        subclasses.push(Rc::downgrade(subclass));
    }

    pub fn subclasses(&self) -> Vec<Rc<SourceClass>> {
        self.subclasses.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    /// This class followed by every transitive subclass, each once
    pub fn walk_subclasses(self: &Rc<Self>) -> Vec<Rc<SourceClass>> {
        let mut seen: FxHashSet<*const SourceClass> = FxHashSet::default();
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(class) = stack.pop() {
            if !seen.insert(Rc::as_ptr(&class)) {
                continue;
            }
            let mut children = class.subclasses();
            children.reverse();
            stack.extend(children);
            out.push(class);
        }
        out
    }

    /// Name of the framework policy that built this class, if any
    pub fn framework(&self) -> Option<&'static str> {
        self.framework.get()
    }

    pub fn set_framework(&self, name: &'static str) {
        self.framework.set(Some(name));
    }

    pub(crate) fn clear(&self) {
        self.members.clear_values();
        self.bases.borrow_mut().clear();
    }
}

pub struct SourceModule {
    pub name: String,
    pub path: PathBuf,
    pub members: Rc<SymbolTable>,
}

impl SourceModule {
    /// Create a module whose globals are chained to the builtin scope
    pub fn new(name: &str, path: &Path, builtins: Rc<SymbolTable>) -> Rc<Self> {
        let members = SymbolTable::new(Address::file(path), Some(builtins));
        members.put("__file__", Value::Str(None));
        members.put("__name__", Value::Str(None));
        members.put("__doc__", Value::Str(None));
        members.put("__package__", Value::Str(None));
        members.put("__builtins__", Value::external("builtins"));
        Rc::new(SourceModule { name: name.to_string(), path: path.to_path_buf(), members })
    }
}

/// A source directory; its `__init__` module, when present, shadows its entries
pub struct SourcePackage {
    pub dir: PathBuf,
    pub entries: Rc<SymbolTable>,
    pub init: RefCell<Option<Rc<SourceModule>>>,
}

impl SourcePackage {
    pub fn new(dir: &Path) -> Rc<Self> {
        Rc::new(SourcePackage {
            dir: dir.to_path_buf(),
            entries: SymbolTable::new(Address::file(dir), None),
            init: RefCell::new(None),
        })
    }

    pub fn name(&self) -> String {
        self.dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    pub fn init(&self) -> Option<Rc<SourceModule>> {
        self.init.borrow().clone()
    }
}
