//! Operations on abstract values
//!
//! Every operation distributes over union disjuncts and unites the results. Recursive queries
//! spend one unit of the call budget per level: when the budget runs out the query degrades to the
//! empty value, while cancellation is returned as an error so the build unwinds.

use super::builtins::{self, Builtin};
use super::source::SourceClass;
use super::{ExternalRef, Value};
use crate::graph::{NodeKind, PackageGraph};
use crate::symbol::SymbolRef;
use lantern_core::{AnalysisError, CallContext, CallError, CancelHandle};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::rc::Rc;

/// Recursion budget for a single value query
pub const CALL_LIMIT: usize = 32;

type Outcome = Result<Value, AnalysisError>;

/// Arguments of a call site
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
    /// Value of an explicit `*x` argument
    pub vararg: Option<Value>,
    /// Value of an explicit `**x` argument
    pub kwarg: Option<Value>,
}

impl Args {
    pub fn positional(values: Vec<Value>) -> Self {
        Args { positional: values, ..Args::default() }
    }

    /// Positional argument `i`, or the empty value
    pub fn get(&self, i: usize) -> Value {
        self.positional.get(i).cloned().unwrap_or_else(Value::empty)
    }

    pub fn keyword(&self, name: &str) -> Option<Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    /// Argument passed either at position `i` or as keyword `name`
    pub fn arg(&self, i: usize, name: &str) -> Value {
        Value::unite([self.get(i), self.keyword(name).unwrap_or_else(Value::empty)])
    }
}

/// Graph access plus the remaining call budget of the current query
#[derive(Clone, Copy)]
pub struct ValueContext<'a> {
    pub graph: &'a dyn PackageGraph,
    pub call: CallContext<'a>,
}

impl<'a> ValueContext<'a> {
    pub fn new(graph: &'a dyn PackageGraph, handle: &'a CancelHandle) -> Self {
        ValueContext { graph, call: handle.call_context(CALL_LIMIT) }
    }

    /// One level deeper, or `None` once the budget is spent
    fn descend(&self) -> Result<Option<ValueContext<'a>>, AnalysisError> {
        match self.call.call() {
            Ok(call) => Ok(Some(ValueContext { graph: self.graph, call })),
            Err(CallError::LimitExceeded) => {
                tracing::trace!("Call limit reached; query degrades to empty");
                Ok(None)
            }
            Err(CallError::Cancelled) => Err(AnalysisError::Cancelled),
        }
    }

    /// Resolve `name` on every disjunct of `base`
    ///
    /// Property descriptors are returned as found; applying the getter needs a call with bound
    /// arguments and is left to the propagator.
    pub fn attr(&self, base: &Value, name: &str) -> Outcome {
        let Some(ctx) = self.descend()? else { return Ok(Value::empty()) };
        let mut found = Vec::new();
        for disjunct in base.disjuncts() {
            found.push(ctx.attr_one(disjunct, name)?);
        }
        Ok(Value::unite(found))
    }

    fn attr_one(&self, base: &Value, name: &str) -> Outcome {
        match base {
            Value::Instance(class) => match name {
                "__class__" => Ok(Value::Class(class.clone())),
                "__dict__" => Ok(Value::dict(Value::Str(None), Value::empty())),
                _ => self.class_attr(class, name),
            },
            Value::Class(class) => match name {
                "__mro__" => Ok(Value::tuple(vec![Value::builtin_type(builtins::BuiltinType::Type)])),
                "__subclasses__" => Ok(Value::method(base.clone(), name)),
                _ => self.class_attr(class, name),
            },
            Value::Module(module) => Ok(module.members.get(name).map(|s| s.value()).unwrap_or_else(Value::empty)),
            Value::Package(package) => {
                let from_init = package
                    .init()
                    .and_then(|init| init.members.get(name))
                    .map(|s| s.value())
                    .unwrap_or_else(Value::empty);
                if !from_init.is_empty() {
                    return Ok(from_init);
                }
                Ok(package.entries.get(name).map(|s| s.value()).unwrap_or_else(Value::empty))
            }
            Value::Function(function) => Ok(match name {
                "__name__" | "__qualname__" => Value::str(&function.name),
                "__doc__" | "__module__" => Value::Str(None),
                "__dict__" => Value::dict(Value::Str(None), Value::empty()),
                _ => Value::empty(),
            }),
            Value::External(r) => Ok(self.external_attr(r.path(), name)),
            Value::ExternalInstance(r) => Ok(self.external_attr(r.path(), name)),
            Value::Super(bases) => {
                for base in bases.iter() {
                    let found = self.base_attr(base, name)?;
                    if !found.is_empty() {
                        return Ok(found);
                    }
                }
                Ok(Value::empty())
            }
            Value::Property(property) => Ok(match name {
                "setter" | "getter" | "deleter" => Value::method(base.clone(), name),
                "fget" => property.fget.clone(),
                "fset" => property.fset.clone(),
                "fdel" => property.fdel.clone(),
                _ => Value::empty(),
            }),
            Value::Builtin(Builtin::Type(ty)) => Ok(match name {
                "__name__" => Value::str(ty.name()),
                "fromkeys" if *ty == builtins::BuiltinType::Dict => Value::method(ty.instance(), name),
                _ => Value::empty(),
            }),
            Value::Synthetic(synthetic) => Ok(synthetic.attr(name)),
            other => Ok(builtins::instance_attr(other, name)),
        }
    }

    /// Member of a source class, searching bases in declaration order
    pub fn class_attr(&self, class: &Rc<SourceClass>, name: &str) -> Outcome {
        let mut visited = FxHashSet::default();
        self.class_attr_from(class, name, &mut visited)
    }

    fn class_attr_from(&self, class: &Rc<SourceClass>, name: &str, visited: &mut FxHashSet<usize>) -> Outcome {
        if !visited.insert(Rc::as_ptr(class) as usize) {
            return Ok(Value::empty());
        }
        if let Some(symbol) = class.members.get(name) {
            let value = symbol.value();
            if !value.is_empty() {
                return Ok(value);
            }
        }
        let Some(ctx) = self.descend()? else { return Ok(Value::empty()) };
        let bases = class.bases.borrow().clone();
        for base in &bases {
            for disjunct in base.disjuncts() {
                let found = match disjunct {
                    Value::Class(parent) => ctx.class_attr_from(parent, name, visited)?,
                    other => ctx.base_attr(other, name)?,
                };
                if !found.is_empty() {
                    return Ok(found);
                }
            }
        }
        Ok(Value::empty())
    }

    /// Attribute contributed by a base that is not a source class
    fn base_attr(&self, base: &Value, name: &str) -> Outcome {
        Ok(match base {
            Value::Class(class) => self.class_attr(class, name)?,
            Value::External(r) => self.external_attr(r.path(), name),
            Value::Builtin(Builtin::Type(ty)) => builtins::instance_attr(&ty.instance(), name),
            _ => Value::empty(),
        })
    }

    /// Member of a graph node, searching type bases breadth first
    pub fn external_attr(&self, path: &str, name: &str) -> Value {
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::from([path.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(target) = self.graph.attr(&current, name) {
                return self.external_value(&target);
            }
            if let Some(native) = builtins::instance_from_external(&current) {
                let found = builtins::instance_attr(&native, name);
                if !found.is_empty() {
                    return found;
                }
            }
            queue.extend(self.graph.bases(&current));
        }
        Value::empty()
    }

    /// Value denoted by a graph path
    pub fn external_value(&self, path: &str) -> Value {
        match self.graph.kind(path) {
            Some(NodeKind::Instance) => match self.graph.returns(path) {
                Some(ty) => self.external_instance(&ty),
                None => Value::Object,
            },
            Some(_) => builtins::from_external(path).unwrap_or_else(|| Value::external(path)),
            None => Value::empty(),
        }
    }

    /// Instance of the graph type at `type_path`
    pub fn external_instance(&self, type_path: &str) -> Value {
        builtins::instance_from_external(type_path).unwrap_or_else(|| Value::external_instance(type_path))
    }

    /// Member symbols `name` of every source disjunct of `base`
    ///
    /// Instances and classes search their own members (including valueless slots) and then their
    /// source bases; an external base ends the search. With `create`, a missing class member is
    /// created on the class itself and a missing module member on the module.
    pub fn attr_symbols(&self, base: &Value, name: &str, create: bool) -> Result<Vec<SymbolRef>, AnalysisError> {
        self.call.check().map_err(|_| AnalysisError::Cancelled)?;
        let mut symbols = Vec::new();
        for disjunct in base.disjuncts() {
            let symbol = match disjunct {
                Value::Instance(class) | Value::Class(class) => {
                    let mut visited = FxHashSet::default();
                    match find_class_symbol(class, name, &mut visited) {
                        Some(symbol) => Some(symbol),
                        None if create => Some(class.members.create(name)),
                        None => None,
                    }
                }
                Value::Module(module) => match module.members.get(name) {
                    Some(symbol) => Some(symbol),
                    None if create => Some(module.members.create(name)),
                    None => None,
                },
                Value::Package(package) => match package.init() {
                    Some(init) if create => Some(init.members.create(name)),
                    Some(init) => init.members.get(name).or_else(|| package.entries.get(name)),
                    None => package.entries.get(name),
                },
                _ => None,
            };
            if let Some(symbol) = symbol {
                if !symbols.iter().any(|s: &SymbolRef| Rc::ptr_eq(s, &symbol)) {
                    symbols.push(symbol);
                }
            }
        }
        Ok(symbols)
    }

    /// Result of calling every disjunct of `callee`
    ///
    /// Source functions return their accumulated return value; binding the arguments onto their
    /// parameters is the propagator's job.
    pub fn call(&self, callee: &Value, args: &Args) -> Outcome {
        let Some(ctx) = self.descend()? else { return Ok(Value::empty()) };
        let mut results = Vec::new();
        for disjunct in callee.disjuncts() {
            results.push(ctx.call_one(disjunct, args)?);
        }
        Ok(Value::unite(results))
    }

    fn call_one(&self, callee: &Value, args: &Args) -> Outcome {
        match callee {
            Value::Function(function) => Ok(function.returns.value()),
            Value::Class(class) => Ok(Value::Instance(class.clone())),
            Value::Builtin(Builtin::Type(ty)) => builtins::construct(self, *ty, args),
            Value::Builtin(Builtin::Function(function)) => builtins::call_function(self, *function, args),
            Value::Method(method) => match &method.receiver {
                Value::Class(class) if &*method.name == "__subclasses__" => {
                    Ok(Value::list(Value::unite(class.subclasses().into_iter().map(Value::Class))))
                }
                _ => builtins::call_method(self, method, args),
            },
            Value::External(r) => Ok(self.call_external(r)),
            Value::Instance(class) => {
                let dunder = self.class_attr(class, "__call__")?;
                self.call(&dunder, args)
            }
            Value::ExternalInstance(r) => {
                let dunder = self.external_attr(r.path(), "__call__");
                self.call(&dunder, args)
            }
            Value::Synthetic(synthetic) => Ok(synthetic.call(args)),
            _ => Ok(Value::empty()),
        }
    }

    fn call_external(&self, r: &ExternalRef) -> Value {
        match self.graph.kind(r.path()) {
            Some(NodeKind::Type) => self.external_instance(r.path()),
            Some(NodeKind::Function) => match self.graph.returns(r.path()) {
                Some(ty) => self.external_instance(&ty),
                None => Value::empty(),
            },
            _ => Value::empty(),
        }
    }

    /// `base[key]`
    pub fn index(&self, base: &Value, key: &Value) -> Outcome {
        let Some(ctx) = self.descend()? else { return Ok(Value::empty()) };
        let mut results = Vec::new();
        for disjunct in base.disjuncts() {
            let value = match disjunct {
                Value::Str(_) => Value::Str(None),
                Value::Bytes => Value::Int(None),
                Value::List(elem) => (**elem).clone(),
                Value::Dict(_, value) => (**value).clone(),
                Value::Tuple(items) => match key.as_int_constant() {
                    Some(i) if (i as usize) < items.len() => items[i as usize].clone(),
                    _ => Value::unite(items.iter().cloned()),
                },
                Value::KwargDict(dict) => match key.as_str_constant() {
                    Some(name) => dict.get(name).unwrap_or_else(Value::empty),
                    None => dict.values(),
                },
                Value::Instance(class) => {
                    let getter = ctx.class_attr(class, "__getitem__")?;
                    ctx.call(&getter, &Args::positional(vec![key.clone()]))?
                }
                Value::ExternalInstance(r) => {
                    let getter = ctx.external_attr(r.path(), "__getitem__");
                    ctx.call(&getter, &Args::positional(vec![key.clone()]))?
                }
                Value::Synthetic(synthetic) => synthetic.index(key),
                _ => Value::empty(),
            };
            results.push(value);
        }
        Ok(Value::unite(results))
    }

    /// `base[a:b]`
    pub fn slice(&self, base: &Value) -> Outcome {
        let mut results = Vec::new();
        for disjunct in base.disjuncts() {
            results.push(match disjunct {
                Value::Str(_) => Value::Str(None),
                Value::Bytes => Value::Bytes,
                Value::List(_) | Value::Tuple(_) => disjunct.clone(),
                Value::Instance(_) | Value::ExternalInstance(_) => self.index(disjunct, &Value::Object)?,
                _ => Value::empty(),
            });
        }
        Ok(Value::unite(results))
    }

    /// Element type produced by iterating `base`
    pub fn elem(&self, base: &Value) -> Outcome {
        let Some(ctx) = self.descend()? else { return Ok(Value::empty()) };
        let mut results = Vec::new();
        for disjunct in base.disjuncts() {
            let value = match disjunct {
                Value::List(elem) | Value::Set(elem) | Value::Generator(elem) => (**elem).clone(),
                Value::Dict(key, _) => (**key).clone(),
                Value::Tuple(items) => Value::unite(items.iter().cloned()),
                Value::Str(_) | Value::KwargDict(_) => Value::Str(None),
                Value::Bytes => Value::Int(None),
                Value::Instance(class) => ctx.iterate_instance(class)?,
                Value::ExternalInstance(r) => {
                    let iter = ctx.external_attr(r.path(), "__iter__");
                    let iterator = ctx.call(&iter, &Args::default())?;
                    let next = ctx.attr(&iterator, "__next__")?;
                    ctx.call(&next, &Args::default())?
                }
                Value::Synthetic(synthetic) => synthetic.elem(),
                _ => Value::empty(),
            };
            results.push(value);
        }
        Ok(Value::unite(results))
    }

    fn iterate_instance(&self, class: &Rc<SourceClass>) -> Outcome {
        let iter = self.class_attr(class, "__iter__")?;
        let iterator = self.call(&iter, &Args::default())?;
        let mut results = Vec::new();
        for disjunct in iterator.disjuncts() {
            results.push(match disjunct {
                Value::Instance(inner) => {
                    let next = self.class_attr(inner, "__next__")?;
                    self.call(&next, &Args::default())?
                }
                other => self.elem(other)?,
            });
        }
        Ok(Value::unite(results))
    }

    /// Names visible on `value`, as listed by `dir()`
    pub fn dir(&self, value: &Value) -> Result<Vec<String>, AnalysisError> {
        self.call.check().map_err(|_| AnalysisError::Cancelled)?;
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: String| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        for disjunct in value.disjuncts() {
            match disjunct {
                Value::Module(module) => module.members.names().into_iter().for_each(&mut push),
                Value::Package(package) => {
                    if let Some(init) = package.init() {
                        init.members.names().into_iter().for_each(&mut push);
                    }
                    package.entries.names().into_iter().for_each(&mut push);
                }
                Value::Class(class) | Value::Instance(class) => {
                    for class in class_lineage(class) {
                        class.members.names().into_iter().for_each(&mut push);
                    }
                }
                Value::External(r) | Value::ExternalInstance(r) => {
                    let mut visited = FxHashSet::default();
                    let mut queue = VecDeque::from([r.path().to_string()]);
                    while let Some(path) = queue.pop_front() {
                        if visited.insert(path.clone()) {
                            self.graph.children(&path).into_iter().for_each(&mut push);
                            queue.extend(self.graph.bases(&path));
                        }
                    }
                }
                Value::Synthetic(synthetic) => synthetic.dir().into_iter().for_each(&mut push),
                other => builtins::method_names(other).iter().map(|n| n.to_string()).for_each(&mut push),
            }
        }
        Ok(names)
    }

    /// Whether a single disjunct structurally supports attribute `name`
    ///
    /// Declared members count even while they have no value yet.
    pub fn has_attr(&self, value: &Value, name: &str) -> Result<bool, AnalysisError> {
        self.call.check().map_err(|_| AnalysisError::Cancelled)?;
        Ok(match value {
            Value::Class(class) | Value::Instance(class) => {
                if class_lineage(class).iter().any(|c| c.members.get(name).is_some()) {
                    return Ok(true);
                }
                class_lineage(class).iter().any(|c| {
                    c.bases.borrow().iter().flat_map(|b| b.disjuncts().to_vec()).any(|b| match &b {
                        Value::External(r) => !self.external_attr(r.path(), name).is_empty(),
                        Value::Builtin(Builtin::Type(ty)) => builtins::method_names(&ty.instance()).contains(&name),
                        _ => false,
                    })
                })
            }
            Value::Module(module) => module.members.get(name).is_some(),
            Value::Package(package) => {
                package.entries.get(name).is_some()
                    || package.init().is_some_and(|init| init.members.get(name).is_some())
            }
            Value::External(r) | Value::ExternalInstance(r) => !self.external_attr(r.path(), name).is_empty(),
            Value::Synthetic(synthetic) => synthetic.dir().iter().any(|n| n == name),
            Value::Function(_) => matches!(name, "__name__" | "__qualname__" | "__doc__" | "__module__" | "__dict__"),
            other => builtins::method_names(other).contains(&name),
        })
    }
}

/// `base[key] = value` as a new value for `base`
pub fn set_index(base: &Value, key: &Value, value: &Value) -> Value {
    Value::unite(base.disjuncts().iter().map(|disjunct| match disjunct {
        Value::List(elem) => Value::list(Value::unite([(**elem).clone(), value.clone()])),
        Value::Dict(k, v) => {
            Value::dict(Value::unite([(**k).clone(), key.widen()]), Value::unite([(**v).clone(), value.widen()]))
        }
        Value::KwargDict(dict) => {
            if let Some(name) = key.as_str_constant() {
                dict.add(name, value);
            }
            disjunct.clone()
        }
        other => other.clone(),
    }))
}

/// Whether `base` has a container disjunct that `set_index` can grow
pub fn is_assignable(base: &Value) -> bool {
    base.disjuncts().iter().any(|d| matches!(d, Value::List(_) | Value::Dict(..) | Value::KwargDict(_)))
}

fn find_class_symbol(class: &Rc<SourceClass>, name: &str, visited: &mut FxHashSet<usize>) -> Option<SymbolRef> {
    if !visited.insert(Rc::as_ptr(class) as usize) {
        return None;
    }
    if let Some(symbol) = class.members.get(name) {
        return Some(symbol);
    }
    let bases = class.bases.borrow().clone();
    for base in &bases {
        for disjunct in base.disjuncts() {
            match disjunct {
                Value::Class(parent) => {
                    if let Some(symbol) = find_class_symbol(parent, name, visited) {
                        return Some(symbol);
                    }
                }
                Value::External(_) => return None,
                _ => {}
            }
        }
    }
    None
}

/// `class` followed by its source ancestors, each once
fn class_lineage(class: &Rc<SourceClass>) -> Vec<Rc<SourceClass>> {
    let mut out: Vec<Rc<SourceClass>> = Vec::new();
    let mut stack = vec![class.clone()];
    while let Some(current) = stack.pop() {
        if out.iter().any(|c| Rc::ptr_eq(c, &current)) {
            continue;
        }
        for base in current.bases.borrow().iter().rev() {
            for disjunct in base.disjuncts().iter().rev() {
                if let Value::Class(parent) = disjunct {
                    stack.push(parent.clone());
                }
            }
        }
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::symbol::Address;
    use lantern_parser::NodeId;

    fn class(name: &str) -> Rc<SourceClass> {
        SourceClass::new(NodeId::fresh(), name, Address::new("/src/app.py", name), "app")
    }

    fn graph() -> MemoryGraph {
        MemoryGraph::builder()
            .class("builtins.object", &[])
            .class("builtins.str", &["builtins.object"])
            .class("re.Pattern", &["builtins.object"])
            .function("re.Pattern.match", Some("builtins.str"))
            .function("re.compile", Some("re.Pattern"))
            .class("pkg.Base", &[])
            .function("pkg.Base.run", Some("builtins.str"))
            .build()
    }

    #[test]
    fn test_class_attr_searches_bases() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let base = class("Base");
        base.members.put("x", Value::int(1));
        let derived = class("Derived");
        derived.bases.borrow_mut().push(Value::Class(base.clone()));

        let v = ctx.attr(&Value::Instance(derived.clone()), "x").unwrap();
        assert_eq!(v, Value::int(1));
        base.clear();
        derived.clear();
    }

    #[test]
    fn test_cyclic_bases_terminate() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let a = class("A");
        let b = class("B");
        a.bases.borrow_mut().push(Value::Class(b.clone()));
        b.bases.borrow_mut().push(Value::Class(a.clone()));

        assert!(ctx.attr(&Value::Instance(a.clone()), "missing").unwrap().is_empty());
        assert!(ctx.attr_symbols(&Value::Instance(a.clone()), "missing", false).unwrap().is_empty());
        a.clear();
        b.clear();
    }

    #[test]
    fn test_external_calls() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let pattern = ctx.call(&Value::external("re.compile"), &Args::default()).unwrap();
        assert_eq!(pattern.to_string(), "instance re.Pattern");
        let matched = ctx.attr(&pattern, "match").unwrap();
        assert_eq!(ctx.call(&matched, &Args::default()).unwrap().to_string(), "str");
    }

    #[test]
    fn test_external_base_of_source_class() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let derived = class("Derived");
        derived.bases.borrow_mut().push(Value::external("pkg.Base"));
        let run = ctx.attr(&Value::Instance(derived.clone()), "run").unwrap();
        assert_eq!(run.to_string(), "pkg.Base.run");
        assert!(ctx.has_attr(&Value::Instance(derived.clone()), "run").unwrap());
        derived.clear();
    }

    #[test]
    fn test_index_and_elem() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let pair = Value::tuple(vec![Value::int(1), Value::str("a")]);
        assert_eq!(ctx.index(&pair, &Value::int(1)).unwrap(), Value::str("a"));
        assert_eq!(ctx.index(&pair, &Value::Int(None)).unwrap().to_string(), "int(1) | str('a')");
        assert_eq!(ctx.elem(&Value::dict(Value::Str(None), Value::Float)).unwrap().to_string(), "str");
        assert_eq!(ctx.slice(&Value::str("abc")).unwrap().to_string(), "str");
    }

    #[test]
    fn test_set_index_grows_containers() {
        let list = set_index(&Value::list(Value::Int(None)), &Value::int(0), &Value::Str(None));
        assert_eq!(list.to_string(), "list[int | str]");
        let dict = set_index(&Value::dict(Value::empty(), Value::empty()), &Value::str("k"), &Value::int(3));
        assert_eq!(dict.to_string(), "dict[str, int]");
    }

    #[test]
    fn test_cancelled_query_is_an_error() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        handle.abort();
        assert_eq!(ctx.attr(&Value::Object, "x").unwrap_err(), AnalysisError::Cancelled);
    }

    #[test]
    fn test_exhausted_budget_degrades_to_empty() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext { graph: &graph, call: handle.call_context(0) };
        assert!(ctx.attr(&Value::str("a"), "upper").unwrap().is_empty());
    }

    #[test]
    fn test_dir_of_builtin_and_class() {
        let graph = graph();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        assert!(ctx.dir(&Value::list(Value::empty())).unwrap().contains(&"append".to_string()));
        let a = class("A");
        a.members.put("field", Value::None);
        assert!(ctx.dir(&Value::Instance(a.clone())).unwrap().contains(&"field".to_string()));
        a.clear();
    }
}
