//! Abstract values
//!
//! A [`Value`] describes what a symbol or expression might hold at runtime. Uncertainty is
//! expressed with [`Value::Union`]; the empty union is the "nothing known" value. Values are cheap
//! to clone: every non-scalar payload sits behind an `Rc`.
//!
//! Unions are built with [`Value::unite`], which:
//! - flattens nested unions
//! - merges all lists (and sets, dicts, generators, properties) into a single disjunct
//! - drops duplicates by structural key
//! - keeps at most [`MAX_DISJUNCTS`] alternatives

pub mod builtins;
pub mod ops;
pub mod source;

pub use builtins::{Builtin, BuiltinFunction, BuiltinType};
pub use ops::{Args, CALL_LIMIT, ValueContext};
pub use source::{KwargDict, Param, Receiver, SourceClass, SourceFunction, SourceModule, SourcePackage};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Largest number of alternatives a union keeps
pub const MAX_DISJUNCTS: usize = 25;
/// Deepest collection nesting tracked, e.g. `list[list[list[...]]]`
pub const MAX_DEPTH: usize = 6;
/// Integer literals in `0..=MAX_INT_CONSTANT` keep their exact value
pub const MAX_INT_CONSTANT: i64 = 1000;

/// Dotted path of a node in the package-interface graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalRef(Rc<str>);

impl ExternalRef {
    pub fn new(path: &str) -> Self {
        ExternalRef(Rc::from(path))
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Method of a builtin value with its receiver attached, e.g. `"abc".upper`
#[derive(Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: Rc<str>,
}

/// Property descriptor built by `@property` or `property(fget, fset, fdel)`
#[derive(Clone)]
pub struct Property {
    pub fget: Value,
    pub fset: Value,
    pub fdel: Value,
}

/// Value synthesized by a framework policy, such as an ORM manager
pub trait Synthetic {
    /// Rendering used in traces and debug output
    fn name(&self) -> String;
    /// Identity used to deduplicate unions
    fn key(&self) -> String;
    fn attr(&self, name: &str) -> Value;
    fn call(&self, _args: &Args) -> Value {
        Value::empty()
    }
    fn elem(&self) -> Value {
        Value::empty()
    }
    fn index(&self, _key: &Value) -> Value {
        Value::empty()
    }
    fn dir(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(Option<bool>),
    Int(Option<i64>),
    Float,
    Complex,
    Str(Option<Rc<str>>),
    Bytes,
    /// Instance of `object`
    Object,
    List(Rc<Value>),
    Set(Rc<Value>),
    Dict(Rc<Value>, Rc<Value>),
    Tuple(Rc<[Value]>),
    Generator(Rc<Value>),
    /// The `**kwargs` dictionary of a source function
    KwargDict(Rc<KwargDict>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Property(Rc<Property>),
    /// `super()`, searching the listed bases
    Super(Rc<[Value]>),
    External(ExternalRef),
    /// Instance of an external type
    ExternalInstance(ExternalRef),
    Function(Rc<SourceFunction>),
    Class(Rc<SourceClass>),
    Instance(Rc<SourceClass>),
    Module(Rc<SourceModule>),
    Package(Rc<SourcePackage>),
    Synthetic(Rc<dyn Synthetic>),
    Union(Rc<[Value]>),
}

impl Value {
    /// The empty union: nothing is known about the value
    pub fn empty() -> Value {
        Value::Union(Rc::from(Vec::new()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Union(items) if items.is_empty())
    }

    /// Integer constant; values outside `0..=MAX_INT_CONSTANT` widen to `int`
    pub fn int(n: i64) -> Value {
        if (0..=MAX_INT_CONSTANT).contains(&n) { Value::Int(Some(n)) } else { Value::Int(None) }
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Some(Rc::from(s)))
    }

    pub fn bool(b: bool) -> Value {
        Value::Bool(Some(b))
    }

    pub fn list(elem: Value) -> Value {
        Value::List(Rc::new(clamp(elem)))
    }

    pub fn set(elem: Value) -> Value {
        Value::Set(Rc::new(clamp(elem)))
    }

    pub fn dict(key: Value, value: Value) -> Value {
        Value::Dict(Rc::new(clamp(key)), Rc::new(clamp(value)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(items.into_iter().map(clamp).collect::<Vec<_>>()))
    }

    pub fn generator(elem: Value) -> Value {
        Value::Generator(Rc::new(clamp(elem)))
    }

    pub fn property(fget: Value, fset: Value, fdel: Value) -> Value {
        Value::Property(Rc::new(Property { fget, fset, fdel }))
    }

    pub fn method(receiver: Value, name: &str) -> Value {
        Value::Method(Rc::new(BoundMethod { receiver, name: Rc::from(name) }))
    }

    pub fn external(path: &str) -> Value {
        Value::External(ExternalRef::new(path))
    }

    pub fn external_instance(path: &str) -> Value {
        Value::ExternalInstance(ExternalRef::new(path))
    }

    pub fn builtin_type(ty: BuiltinType) -> Value {
        Value::Builtin(Builtin::Type(ty))
    }

    pub fn builtin_function(function: BuiltinFunction) -> Value {
        Value::Builtin(Builtin::Function(function))
    }

    /// Alternatives of a union, or the value itself
    pub fn disjuncts(&self) -> &[Value] {
        match self {
            Value::Union(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Set-join of `values`
    pub fn unite<I>(values: I) -> Value
    where
        I: IntoIterator<Item = Value>,
    {
        let mut flat = Vec::new();
        for value in values {
            match value {
                Value::Union(items) => flat.extend(items.iter().cloned()),
                other => flat.push(other),
            }
        }
        unite_flat(flat)
    }

    /// Forget constant payloads: `int(3)` becomes `int`, `str('a')` becomes `str`
    pub fn widen(&self) -> Value {
        match self {
            Value::Bool(Some(_)) => Value::Bool(None),
            Value::Int(Some(_)) => Value::Int(None),
            Value::Str(Some(_)) => Value::Str(None),
            Value::Tuple(items) => Value::tuple(items.iter().map(Value::widen).collect()),
            Value::Union(items) => Value::unite(items.iter().map(Value::widen)),
            other => other.clone(),
        }
    }

    pub fn as_str_constant(&self) -> Option<&str> {
        match self {
            Value::Str(Some(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_constant(&self) -> Option<i64> {
        match self {
            Value::Int(Some(n)) => Some(*n),
            _ => None,
        }
    }

    /// Values that behave like instances for descriptor purposes
    pub fn is_instance(&self) -> bool {
        !matches!(
            self,
            Value::Class(_)
                | Value::Module(_)
                | Value::Package(_)
                | Value::External(_)
                | Value::Builtin(_)
                | Value::Union(_)
        )
    }

    fn is_collection(&self) -> bool {
        matches!(
            self,
            Value::List(_) | Value::Set(_) | Value::Dict(..) | Value::Tuple(_) | Value::Generator(_)
        )
    }

    /// Collection nesting depth, 0 for scalars
    fn depth(&self) -> usize {
        match self {
            Value::List(e) | Value::Set(e) | Value::Generator(e) => 1 + e.depth(),
            Value::Dict(k, v) => 1 + k.depth().max(v.depth()),
            Value::Tuple(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Union(items) => items.iter().map(Value::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Drop collection disjuncts nested deeper than `limit`
    fn truncate(&self, limit: usize) -> Value {
        if limit == 0 {
            return Value::unite(self.disjuncts().iter().filter(|v| !v.is_collection()).cloned());
        }
        match self {
            Value::List(e) => Value::List(Rc::new(e.truncate(limit - 1))),
            Value::Set(e) => Value::Set(Rc::new(e.truncate(limit - 1))),
            Value::Generator(e) => Value::Generator(Rc::new(e.truncate(limit - 1))),
            Value::Dict(k, v) => Value::Dict(Rc::new(k.truncate(limit - 1)), Rc::new(v.truncate(limit - 1))),
            Value::Tuple(items) => Value::Tuple(items.iter().map(|v| v.truncate(limit - 1)).collect()),
            Value::Union(items) => Value::unite(items.iter().map(|v| v.truncate(limit))),
            other => other.clone(),
        }
    }

    fn key(&self, depth: usize) -> ValueKey {
        if depth > MAX_DEPTH {
            return ValueKey::Opaque(self.pointer());
        }
        let nested = |v: &Value| Box::new(v.key(depth + 1));
        match self {
            Value::None => ValueKey::None,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(n) => ValueKey::Int(*n),
            Value::Float => ValueKey::Float,
            Value::Complex => ValueKey::Complex,
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Bytes => ValueKey::Bytes,
            Value::Object => ValueKey::Object,
            Value::List(e) => ValueKey::List(nested(e)),
            Value::Set(e) => ValueKey::Set(nested(e)),
            Value::Dict(k, v) => ValueKey::Dict(nested(k), nested(v)),
            Value::Tuple(items) => ValueKey::Tuple(items.iter().map(|v| v.key(depth + 1)).collect()),
            Value::Generator(e) => ValueKey::Generator(nested(e)),
            Value::Builtin(b) => ValueKey::Builtin(*b),
            Value::Method(m) => ValueKey::Method(nested(&m.receiver), m.name.clone()),
            Value::Super(bases) => ValueKey::Super(bases.iter().map(|v| v.key(depth + 1)).collect()),
            Value::External(r) => ValueKey::External(r.clone()),
            Value::ExternalInstance(r) => ValueKey::ExternalInstance(r.clone()),
            Value::Instance(c) => ValueKey::Instance(Rc::as_ptr(c) as usize),
            Value::Synthetic(s) => ValueKey::Synthetic(s.key()),
            Value::Union(items) => ValueKey::Union(items.iter().map(|v| v.key(depth + 1)).collect()),
            Value::KwargDict(_)
            | Value::Property(_)
            | Value::Function(_)
            | Value::Class(_)
            | Value::Module(_)
            | Value::Package(_) => ValueKey::Pointer(self.pointer()),
        }
    }

    /// Identity of the shared payload, 0 for scalars
    fn pointer(&self) -> usize {
        match self {
            Value::List(e) | Value::Set(e) | Value::Generator(e) => Rc::as_ptr(e) as usize,
            Value::Dict(k, _) => Rc::as_ptr(k) as usize,
            Value::Tuple(items) | Value::Super(items) | Value::Union(items) => {
                Rc::as_ptr(items) as *const Value as usize
            }
            Value::KwargDict(d) => Rc::as_ptr(d) as usize,
            Value::Method(m) => Rc::as_ptr(m) as usize,
            Value::Property(p) => Rc::as_ptr(p) as usize,
            Value::Function(f) => Rc::as_ptr(f) as usize,
            Value::Class(c) => Rc::as_ptr(c) as usize,
            Value::Instance(c) => Rc::as_ptr(c) as usize + 1,
            Value::Module(m) => Rc::as_ptr(m) as usize,
            Value::Package(p) => Rc::as_ptr(p) as usize,
            Value::Synthetic(s) => Rc::as_ptr(s) as *const () as usize,
            _ => 0,
        }
    }
}

/// Structural identity used for duplicate elimination
#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueKey {
    None,
    Bool(Option<bool>),
    Int(Option<i64>),
    Float,
    Complex,
    Str(Option<Rc<str>>),
    Bytes,
    Object,
    List(Box<ValueKey>),
    Set(Box<ValueKey>),
    Dict(Box<ValueKey>, Box<ValueKey>),
    Tuple(Vec<ValueKey>),
    Generator(Box<ValueKey>),
    Builtin(Builtin),
    Method(Box<ValueKey>, Rc<str>),
    Super(Vec<ValueKey>),
    External(ExternalRef),
    ExternalInstance(ExternalRef),
    Instance(usize),
    Synthetic(String),
    Union(Vec<ValueKey>),
    Pointer(usize),
    Opaque(usize),
}

fn clamp(value: Value) -> Value {
    if value.depth() >= MAX_DEPTH { value.truncate(MAX_DEPTH - 1) } else { value }
}

#[derive(Default)]
struct Group {
    slot: Option<usize>,
    first: Vec<Value>,
    second: Vec<Value>,
    third: Vec<Value>,
}

impl Group {
    fn claim(&mut self, out: &mut Vec<Value>, keys: &mut Vec<Option<ValueKey>>) {
        if self.slot.is_none() {
            self.slot = Some(out.len());
            out.push(Value::empty());
            keys.push(None);
        }
    }
}

fn unite_flat(flat: Vec<Value>) -> Value {
    let mut out: Vec<Value> = Vec::with_capacity(flat.len());
    let mut keys: Vec<Option<ValueKey>> = Vec::with_capacity(flat.len());
    let mut lists = Group::default();
    let mut sets = Group::default();
    let mut dicts = Group::default();
    let mut generators = Group::default();
    let mut properties = Group::default();

    for value in flat {
        match value {
            Value::List(e) => {
                lists.claim(&mut out, &mut keys);
                lists.first.push((*e).clone());
            }
            Value::Set(e) => {
                sets.claim(&mut out, &mut keys);
                sets.first.push((*e).clone());
            }
            Value::Generator(e) => {
                generators.claim(&mut out, &mut keys);
                generators.first.push((*e).clone());
            }
            Value::Dict(k, v) => {
                dicts.claim(&mut out, &mut keys);
                dicts.first.push((*k).clone());
                dicts.second.push((*v).clone());
            }
            Value::Property(p) => {
                properties.claim(&mut out, &mut keys);
                properties.first.push(p.fget.clone());
                properties.second.push(p.fset.clone());
                properties.third.push(p.fdel.clone());
            }
            other => {
                let key = other.key(0);
                if keys.iter().any(|k| k.as_ref() == Some(&key)) {
                    continue;
                }
                out.push(other);
                keys.push(Some(key));
            }
        }
    }

    if let Some(slot) = lists.slot {
        out[slot] = Value::List(Rc::new(Value::unite(lists.first)));
    }
    if let Some(slot) = sets.slot {
        out[slot] = Value::Set(Rc::new(Value::unite(sets.first)));
    }
    if let Some(slot) = generators.slot {
        out[slot] = Value::Generator(Rc::new(Value::unite(generators.first)));
    }
    if let Some(slot) = dicts.slot {
        out[slot] = Value::Dict(Rc::new(Value::unite(dicts.first)), Rc::new(Value::unite(dicts.second)));
    }
    if let Some(slot) = properties.slot {
        out[slot] = Value::property(
            Value::unite(properties.first),
            Value::unite(properties.second),
            Value::unite(properties.third),
        );
    }

    out.truncate(MAX_DISJUNCTS);
    if out.len() == 1 {
        return out.pop().unwrap_or_else(Value::empty);
    }
    Value::Union(Rc::from(out))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.key(0) == other.key(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(None) => write!(f, "bool"),
            Value::Bool(Some(true)) => write!(f, "bool(True)"),
            Value::Bool(Some(false)) => write!(f, "bool(False)"),
            Value::Int(None) => write!(f, "int"),
            Value::Int(Some(n)) => write!(f, "int({n})"),
            Value::Float => write!(f, "float"),
            Value::Complex => write!(f, "complex"),
            Value::Str(None) => write!(f, "str"),
            Value::Str(Some(s)) => write!(f, "str('{s}')"),
            Value::Bytes => write!(f, "bytes"),
            Value::Object => write!(f, "object"),
            Value::List(e) => write!(f, "list[{e}]"),
            Value::Set(e) => write!(f, "set[{e}]"),
            Value::Dict(k, v) => write!(f, "dict[{k}, {v}]"),
            Value::Tuple(items) => {
                write!(f, "tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Generator(e) => write!(f, "generator[{e}]"),
            Value::KwargDict(_) => write!(f, "kwargs"),
            Value::Builtin(b) => write!(f, "{b}"),
            Value::Method(m) => write!(f, "method {}.{}", m.receiver, m.name),
            Value::Property(_) => write!(f, "property"),
            Value::Super(_) => write!(f, "super"),
            Value::External(r) => write!(f, "{r}"),
            Value::ExternalInstance(r) => write!(f, "instance {r}"),
            Value::Function(func) => write!(f, "function {}", func.name),
            Value::Class(class) => write!(f, "class {}", class.name),
            Value::Instance(class) => write!(f, "instance {}", class.name),
            Value::Module(module) => write!(f, "module {}", module.name),
            Value::Package(package) => write!(f, "package {}", package.name()),
            Value::Synthetic(s) => write!(f, "{}", s.name()),
            Value::Union(items) if items.is_empty() => write!(f, "?"),
            Value::Union(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Synthetic value wrapper for tests and policies that only need a label
pub struct Opaque {
    label: String,
    members: RefCell<Vec<(String, Value)>>,
}

impl Opaque {
    pub fn new(label: impl Into<String>) -> Rc<Self> {
        Rc::new(Opaque { label: label.into(), members: RefCell::new(Vec::new()) })
    }

    pub fn with_member(self: Rc<Self>, name: &str, value: Value) -> Rc<Self> {
        self.members.borrow_mut().push((name.to_string(), value));
        self
    }
}

impl Synthetic for Opaque {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn key(&self) -> String {
        format!("opaque:{}", self.label)
    }

    fn attr(&self, name: &str) -> Value {
        self.members
            .borrow()
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_else(Value::empty)
    }

    fn dir(&self) -> Vec<String> {
        self.members.borrow().iter().map(|(name, _)| name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_ints_stay_constant() {
        assert_eq!(Value::int(5).to_string(), "int(5)");
        assert_eq!(Value::int(1000).to_string(), "int(1000)");
        assert_eq!(Value::int(1001).to_string(), "int");
        assert_eq!(Value::int(-1).to_string(), "int");
    }

    #[test]
    fn test_unite_flattens_and_dedupes() {
        let a = Value::unite([Value::int(1), Value::str("x")]);
        let b = Value::unite([a.clone(), Value::int(1), Value::None]);
        assert_eq!(b.to_string(), "int(1) | str('x') | None");
        assert_eq!(b.disjuncts().len(), 3);
    }

    #[test]
    fn test_unite_single_is_unwrapped() {
        let v = Value::unite([Value::Float, Value::Float]);
        assert!(matches!(v, Value::Float));
        assert!(Value::unite(Vec::<Value>::new()).is_empty());
    }

    #[test]
    fn test_unite_groups_lists_and_dicts() {
        let v = Value::unite([
            Value::list(Value::int(1)),
            Value::Int(None),
            Value::list(Value::str("a")),
            Value::dict(Value::Str(None), Value::Int(None)),
            Value::dict(Value::Int(None), Value::Float),
        ]);
        assert_eq!(v.to_string(), "list[int(1) | str('a')] | int | dict[str | int, int | float]");
    }

    #[test]
    fn test_unite_keeps_tuples_per_index() {
        let v = Value::unite([
            Value::tuple(vec![Value::int(1), Value::str("a")]),
            Value::tuple(vec![Value::int(1), Value::str("a")]),
            Value::tuple(vec![Value::int(2)]),
        ]);
        assert_eq!(v.to_string(), "tuple(int(1), str('a')) | tuple(int(2))");
    }

    #[test]
    fn test_unite_truncates_to_max_disjuncts() {
        let v = Value::unite((0..40).map(Value::int));
        assert_eq!(v.disjuncts().len(), MAX_DISJUNCTS);
        assert_eq!(v.disjuncts()[0], Value::int(0));
    }

    #[test]
    fn test_nesting_is_clamped() {
        let mut v = Value::Int(None);
        for _ in 0..10 {
            v = Value::list(v);
        }
        assert!(v.depth() <= MAX_DEPTH);
    }

    #[test]
    fn test_widen() {
        let v = Value::unite([Value::int(3), Value::str("a"), Value::bool(true), Value::Float]);
        assert_eq!(v.widen().to_string(), "int | str | bool | float");
        assert_eq!(Value::tuple(vec![Value::int(1)]).widen().to_string(), "tuple(int)");
    }

    #[test]
    fn test_empty_display() {
        assert_eq!(Value::empty().to_string(), "?");
        assert_eq!(Value::list(Value::empty()).to_string(), "list[?]");
    }

    #[test]
    fn test_synthetic_dedupe_by_key() {
        let a: Rc<dyn Synthetic> = Opaque::new("manager");
        let b: Rc<dyn Synthetic> = Opaque::new("manager");
        let v = Value::unite([Value::Synthetic(a), Value::Synthetic(b)]);
        assert_eq!(v.disjuncts().len(), 1);
    }

    #[test]
    fn test_property_group_merges_accessors() {
        let getter = Value::str("get");
        let setter = Value::str("set");
        let v = Value::unite([
            Value::property(getter.clone(), Value::empty(), Value::empty()),
            Value::property(Value::empty(), setter.clone(), Value::empty()),
        ]);
        match v {
            Value::Property(p) => {
                assert_eq!(p.fget, getter);
                assert_eq!(p.fset, setter);
            }
            other => panic!("expected property, got {other}"),
        }
    }
}
