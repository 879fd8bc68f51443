//! Hand-modelled builtins
//!
//! The package graph describes most of the `builtins` module, but the core types and the
//! functions whose result depends on their arguments (`list(x)`, `sorted(x)`, `zip(a, b)`) are
//! modelled here so that element types flow through them.

use super::{Args, BoundMethod, Value, ValueContext};
use lantern_core::AnalysisError;
use std::fmt;

type Outcome = Result<Value, AnalysisError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Object,
    Type,
    NoneType,
    Bool,
    Int,
    Float,
    Complex,
    Str,
    Bytes,
    List,
    Dict,
    Set,
    Tuple,
    Super,
    Property,
    Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Len,
    Range,
    Abs,
    Dir,
    Globals,
    Vars,
    Enumerate,
    Zip,
    Sorted,
    Reversed,
    Iter,
    Next,
    Min,
    Max,
    Sum,
    Map,
    Filter,
    Getattr,
    Isinstance,
    Issubclass,
    Eval,
    Divmod,
    Pow,
    Repr,
    Hash,
    Id,
    Callable,
    Hasattr,
    Round,
    Any,
    All,
    Chr,
    Ord,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Type(BuiltinType),
    Function(BuiltinFunction),
}

const TYPES: &[(&str, BuiltinType)] = &[
    ("object", BuiltinType::Object),
    ("type", BuiltinType::Type),
    ("NoneType", BuiltinType::NoneType),
    ("bool", BuiltinType::Bool),
    ("int", BuiltinType::Int),
    ("float", BuiltinType::Float),
    ("complex", BuiltinType::Complex),
    ("str", BuiltinType::Str),
    ("bytes", BuiltinType::Bytes),
    ("list", BuiltinType::List),
    ("dict", BuiltinType::Dict),
    ("set", BuiltinType::Set),
    ("tuple", BuiltinType::Tuple),
    ("super", BuiltinType::Super),
    ("property", BuiltinType::Property),
    ("slice", BuiltinType::Slice),
];

const FUNCTIONS: &[(&str, BuiltinFunction)] = &[
    ("len", BuiltinFunction::Len),
    ("range", BuiltinFunction::Range),
    ("abs", BuiltinFunction::Abs),
    ("dir", BuiltinFunction::Dir),
    ("globals", BuiltinFunction::Globals),
    ("vars", BuiltinFunction::Vars),
    ("enumerate", BuiltinFunction::Enumerate),
    ("zip", BuiltinFunction::Zip),
    ("sorted", BuiltinFunction::Sorted),
    ("reversed", BuiltinFunction::Reversed),
    ("iter", BuiltinFunction::Iter),
    ("next", BuiltinFunction::Next),
    ("min", BuiltinFunction::Min),
    ("max", BuiltinFunction::Max),
    ("sum", BuiltinFunction::Sum),
    ("map", BuiltinFunction::Map),
    ("filter", BuiltinFunction::Filter),
    ("getattr", BuiltinFunction::Getattr),
    ("isinstance", BuiltinFunction::Isinstance),
    ("issubclass", BuiltinFunction::Issubclass),
    ("eval", BuiltinFunction::Eval),
    ("divmod", BuiltinFunction::Divmod),
    ("pow", BuiltinFunction::Pow),
    ("repr", BuiltinFunction::Repr),
    ("hash", BuiltinFunction::Hash),
    ("id", BuiltinFunction::Id),
    ("callable", BuiltinFunction::Callable),
    ("hasattr", BuiltinFunction::Hasattr),
    ("round", BuiltinFunction::Round),
    ("any", BuiltinFunction::Any),
    ("all", BuiltinFunction::All),
    ("chr", BuiltinFunction::Chr),
    ("ord", BuiltinFunction::Ord),
    ("input", BuiltinFunction::Input),
];

impl BuiltinType {
    pub fn name(self) -> &'static str {
        TYPES.iter().find(|(_, t)| *t == self).map(|(n, _)| *n).unwrap_or("object")
    }

    pub fn from_name(name: &str) -> Option<BuiltinType> {
        TYPES.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    /// Generic instance of this type
    pub fn instance(self) -> Value {
        match self {
            BuiltinType::Object | BuiltinType::Slice => Value::Object,
            BuiltinType::Type => Value::builtin_type(BuiltinType::Type),
            BuiltinType::NoneType => Value::None,
            BuiltinType::Bool => Value::Bool(None),
            BuiltinType::Int => Value::Int(None),
            BuiltinType::Float => Value::Float,
            BuiltinType::Complex => Value::Complex,
            BuiltinType::Str => Value::Str(None),
            BuiltinType::Bytes => Value::Bytes,
            BuiltinType::List => Value::list(Value::empty()),
            BuiltinType::Dict => Value::dict(Value::empty(), Value::empty()),
            BuiltinType::Set => Value::set(Value::empty()),
            BuiltinType::Tuple => Value::tuple(Vec::new()),
            BuiltinType::Super => Value::Super(std::rc::Rc::from(Vec::new())),
            BuiltinType::Property => Value::property(Value::empty(), Value::empty(), Value::empty()),
        }
    }
}

impl BuiltinFunction {
    pub fn name(self) -> &'static str {
        FUNCTIONS.iter().find(|(_, f)| *f == self).map(|(n, _)| *n).unwrap_or("len")
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builtin::Type(t) => write!(f, "builtins.{}", t.name()),
            Builtin::Function(func) => write!(f, "builtins.{}", func.name()),
        }
    }
}

/// Hand-modelled entries that replace whatever the package graph says for these names
pub fn overrides() -> Vec<(&'static str, Value)> {
    TYPES
        .iter()
        .filter(|(_, t)| *t != BuiltinType::NoneType)
        .map(|(name, t)| (*name, Value::builtin_type(*t)))
        .chain(FUNCTIONS.iter().map(|(name, f)| (*name, Value::builtin_function(*f))))
        .collect()
}

/// Native value for a `builtins.*` graph path naming a type or modelled function
pub fn from_external(path: &str) -> Option<Value> {
    let name = path.strip_prefix("builtins.")?;
    if let Some(ty) = BuiltinType::from_name(name) {
        return Some(Value::builtin_type(ty));
    }
    FUNCTIONS.iter().find(|(n, _)| *n == name).map(|(_, f)| Value::builtin_function(*f))
}

/// Native instance for a `builtins.*` graph type path
pub fn instance_from_external(path: &str) -> Option<Value> {
    let name = path.strip_prefix("builtins.")?;
    match name {
        "frozenset" => Some(Value::set(Value::empty())),
        "bytearray" => Some(Value::Bytes),
        _ => BuiltinType::from_name(name).map(BuiltinType::instance),
    }
}

/// `type(value)`
pub fn type_of(value: &Value) -> Value {
    let ty = match value {
        Value::None => BuiltinType::NoneType,
        Value::Bool(_) => BuiltinType::Bool,
        Value::Int(_) => BuiltinType::Int,
        Value::Float => BuiltinType::Float,
        Value::Complex => BuiltinType::Complex,
        Value::Str(_) => BuiltinType::Str,
        Value::Bytes => BuiltinType::Bytes,
        Value::Object => BuiltinType::Object,
        Value::List(_) => BuiltinType::List,
        Value::Set(_) => BuiltinType::Set,
        Value::Dict(..) | Value::KwargDict(_) => BuiltinType::Dict,
        Value::Tuple(_) => BuiltinType::Tuple,
        Value::Property(_) => BuiltinType::Property,
        Value::Super(_) => BuiltinType::Super,
        Value::Class(_) | Value::External(_) | Value::Builtin(Builtin::Type(_)) => BuiltinType::Type,
        Value::Instance(class) => return Value::Class(class.clone()),
        Value::ExternalInstance(r) => return Value::External(r.clone()),
        Value::Union(items) => return Value::unite(items.iter().map(type_of)),
        _ => return Value::empty(),
    };
    Value::builtin_type(ty)
}

/// Call a builtin type as a constructor
pub fn construct(ctx: &ValueContext<'_>, ty: BuiltinType, args: &Args) -> Outcome {
    let first = args.get(0);
    let value = match ty {
        BuiltinType::Type if args.positional.len() == 1 => type_of(&first),
        BuiltinType::Type => Value::builtin_type(BuiltinType::Type),
        BuiltinType::List if args.positional.is_empty() => Value::list(Value::empty()),
        BuiltinType::List => Value::list(ctx.elem(&first)?),
        BuiltinType::Set if args.positional.is_empty() => Value::set(Value::empty()),
        BuiltinType::Set => Value::set(ctx.elem(&first)?),
        BuiltinType::Tuple => match &first {
            Value::Tuple(_) => first.clone(),
            _ if args.positional.is_empty() => Value::tuple(Vec::new()),
            _ => Value::tuple(vec![ctx.elem(&first)?]),
        },
        BuiltinType::Dict => {
            let keywords = Value::unite(args.keywords.iter().map(|(_, v)| v.widen()));
            let from_keywords = if args.keywords.is_empty() {
                Value::empty()
            } else {
                Value::dict(Value::Str(None), keywords)
            };
            let from_arg = match &first {
                Value::Dict(..) => first.clone(),
                _ if args.positional.is_empty() => Value::empty(),
                _ => {
                    let pair = ctx.elem(&first)?;
                    let key = ctx.index(&pair, &Value::int(0))?;
                    let value = ctx.index(&pair, &Value::int(1))?;
                    Value::dict(key, value)
                }
            };
            let built = Value::unite([from_arg, from_keywords]);
            if built.is_empty() { Value::dict(Value::empty(), Value::empty()) } else { built }
        }
        BuiltinType::Property => {
            Value::property(args.arg(0, "fget"), args.arg(1, "fset"), args.arg(2, "fdel"))
        }
        BuiltinType::Super => Value::empty(),
        other => other.instance(),
    };
    Ok(value)
}

/// Call a modelled builtin function
pub fn call_function(ctx: &ValueContext<'_>, function: BuiltinFunction, args: &Args) -> Outcome {
    use BuiltinFunction::*;
    let first = args.get(0);
    let value = match function {
        Len | Hash | Id | Ord => Value::Int(None),
        Range => Value::list(Value::Int(None)),
        Abs | Pow => Value::unite([Value::Int(None), Value::Float]),
        Round => Value::Int(None),
        Dir => Value::list(Value::Str(None)),
        Globals | Vars => Value::dict(Value::Str(None), Value::empty()),
        Enumerate => Value::list(Value::tuple(vec![Value::Int(None), ctx.elem(&first)?])),
        Zip => {
            let mut items = Vec::with_capacity(args.positional.len());
            for arg in &args.positional {
                items.push(ctx.elem(arg)?);
            }
            Value::list(Value::tuple(items))
        }
        Sorted | Reversed => Value::list(ctx.elem(&first)?),
        Iter => Value::generator(ctx.elem(&first)?),
        Next => Value::unite([ctx.elem(&first)?, args.get(1)]),
        Min | Max => {
            let candidates = if args.positional.len() == 1 {
                ctx.elem(&first)?
            } else {
                Value::unite(args.positional.iter().cloned())
            };
            Value::unite([candidates, args.keyword("default").unwrap_or_else(Value::empty)])
        }
        Sum => {
            let elem = ctx.elem(&first)?.widen();
            if elem.is_empty() { Value::Int(None) } else { elem }
        }
        Map => {
            let mut mapped = Vec::new();
            for iterable in args.positional.iter().skip(1) {
                mapped.push(ctx.elem(iterable)?);
            }
            Value::list(ctx.call(&first, &Args::positional(mapped))?)
        }
        Filter => Value::list(ctx.elem(&args.get(1))?),
        Getattr => {
            let found = match args.get(1).as_str_constant() {
                Some(name) => ctx.attr(&first, name)?,
                None => Value::empty(),
            };
            Value::unite([found, args.get(2)])
        }
        Isinstance | Issubclass | Callable | Hasattr | Any | All => Value::Bool(None),
        Divmod => Value::tuple(vec![Value::Int(None), Value::Int(None)]),
        Repr | Chr | Input => Value::Str(None),
        // Evaluated by the propagator when its argument is a string constant
        Eval => Value::empty(),
    };
    Ok(value)
}

const STR_METHODS: &[&str] = &[
    "capitalize", "casefold", "center", "count", "encode", "endswith", "expandtabs", "find", "format",
    "format_map", "index", "isalnum", "isalpha", "isascii", "isdecimal", "isdigit", "isidentifier", "islower",
    "isnumeric", "isprintable", "isspace", "istitle", "isupper", "join", "ljust", "lower", "lstrip", "partition",
    "removeprefix", "removesuffix", "replace", "rfind", "rindex", "rjust", "rpartition", "rsplit", "rstrip",
    "split", "splitlines", "startswith", "strip", "swapcase", "title", "translate", "upper", "zfill",
];
const BYTES_METHODS: &[&str] = &[
    "count", "decode", "endswith", "find", "hex", "join", "lower", "replace", "split", "startswith", "strip", "upper",
];
const LIST_METHODS: &[&str] =
    &["append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse", "sort"];
const DICT_METHODS: &[&str] =
    &["clear", "copy", "fromkeys", "get", "items", "keys", "pop", "popitem", "setdefault", "update", "values"];
const SET_METHODS: &[&str] = &[
    "add", "clear", "copy", "difference", "difference_update", "discard", "intersection", "intersection_update",
    "isdisjoint", "issubset", "issuperset", "pop", "remove", "symmetric_difference", "symmetric_difference_update",
    "union", "update",
];
const TUPLE_METHODS: &[&str] = &["count", "index"];
const INT_METHODS: &[&str] =
    &["as_integer_ratio", "bit_length", "conjugate", "to_bytes", "real", "imag", "numerator", "denominator"];
const FLOAT_METHODS: &[&str] = &["as_integer_ratio", "conjugate", "hex", "is_integer", "real", "imag"];
const COMPLEX_METHODS: &[&str] = &["conjugate", "real", "imag"];
const GENERATOR_METHODS: &[&str] = &["send", "throw", "close", "__next__", "__iter__"];
const OBJECT_METHODS: &[&str] = &["__class__", "__doc__", "__init__", "__repr__", "__str__", "__eq__", "__hash__"];

/// Attribute names a builtin instance supports
pub fn method_names(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Str(_) => STR_METHODS,
        Value::Bytes => BYTES_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(..) | Value::KwargDict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Int(_) | Value::Bool(_) => INT_METHODS,
        Value::Float => FLOAT_METHODS,
        Value::Complex => COMPLEX_METHODS,
        Value::Generator(_) => GENERATOR_METHODS,
        Value::Object => OBJECT_METHODS,
        _ => &[],
    }
}

/// Attribute of a builtin instance; data attributes resolve directly, methods bind their receiver
pub fn instance_attr(receiver: &Value, name: &str) -> Value {
    if !method_names(receiver).contains(&name) {
        return Value::empty();
    }
    match (receiver, name) {
        (Value::Int(_) | Value::Bool(_), "real" | "imag" | "numerator" | "denominator") => Value::Int(None),
        (Value::Float | Value::Complex, "real" | "imag") => Value::Float,
        (_, "__class__") => type_of(receiver),
        (_, "__doc__") => Value::Str(None),
        _ => Value::method(receiver.clone(), name),
    }
}

/// Call a method bound to a builtin instance
pub fn call_method(ctx: &ValueContext<'_>, method: &BoundMethod, args: &Args) -> Outcome {
    let receiver = &method.receiver;
    let name: &str = &method.name;
    let arg = args.get(0);
    let value = match receiver {
        Value::Str(_) => match name {
            "count" | "find" | "index" | "rfind" | "rindex" => Value::Int(None),
            "encode" => Value::Bytes,
            "partition" | "rpartition" => Value::tuple(vec![Value::Str(None), Value::Str(None), Value::Str(None)]),
            "split" | "rsplit" | "splitlines" => Value::list(Value::Str(None)),
            n if n.starts_with("is") || n == "endswith" || n == "startswith" => Value::Bool(None),
            _ => Value::Str(None),
        },
        Value::Bytes => match name {
            "count" | "find" => Value::Int(None),
            "decode" | "hex" => Value::Str(None),
            "endswith" | "startswith" => Value::Bool(None),
            "split" => Value::list(Value::Bytes),
            _ => Value::Bytes,
        },
        Value::List(elem) => match name {
            "copy" => receiver.clone(),
            "count" | "index" => Value::Int(None),
            "pop" => (**elem).clone(),
            _ => Value::None,
        },
        Value::Dict(key, value) => match name {
            "get" => Value::unite([(**value).clone(), args.positional.get(1).cloned().unwrap_or(Value::None)]),
            "items" => Value::list(Value::tuple(vec![(**key).clone(), (**value).clone()])),
            "keys" => Value::list((**key).clone()),
            "values" => Value::list((**value).clone()),
            "pop" => Value::unite([(**value).clone(), args.get(1)]),
            "popitem" => Value::tuple(vec![(**key).clone(), (**value).clone()]),
            "setdefault" => Value::unite([(**value).clone(), args.get(1)]),
            "copy" | "fromkeys" => receiver.clone(),
            _ => Value::None,
        },
        Value::KwargDict(dict) => match name {
            "get" => match arg.as_str_constant() {
                Some(key) => Value::unite([dict.get(key).unwrap_or_else(Value::empty), args.get(1)]),
                None => Value::unite([dict.values(), args.get(1)]),
            },
            "items" => Value::list(Value::tuple(vec![Value::Str(None), dict.values()])),
            "keys" => Value::list(Value::Str(None)),
            "values" => Value::list(dict.values()),
            "pop" | "setdefault" => Value::unite([dict.values(), args.get(1)]),
            "popitem" => Value::tuple(vec![Value::Str(None), dict.values()]),
            "copy" => receiver.clone(),
            _ => Value::None,
        },
        Value::Set(elem) => match name {
            "isdisjoint" | "issubset" | "issuperset" => Value::Bool(None),
            "pop" => (**elem).clone(),
            "copy" | "difference" | "intersection" | "symmetric_difference" => receiver.clone(),
            "union" => Value::unite([receiver.clone(), Value::set(ctx.elem(&arg)?)]),
            _ => Value::None,
        },
        Value::Tuple(_) => Value::Int(None),
        Value::Int(_) | Value::Bool(_) => match name {
            "to_bytes" => Value::Bytes,
            "as_integer_ratio" => Value::tuple(vec![Value::Int(None), Value::Int(None)]),
            _ => Value::Int(None),
        },
        Value::Float => match name {
            "hex" => Value::Str(None),
            "is_integer" => Value::Bool(None),
            "as_integer_ratio" => Value::tuple(vec![Value::Int(None), Value::Int(None)]),
            _ => Value::Float,
        },
        Value::Complex => Value::Complex,
        Value::Property(property) => match name {
            "setter" => Value::property(property.fget.clone(), arg, property.fdel.clone()),
            "getter" => Value::property(arg, property.fset.clone(), property.fdel.clone()),
            "deleter" => Value::property(property.fget.clone(), property.fset.clone(), arg),
            _ => Value::empty(),
        },
        Value::Generator(elem) => match name {
            "close" => Value::None,
            "__iter__" => receiver.clone(),
            _ => (**elem).clone(),
        },
        Value::Object => match name {
            "__repr__" | "__str__" => Value::Str(None),
            "__eq__" => Value::Bool(None),
            "__hash__" => Value::Int(None),
            _ => Value::None,
        },
        _ => Value::empty(),
    };
    Ok(value)
}
