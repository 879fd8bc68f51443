//! Owned Python AST produced by [`crate::PythonParser`]
//!
//! Statements and expressions share one [`AstNode`] enum. Nodes that introduce a scope or a
//! definition (functions, classes, lambdas, comprehensions) carry a [`NodeId`] that is unique for
//! the lifetime of the process, so analysis results can be cached per node across passes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a definition node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Box<AstNode>>,
    pub annotation: Option<Box<AstNode>>,
    pub keyword_only: bool,
}

/// `*args` or `**kwargs`
#[derive(Debug, Clone, PartialEq)]
pub struct VarParameter {
    pub name: String,
    pub annotation: Option<Box<AstNode>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub params: Vec<Parameter>,
    pub vararg: Option<VarParameter>,
    pub kwarg: Option<VarParameter>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.vararg.is_none() && self.kwarg.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: AstNode,
}

/// One clause of an `import` statement: `a.b.c as d`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias {
    pub path: Vec<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub exception_type: Option<AstNode>,
    pub name: Option<AstNode>,
    pub body: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context_expr: AstNode,
    pub target: Option<AstNode>,
}

/// `for target in iter if cond` inside a comprehension
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: AstNode,
    pub iter: AstNode,
    pub ifs: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Decimal integer, `None` when it does not fit in an i64 or uses another radix
    Integer(Option<i64>),
    Float,
    Complex,
    Str(String),
    Bytes,
    Bool(bool),
    None,
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LeftShift,
    RightShift,
    BitOr,
    BitXor,
    BitAnd,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Invert,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Module {
        body: Vec<AstNode>,
    },
    FunctionDef {
        id: NodeId,
        name: String,
        params: Parameters,
        body: Vec<AstNode>,
        decorators: Vec<AstNode>,
        returns: Option<Box<AstNode>>,
        is_async: bool,
        line: usize,
    },
    ClassDef {
        id: NodeId,
        name: String,
        bases: Vec<AstNode>,
        keywords: Vec<Keyword>,
        body: Vec<AstNode>,
        decorators: Vec<AstNode>,
        line: usize,
    },
    /// `a = b = value`; one entry in `targets` per `=`
    Assignment {
        targets: Vec<AstNode>,
        value: Box<AstNode>,
    },
    AnnotatedAssignment {
        target: Box<AstNode>,
        annotation: Box<AstNode>,
        value: Option<Box<AstNode>>,
    },
    AugAssignment {
        target: Box<AstNode>,
        op: BinaryOperator,
        value: Box<AstNode>,
    },
    Return {
        value: Option<Box<AstNode>>,
    },
    Import {
        names: Vec<ImportAlias>,
    },
    ImportFrom {
        /// Number of leading dots in a relative import
        dots: usize,
        module: Vec<String>,
        names: Vec<ImportAlias>,
        wildcard: bool,
    },
    If {
        branches: Vec<(AstNode, Vec<AstNode>)>,
        else_body: Vec<AstNode>,
    },
    For {
        target: Box<AstNode>,
        iter: Box<AstNode>,
        body: Vec<AstNode>,
        else_body: Vec<AstNode>,
    },
    While {
        test: Box<AstNode>,
        body: Vec<AstNode>,
        else_body: Vec<AstNode>,
    },
    Try {
        body: Vec<AstNode>,
        handlers: Vec<ExceptHandler>,
        else_body: Vec<AstNode>,
        finally_body: Vec<AstNode>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<AstNode>,
    },
    Assert {
        test: Box<AstNode>,
        msg: Option<Box<AstNode>>,
    },
    Raise {
        exc: Option<Box<AstNode>>,
        cause: Option<Box<AstNode>>,
    },
    Delete {
        targets: Vec<AstNode>,
    },
    Global {
        names: Vec<String>,
    },
    Nonlocal {
        names: Vec<String>,
    },
    Pass,
    Break,
    Continue,
    /// Error-recovered or unsupported syntax; the pieces that did parse are kept
    Bad {
        approximation: Vec<AstNode>,
    },

    Identifier {
        name: String,
    },
    Literal {
        value: Literal,
    },
    /// f-string; only the interpolated expressions are kept
    FormattedString {
        values: Vec<AstNode>,
    },
    Attribute {
        object: Box<AstNode>,
        attribute: String,
    },
    Call {
        function: Box<AstNode>,
        args: Vec<AstNode>,
        keywords: Vec<Keyword>,
        starargs: Option<Box<AstNode>>,
        kwargs: Option<Box<AstNode>>,
    },
    Subscript {
        value: Box<AstNode>,
        slice: Box<AstNode>,
    },
    Slice {
        lower: Option<Box<AstNode>>,
        upper: Option<Box<AstNode>>,
        step: Option<Box<AstNode>>,
    },
    BinaryOp {
        left: Box<AstNode>,
        op: BinaryOperator,
        right: Box<AstNode>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<AstNode>,
    },
    Compare {
        left: Box<AstNode>,
        ops: Vec<CompareOperator>,
        comparators: Vec<AstNode>,
    },
    IfExp {
        test: Box<AstNode>,
        body: Box<AstNode>,
        orelse: Box<AstNode>,
    },
    Lambda {
        id: NodeId,
        params: Parameters,
        body: Box<AstNode>,
    },
    ListComp {
        id: NodeId,
        element: Box<AstNode>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        id: NodeId,
        element: Box<AstNode>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        id: NodeId,
        key: Box<AstNode>,
        value: Box<AstNode>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        id: NodeId,
        element: Box<AstNode>,
        generators: Vec<Comprehension>,
    },
    Tuple {
        elements: Vec<AstNode>,
    },
    List {
        elements: Vec<AstNode>,
    },
    Set {
        elements: Vec<AstNode>,
    },
    Dict {
        items: Vec<(AstNode, AstNode)>,
        splats: Vec<AstNode>,
    },
    Starred {
        value: Box<AstNode>,
    },
    NamedExpr {
        target: String,
        value: Box<AstNode>,
    },
    Await {
        value: Box<AstNode>,
    },
    Yield {
        value: Option<Box<AstNode>>,
        from: bool,
    },
}

impl AstNode {
    pub fn identifier(name: impl Into<String>) -> Self {
        AstNode::Identifier { name: name.into() }
    }

    /// Definition-node identity, if this node introduces a scope
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            AstNode::FunctionDef { id, .. }
            | AstNode::ClassDef { id, .. }
            | AstNode::Lambda { id, .. }
            | AstNode::ListComp { id, .. }
            | AstNode::SetComp { id, .. }
            | AstNode::DictComp { id, .. }
            | AstNode::GeneratorExp { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            AstNode::Identifier { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            AstNode::Module { .. }
                | AstNode::FunctionDef { .. }
                | AstNode::ClassDef { .. }
                | AstNode::Assignment { .. }
                | AstNode::AnnotatedAssignment { .. }
                | AstNode::AugAssignment { .. }
                | AstNode::Return { .. }
                | AstNode::Import { .. }
                | AstNode::ImportFrom { .. }
                | AstNode::If { .. }
                | AstNode::For { .. }
                | AstNode::While { .. }
                | AstNode::Try { .. }
                | AstNode::With { .. }
                | AstNode::Assert { .. }
                | AstNode::Raise { .. }
                | AstNode::Delete { .. }
                | AstNode::Global { .. }
                | AstNode::Nonlocal { .. }
                | AstNode::Pass
                | AstNode::Break
                | AstNode::Continue
        )
    }

    /// Top-level statements of a module, or an empty slice for anything else
    pub fn body(&self) -> &[AstNode] {
        match self {
            AstNode::Module { body } => body,
            _ => &[],
        }
    }
}

impl fmt::Display for AstNode {
    /// Compact source-like rendering used by evaluation traces
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNode::Identifier { name } => write!(f, "{name}"),
            AstNode::Literal { value } => match value {
                Literal::Integer(Some(n)) => write!(f, "{n}"),
                Literal::Integer(None) => write!(f, "<int>"),
                Literal::Float => write!(f, "<float>"),
                Literal::Complex => write!(f, "<complex>"),
                Literal::Str(s) => write!(f, "{s:?}"),
                Literal::Bytes => write!(f, "b\"..\""),
                Literal::Bool(true) => write!(f, "True"),
                Literal::Bool(false) => write!(f, "False"),
                Literal::None => write!(f, "None"),
                Literal::Ellipsis => write!(f, "..."),
            },
            AstNode::Attribute { object, attribute } => write!(f, "{object}.{attribute}"),
            AstNode::Call { function, args, .. } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            AstNode::Subscript { value, slice } => write!(f, "{value}[{slice}]"),
            AstNode::Tuple { elements } => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
            AstNode::Starred { value } => write!(f, "*{value}"),
            AstNode::FunctionDef { name, .. } => write!(f, "def {name}"),
            AstNode::ClassDef { name, .. } => write!(f, "class {name}"),
            AstNode::Lambda { .. } => write!(f, "lambda"),
            AstNode::ListComp { .. } => write!(f, "[...comprehension]"),
            AstNode::SetComp { .. } | AstNode::DictComp { .. } => write!(f, "{{...comprehension}}"),
            AstNode::GeneratorExp { .. } => write!(f, "(...generator)"),
            AstNode::List { .. } => write!(f, "[...]"),
            AstNode::Set { .. } | AstNode::Dict { .. } => write!(f, "{{...}}"),
            AstNode::BinaryOp { left, op, right } => write!(f, "{left} {op:?} {right}"),
            AstNode::UnaryOp { op, operand } => write!(f, "{op:?} {operand}"),
            other => write!(f, "<{}>", other.kind()),
        }
    }
}

impl AstNode {
    /// Short variant name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            AstNode::Module { .. } => "module",
            AstNode::FunctionDef { .. } => "function",
            AstNode::ClassDef { .. } => "class",
            AstNode::Assignment { .. } => "assignment",
            AstNode::AnnotatedAssignment { .. } => "annotated assignment",
            AstNode::AugAssignment { .. } => "augmented assignment",
            AstNode::Return { .. } => "return",
            AstNode::Import { .. } => "import",
            AstNode::ImportFrom { .. } => "import from",
            AstNode::If { .. } => "if",
            AstNode::For { .. } => "for",
            AstNode::While { .. } => "while",
            AstNode::Try { .. } => "try",
            AstNode::With { .. } => "with",
            AstNode::Assert { .. } => "assert",
            AstNode::Raise { .. } => "raise",
            AstNode::Delete { .. } => "del",
            AstNode::Global { .. } => "global",
            AstNode::Nonlocal { .. } => "nonlocal",
            AstNode::Pass => "pass",
            AstNode::Break => "break",
            AstNode::Continue => "continue",
            AstNode::Bad { .. } => "bad",
            AstNode::Identifier { .. } => "name",
            AstNode::Literal { .. } => "literal",
            AstNode::FormattedString { .. } => "f-string",
            AstNode::Attribute { .. } => "attribute",
            AstNode::Call { .. } => "call",
            AstNode::Subscript { .. } => "subscript",
            AstNode::Slice { .. } => "slice",
            AstNode::BinaryOp { .. } => "binary operation",
            AstNode::UnaryOp { .. } => "unary operation",
            AstNode::Compare { .. } => "comparison",
            AstNode::IfExp { .. } => "conditional expression",
            AstNode::Lambda { .. } => "lambda",
            AstNode::ListComp { .. } => "list comprehension",
            AstNode::SetComp { .. } => "set comprehension",
            AstNode::DictComp { .. } => "dict comprehension",
            AstNode::GeneratorExp { .. } => "generator expression",
            AstNode::Tuple { .. } => "tuple",
            AstNode::List { .. } => "list",
            AstNode::Set { .. } => "set",
            AstNode::Dict { .. } => "dict",
            AstNode::Starred { .. } => "starred",
            AstNode::NamedExpr { .. } => "named expression",
            AstNode::Await { .. } => "await",
            AstNode::Yield { .. } => "yield",
        }
    }
}
