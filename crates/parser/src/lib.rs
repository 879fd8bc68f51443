//! Lantern Parser
//!
//! Lowers Python source into the owned [`AstNode`] tree consumed by the analyzer.
//! Parsing is error tolerant: syntax tree-sitter could not make sense of becomes [`AstNode::Bad`]
//! holding whatever sub-expressions could still be recovered.

use lantern_core::{ParseError, Result};
use std::cell::Cell;
use tree_sitter::{Node, Parser, Tree};

pub mod ast;
pub mod imports;

pub use ast::*;
pub use imports::{ImportDecl, extract_imports};

/// Deepest syntax nesting lowered as written; anything below it becomes [`AstNode::Bad`]
pub const MAX_NESTING: usize = 100;

/// Python parser using [tree_sitter]
pub struct PythonParser {
    parser: Parser,
    depth: Cell<usize>,
}

/// Represents a parsed Python source file
pub struct ParsedFile {
    pub tree: Tree,
    pub source: String,
}

struct InfoCall {
    args: Vec<AstNode>,
    keywords: Vec<Keyword>,
    starargs: Option<Box<AstNode>>,
    kwargs: Option<Box<AstNode>>,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_python::LANGUAGE;
        let mut parser = Parser::new();
        parser
            .set_language(&language.into())
            .map_err(|e| ParseError::TreeSitterError(e.to_string()))?;

        Ok(PythonParser { parser, depth: Cell::new(0) })
    }

    /// Parse Python source code into a tree
    pub fn parse(&mut self, source: &str) -> Result<ParsedFile> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ParseError::TreeSitterError("Failed to parse source".to_string()))?;

        Ok(ParsedFile { tree, source: source.to_string() })
    }

    /// Convert tree-sitter CST to our AST
    pub fn to_ast(&self, parsed: &ParsedFile) -> Result<AstNode> {
        let root_node = parsed.tree.root_node();
        self.node_to_ast(root_node, &parsed.source)
    }

    /// Parse and lower in one step
    pub fn parse_module(&mut self, source: &str) -> Result<AstNode> {
        let parsed = self.parse(source)?;
        self.to_ast(&parsed)
    }

    /// Debug helper to print tree structure
    pub fn debug_tree(&self, parsed: &ParsedFile) -> String {
        let root_node = parsed.tree.root_node();
        Self::debug_node(root_node, &parsed.source, 0)
    }

    fn debug_node(node: Node, source: &str, depth: usize) -> String {
        let indent = "  ".repeat(depth);
        let text = node.utf8_text(source.as_bytes()).unwrap_or("<invalid>");
        let mut result = format!("{}{}: '{}'\n", indent, node.kind(), text.replace('\n', "\\n"));

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            result.push_str(&Self::debug_node(child, source, depth + 1));
        }
        result
    }

    fn node_to_ast(&self, node: Node, source: &str) -> Result<AstNode> {
        let depth = self.depth.get();
        if depth >= MAX_NESTING {
            tracing::trace!(kind = node.kind(), line = node.start_position().row + 1, "nesting too deep");
            return Ok(AstNode::Bad { approximation: Vec::new() });
        }
        self.depth.set(depth + 1);
        let lowered = self.lower(node, source);
        self.depth.set(depth);
        lowered
    }

    /// Dispatch on the node kind. Arms stay single calls so this frame stays small.
    fn lower(&self, node: Node, source: &str) -> Result<AstNode> {
        match node.kind() {
            "module" => self.lower_module(&node, source),
            "decorated_definition" => self.extract_decorated(&node, source),
            "function_definition" => self.extract_function(&node, source, Vec::new()),
            "class_definition" => self.extract_class(&node, source, Vec::new()),
            "expression_statement" => self.lower_expression_statement(&node, source),
            "assignment" => self.extract_assignment(&node, source),
            "augmented_assignment" => self.lower_augmented_assignment(&node, source),
            "return_statement" => self.lower_return(&node, source),
            "import_statement" => self.lower_import(&node, source),
            "import_from_statement" => self.extract_import_from(&node, source),
            "if_statement" => self.extract_if(&node, source),
            "for_statement" => self.lower_for(&node, source),
            "while_statement" => self.lower_while(&node, source),
            "try_statement" => self.extract_try(&node, source),
            "with_statement" => self.extract_with(&node, source),
            "assert_statement" => self.lower_assert(&node, source),
            "raise_statement" => self.lower_raise(&node, source),
            "delete_statement" => self.lower_delete(&node, source),
            "global_statement" => self.lower_global(&node, source),
            "nonlocal_statement" => self.lower_nonlocal(&node, source),
            "pass_statement" | "future_import_statement" => Ok(AstNode::Pass),
            "break_statement" => Ok(AstNode::Break),
            "continue_statement" => Ok(AstNode::Continue),

            "identifier" => self.lower_identifier(&node, source),
            "integer" | "float" | "true" | "false" | "none" | "ellipsis" => self.lower_literal(&node, source),
            "string" => self.extract_string(&node, source),
            "concatenated_string" => self.extract_concatenated_string(&node, source),
            "attribute" => self.lower_attribute(&node, source),
            "call" => self.lower_call(&node, source),
            "subscript" => self.lower_subscript(&node, source),
            "slice" => self.extract_slice(&node, source),
            "binary_operator" => self.lower_binary(&node, source),
            "boolean_operator" => self.lower_boolean(&node, source),
            "not_operator" | "unary_operator" => self.lower_unary(&node, source),
            "comparison_operator" => self.extract_comparison(&node, source),
            "conditional_expression" => self.lower_conditional(&node, source),
            "lambda" => self.lower_lambda(&node, source),
            "list_comprehension" | "set_comprehension" | "generator_expression" => {
                self.lower_comprehension(&node, source)
            }
            "dictionary_comprehension" => self.lower_dict_comprehension(&node, source),
            "tuple" | "expression_list" | "pattern_list" | "tuple_pattern" | "list" | "list_pattern" | "set" => {
                self.lower_sequence(&node, source)
            }
            "dictionary" => self.extract_dictionary(&node, source),
            "parenthesized_expression" | "type" | "as_pattern" => self.lower_parenthesized(&node, source),
            "list_splat" | "list_splat_pattern" | "dictionary_splat" | "dictionary_splat_pattern" => {
                self.lower_splat(&node, source)
            }
            "named_expression" => self.lower_named_expression(&node, source),
            "await" => self.lower_await(&node, source),
            "yield" => self.lower_yield(&node, source),
            _ => self.lower_unsupported(&node, source),
        }
    }

    fn lower_module(&self, node: &Node, source: &str) -> Result<AstNode> {
        Ok(AstNode::Module { body: self.extract_body(node, source)? })
    }

    fn lower_expression_statement(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut children = self.named_children_ast(node, source)?;
        match children.len() {
            0 => Ok(AstNode::Pass),
            1 => Ok(children.remove(0)),
            _ => Ok(AstNode::Tuple { elements: children }),
        }
    }

    fn lower_augmented_assignment(&self, node: &Node, source: &str) -> Result<AstNode> {
        let target = self.field_ast(node, "left", source)?;
        let value = self.field_ast(node, "right", source)?;
        let op_text = node
            .child_by_field_name("operator")
            .map(|op| self.text(&op, source))
            .transpose()?
            .unwrap_or("+=");
        let op = self
            .parse_binary_operator(op_text.trim_end_matches('='))
            .unwrap_or(BinaryOperator::Add);
        Ok(AstNode::AugAssignment { target: Box::new(target), op, value: Box::new(value) })
    }

    fn lower_return(&self, node: &Node, source: &str) -> Result<AstNode> {
        let value = self.first_named_ast(node, source)?;
        Ok(AstNode::Return { value: value.map(Box::new) })
    }

    fn lower_import(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            names.push(self.extract_import_alias(&child, source)?);
        }
        Ok(AstNode::Import { names })
    }

    fn lower_for(&self, node: &Node, source: &str) -> Result<AstNode> {
        let target = self.field_ast(node, "left", source)?;
        let iter = self.field_ast(node, "right", source)?;
        let body = self.field_body(node, "body", source)?;
        let else_body = self.extract_alternative(node, source)?;
        Ok(AstNode::For { target: Box::new(target), iter: Box::new(iter), body, else_body })
    }

    fn lower_while(&self, node: &Node, source: &str) -> Result<AstNode> {
        let test = self.field_ast(node, "condition", source)?;
        let body = self.field_body(node, "body", source)?;
        let else_body = self.extract_alternative(node, source)?;
        Ok(AstNode::While { test: Box::new(test), body, else_body })
    }

    fn lower_assert(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut parts = self.named_children_ast(node, source)?.into_iter();
        let test = parts.next().unwrap_or(AstNode::Bad { approximation: Vec::new() });
        Ok(AstNode::Assert { test: Box::new(test), msg: parts.next().map(Box::new) })
    }

    fn lower_raise(&self, node: &Node, source: &str) -> Result<AstNode> {
        let cause_node = node.child_by_field_name("cause");
        let cause = cause_node.map(|c| self.node_to_ast(c, source)).transpose()?;
        let exc = match node.named_child(0) {
            Some(child) if Some(child.id()) != cause_node.map(|c| c.id()) => Some(self.node_to_ast(child, source)?),
            _ => None,
        };
        Ok(AstNode::Raise { exc: exc.map(Box::new), cause: cause.map(Box::new) })
    }

    fn lower_delete(&self, node: &Node, source: &str) -> Result<AstNode> {
        let targets = match self.first_named_ast(node, source)? {
            Some(AstNode::Tuple { elements }) => elements,
            Some(target) => vec![target],
            None => Vec::new(),
        };
        Ok(AstNode::Delete { targets })
    }

    fn lower_global(&self, node: &Node, source: &str) -> Result<AstNode> {
        Ok(AstNode::Global { names: self.identifier_children(node, source)? })
    }

    fn lower_nonlocal(&self, node: &Node, source: &str) -> Result<AstNode> {
        Ok(AstNode::Nonlocal { names: self.identifier_children(node, source)? })
    }

    fn lower_identifier(&self, node: &Node, source: &str) -> Result<AstNode> {
        Ok(AstNode::Identifier { name: self.text(node, source)?.to_string() })
    }

    fn lower_literal(&self, node: &Node, source: &str) -> Result<AstNode> {
        Ok(AstNode::Literal { value: self.extract_literal_value(node, source)? })
    }

    fn lower_attribute(&self, node: &Node, source: &str) -> Result<AstNode> {
        let object = self.field_ast(node, "object", source)?;
        let attribute = match node.child_by_field_name("attribute") {
            Some(attr) => self.text(&attr, source)?.to_string(),
            None => return Ok(AstNode::Bad { approximation: vec![object] }),
        };
        Ok(AstNode::Attribute { object: Box::new(object), attribute })
    }

    fn lower_call(&self, node: &Node, source: &str) -> Result<AstNode> {
        let function = self.field_ast(node, "function", source)?;
        let InfoCall { args, keywords, starargs, kwargs } = self.extract_call_arguments(node, source)?;
        Ok(AstNode::Call { function: Box::new(function), args, keywords, starargs, kwargs })
    }

    fn lower_subscript(&self, node: &Node, source: &str) -> Result<AstNode> {
        let value = self.field_ast(node, "value", source)?;
        let mut cursor = node.walk();
        let mut subscripts = Vec::new();
        for child in node.children_by_field_name("subscript", &mut cursor) {
            subscripts.push(self.node_to_ast(child, source)?);
        }
        let slice = match subscripts.len() {
            0 => AstNode::Bad { approximation: Vec::new() },
            1 => subscripts.remove(0),
            _ => AstNode::Tuple { elements: subscripts },
        };
        Ok(AstNode::Subscript { value: Box::new(value), slice: Box::new(slice) })
    }

    fn lower_binary(&self, node: &Node, source: &str) -> Result<AstNode> {
        let left = self.field_ast(node, "left", source)?;
        let right = self.field_ast(node, "right", source)?;
        let op_text = node
            .child_by_field_name("operator")
            .map(|op| self.text(&op, source))
            .transpose()?
            .unwrap_or("+");
        let op = self.parse_binary_operator(op_text)?;
        Ok(AstNode::BinaryOp { left: Box::new(left), op, right: Box::new(right) })
    }

    fn lower_boolean(&self, node: &Node, source: &str) -> Result<AstNode> {
        let left = self.field_ast(node, "left", source)?;
        let right = self.field_ast(node, "right", source)?;
        let op = match node.child_by_field_name("operator").map(|op| op.kind()) {
            Some("or") => BinaryOperator::Or,
            _ => BinaryOperator::And,
        };
        Ok(AstNode::BinaryOp { left: Box::new(left), op, right: Box::new(right) })
    }

    /// `not x`, `-x`, `+x` and `~x`
    fn lower_unary(&self, node: &Node, source: &str) -> Result<AstNode> {
        let operand = self.field_ast(node, "argument", source)?;
        let op = if node.kind() == "not_operator" {
            UnaryOperator::Not
        } else {
            let op_text = node
                .child_by_field_name("operator")
                .map(|op| self.text(&op, source))
                .transpose()?
                .unwrap_or("-");
            self.parse_unary_operator(op_text)?
        };
        Ok(AstNode::UnaryOp { op, operand: Box::new(operand) })
    }

    fn lower_conditional(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut parts = self.named_children_ast(node, source)?.into_iter();
        let body = parts.next().unwrap_or(AstNode::Bad { approximation: Vec::new() });
        let test = parts.next().unwrap_or(AstNode::Bad { approximation: Vec::new() });
        let orelse = parts.next().unwrap_or(AstNode::Bad { approximation: Vec::new() });
        Ok(AstNode::IfExp { test: Box::new(test), body: Box::new(body), orelse: Box::new(orelse) })
    }

    fn lower_lambda(&self, node: &Node, source: &str) -> Result<AstNode> {
        let params = match node.child_by_field_name("parameters") {
            Some(params) => self.extract_parameters(&params, source)?,
            None => Parameters::default(),
        };
        let body = self.field_ast(node, "body", source)?;
        Ok(AstNode::Lambda { id: NodeId::fresh(), params, body: Box::new(body) })
    }

    fn lower_comprehension(&self, node: &Node, source: &str) -> Result<AstNode> {
        let element = Box::new(self.field_ast(node, "body", source)?);
        let generators = self.extract_comprehension_clauses(node, source)?;
        let id = NodeId::fresh();
        Ok(match node.kind() {
            "set_comprehension" => AstNode::SetComp { id, element, generators },
            "generator_expression" => AstNode::GeneratorExp { id, element, generators },
            _ => AstNode::ListComp { id, element, generators },
        })
    }

    fn lower_dict_comprehension(&self, node: &Node, source: &str) -> Result<AstNode> {
        let (key, value) = match node.child_by_field_name("body") {
            Some(pair) => (self.field_ast(&pair, "key", source)?, self.field_ast(&pair, "value", source)?),
            None => (AstNode::Bad { approximation: Vec::new() }, AstNode::Bad { approximation: Vec::new() }),
        };
        let generators = self.extract_comprehension_clauses(node, source)?;
        Ok(AstNode::DictComp { id: NodeId::fresh(), key: Box::new(key), value: Box::new(value), generators })
    }

    fn lower_sequence(&self, node: &Node, source: &str) -> Result<AstNode> {
        let elements = self.named_children_ast(node, source)?;
        Ok(match node.kind() {
            "list" | "list_pattern" => AstNode::List { elements },
            "set" => AstNode::Set { elements },
            _ => AstNode::Tuple { elements },
        })
    }

    fn lower_parenthesized(&self, node: &Node, source: &str) -> Result<AstNode> {
        match node.named_child(0) {
            Some(child) => self.node_to_ast(child, source),
            None => Ok(AstNode::Tuple { elements: Vec::new() }),
        }
    }

    fn lower_splat(&self, node: &Node, source: &str) -> Result<AstNode> {
        let value = match node.named_child(0) {
            Some(child) => self.node_to_ast(child, source)?,
            None => AstNode::Bad { approximation: Vec::new() },
        };
        Ok(AstNode::Starred { value: Box::new(value) })
    }

    fn lower_named_expression(&self, node: &Node, source: &str) -> Result<AstNode> {
        let target = match node.child_by_field_name("name") {
            Some(name) => self.text(&name, source)?.to_string(),
            None => return Ok(AstNode::Bad { approximation: self.named_children_ast(node, source)? }),
        };
        let value = self.field_ast(node, "value", source)?;
        Ok(AstNode::NamedExpr { target, value: Box::new(value) })
    }

    fn lower_await(&self, node: &Node, source: &str) -> Result<AstNode> {
        let value = self.first_named_ast(node, source)?.unwrap_or(AstNode::Bad { approximation: Vec::new() });
        Ok(AstNode::Await { value: Box::new(value) })
    }

    fn lower_yield(&self, node: &Node, source: &str) -> Result<AstNode> {
        let from = {
            let mut cursor = node.walk();
            node.children(&mut cursor).any(|child| child.kind() == "from")
        };
        let value = self.first_named_ast(node, source)?;
        Ok(AstNode::Yield { value: value.map(Box::new), from })
    }

    fn lower_unsupported(&self, node: &Node, source: &str) -> Result<AstNode> {
        tracing::trace!(kind = node.kind(), "approximating unsupported syntax");
        Ok(AstNode::Bad { approximation: self.named_children_ast(node, source)? })
    }

    fn text<'s>(&self, node: &Node, source: &'s str) -> Result<&'s str> {
        Ok(node.utf8_text(source.as_bytes()).map_err(|_| ParseError::InvalidUtf8)?)
    }

    /// Lower a required field, approximating when error recovery dropped it
    fn field_ast(&self, node: &Node, field: &str, source: &str) -> Result<AstNode> {
        match node.child_by_field_name(field) {
            Some(child) => self.node_to_ast(child, source),
            None => Ok(AstNode::Bad { approximation: Vec::new() }),
        }
    }

    fn field_body(&self, node: &Node, field: &str, source: &str) -> Result<Vec<AstNode>> {
        match node.child_by_field_name(field) {
            Some(block) => self.extract_body(&block, source),
            None => Ok(Vec::new()),
        }
    }

    fn first_named_ast(&self, node: &Node, source: &str) -> Result<Option<AstNode>> {
        let mut cursor = node.walk();
        let first = node.named_children(&mut cursor).find(|child| !child.is_extra());
        first.map(|child| self.node_to_ast(child, source)).transpose()
    }

    fn named_children_ast(&self, node: &Node, source: &str) -> Result<Vec<AstNode>> {
        let mut elements = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if !child.is_extra() {
                elements.push(self.node_to_ast(child, source)?);
            }
        }
        Ok(elements)
    }

    fn identifier_children(&self, node: &Node, source: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "identifier" {
                names.push(self.text(&child, source)?.to_string());
            }
        }
        Ok(names)
    }

    fn extract_body(&self, node: &Node, source: &str) -> Result<Vec<AstNode>> {
        let mut body = Vec::new();
        let mut cursor = node.walk();

        for child in node.named_children(&mut cursor) {
            if !child.is_extra() {
                body.push(self.node_to_ast(child, source)?);
            }
        }

        Ok(body)
    }

    fn extract_decorated(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut decorators = Vec::new();
        let mut definition = None;
        let mut cursor = node.walk();

        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "decorator" => {
                    if let Some(expr) = child.named_child(0) {
                        decorators.push(self.node_to_ast(expr, source)?);
                    }
                }
                "function_definition" | "class_definition" => definition = Some(child),
                _ => {}
            }
        }

        match definition {
            Some(def) if def.kind() == "class_definition" => self.extract_class(&def, source, decorators),
            Some(def) => self.extract_function(&def, source, decorators),
            None => Ok(AstNode::Bad { approximation: decorators }),
        }
    }

    fn extract_function(&self, node: &Node, source: &str, decorators: Vec<AstNode>) -> Result<AstNode> {
        let name = match node.child_by_field_name("name") {
            Some(name) => self.text(&name, source)?.to_string(),
            None => return Ok(AstNode::Bad { approximation: decorators }),
        };
        let params = match node.child_by_field_name("parameters") {
            Some(params) => self.extract_parameters(&params, source)?,
            None => Parameters::default(),
        };
        let returns = node
            .child_by_field_name("return_type")
            .map(|ret| self.node_to_ast(ret, source))
            .transpose()?
            .map(Box::new);
        let body = self.field_body(node, "body", source)?;
        let is_async = {
            let mut cursor = node.walk();
            node.children(&mut cursor).any(|child| child.kind() == "async")
        };

        Ok(AstNode::FunctionDef {
            id: NodeId::fresh(),
            name,
            params,
            body,
            decorators,
            returns,
            is_async,
            line: node.start_position().row + 1,
        })
    }

    fn extract_class(&self, node: &Node, source: &str, decorators: Vec<AstNode>) -> Result<AstNode> {
        let name = match node.child_by_field_name("name") {
            Some(name) => self.text(&name, source)?.to_string(),
            None => return Ok(AstNode::Bad { approximation: decorators }),
        };
        let (bases, keywords) = match node.child_by_field_name("superclasses") {
            Some(arg_list) => {
                let InfoCall { args, keywords, .. } = self.extract_argument_list(&arg_list, source)?;
                (args, keywords)
            }
            None => (Vec::new(), Vec::new()),
        };
        let body = self.field_body(node, "body", source)?;

        Ok(AstNode::ClassDef {
            id: NodeId::fresh(),
            name,
            bases,
            keywords,
            body,
            decorators,
            line: node.start_position().row + 1,
        })
    }

    fn extract_parameters(&self, params: &Node, source: &str) -> Result<Parameters> {
        let mut parameters = Parameters::default();
        let mut keyword_only = false;
        let mut cursor = params.walk();

        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => parameters.params.push(Parameter {
                    name: self.text(&child, source)?.to_string(),
                    default: None,
                    annotation: None,
                    keyword_only,
                }),
                "default_parameter" | "typed_default_parameter" => {
                    let Some(name_node) = child.child_by_field_name("name") else { continue };
                    let default = child
                        .child_by_field_name("value")
                        .map(|value| self.node_to_ast(value, source))
                        .transpose()?;
                    let annotation = child
                        .child_by_field_name("type")
                        .map(|ty| self.node_to_ast(ty, source))
                        .transpose()?;
                    parameters.params.push(Parameter {
                        name: self.text(&name_node, source)?.to_string(),
                        default: default.map(Box::new),
                        annotation: annotation.map(Box::new),
                        keyword_only,
                    });
                }
                "typed_parameter" => {
                    let annotation = child
                        .child_by_field_name("type")
                        .map(|ty| self.node_to_ast(ty, source))
                        .transpose()?
                        .map(Box::new);
                    let Some(inner) = child.named_child(0) else { continue };
                    match inner.kind() {
                        "identifier" => parameters.params.push(Parameter {
                            name: self.text(&inner, source)?.to_string(),
                            default: None,
                            annotation,
                            keyword_only,
                        }),
                        "list_splat_pattern" => {
                            if let Some(name) = self.splat_name(&inner, source)? {
                                parameters.vararg = Some(VarParameter { name, annotation });
                            }
                            keyword_only = true;
                        }
                        "dictionary_splat_pattern" => {
                            if let Some(name) = self.splat_name(&inner, source)? {
                                parameters.kwarg = Some(VarParameter { name, annotation });
                            }
                        }
                        _ => {}
                    }
                }
                "list_splat_pattern" => {
                    if let Some(name) = self.splat_name(&child, source)? {
                        parameters.vararg = Some(VarParameter { name, annotation: None });
                    }
                    keyword_only = true;
                }
                "dictionary_splat_pattern" => {
                    if let Some(name) = self.splat_name(&child, source)? {
                        parameters.kwarg = Some(VarParameter { name, annotation: None });
                    }
                }
                "keyword_separator" => keyword_only = true,
                _ => {}
            }
        }

        Ok(parameters)
    }

    fn splat_name(&self, node: &Node, source: &str) -> Result<Option<String>> {
        match node.named_child(0) {
            Some(name) if name.kind() == "identifier" => Ok(Some(self.text(&name, source)?.to_string())),
            _ => Ok(None),
        }
    }

    /// `a = b = value`, `x: T = value` and `x: T`
    fn extract_assignment(&self, node: &Node, source: &str) -> Result<AstNode> {
        let target = self.field_ast(node, "left", source)?;

        if let Some(type_node) = node.child_by_field_name("type") {
            let annotation = self.node_to_ast(type_node, source)?;
            let value = node
                .child_by_field_name("right")
                .map(|v| self.node_to_ast(v, source))
                .transpose()?
                .map(Box::new);
            return Ok(AstNode::AnnotatedAssignment { target: Box::new(target), annotation: Box::new(annotation), value });
        }

        let mut targets = vec![target];
        let mut right = node.child_by_field_name("right");
        while let Some(rhs) = right {
            if rhs.kind() == "assignment" && rhs.child_by_field_name("type").is_none() {
                targets.push(self.field_ast(&rhs, "left", source)?);
                right = rhs.child_by_field_name("right");
            } else {
                break;
            }
        }

        let value = match right {
            Some(rhs) => self.node_to_ast(rhs, source)?,
            None => AstNode::Bad { approximation: Vec::new() },
        };
        Ok(AstNode::Assignment { targets, value: Box::new(value) })
    }

    fn extract_import_alias(&self, node: &Node, source: &str) -> Result<ImportAlias> {
        match node.kind() {
            "aliased_import" => {
                let path = match node.child_by_field_name("name") {
                    Some(name) => self.dotted_path(&name, source)?,
                    None => Vec::new(),
                };
                let alias = node
                    .child_by_field_name("alias")
                    .map(|alias| self.text(&alias, source).map(str::to_string))
                    .transpose()?;
                Ok(ImportAlias { path, alias })
            }
            _ => Ok(ImportAlias { path: self.dotted_path(node, source)?, alias: None }),
        }
    }

    fn dotted_path(&self, node: &Node, source: &str) -> Result<Vec<String>> {
        Ok(self
            .text(node, source)?
            .split('.')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn extract_import_from(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut dots = 0;
        let mut module = Vec::new();

        if let Some(module_node) = node.child_by_field_name("module_name") {
            if module_node.kind() == "relative_import" {
                let mut cursor = module_node.walk();
                for child in module_node.named_children(&mut cursor) {
                    match child.kind() {
                        "import_prefix" => dots = self.text(&child, source)?.chars().filter(|c| *c == '.').count(),
                        "dotted_name" => module = self.dotted_path(&child, source)?,
                        _ => {}
                    }
                }
            } else {
                module = self.dotted_path(&module_node, source)?;
            }
        }

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            names.push(self.extract_import_alias(&child, source)?);
        }

        let wildcard = {
            let mut cursor = node.walk();
            node.named_children(&mut cursor).any(|child| child.kind() == "wildcard_import")
        };

        Ok(AstNode::ImportFrom { dots, module, names, wildcard })
    }

    fn extract_if(&self, node: &Node, source: &str) -> Result<AstNode> {
        let test = self.field_ast(node, "condition", source)?;
        let body = self.field_body(node, "consequence", source)?;
        let mut branches = vec![(test, body)];
        let mut else_body = Vec::new();

        let mut cursor = node.walk();
        for child in node.children_by_field_name("alternative", &mut cursor) {
            match child.kind() {
                "elif_clause" => {
                    let elif_test = self.field_ast(&child, "condition", source)?;
                    let elif_body = self.field_body(&child, "consequence", source)?;
                    branches.push((elif_test, elif_body));
                }
                "else_clause" => else_body = self.field_body(&child, "body", source)?,
                _ => {}
            }
        }

        Ok(AstNode::If { branches, else_body })
    }

    fn extract_alternative(&self, node: &Node, source: &str) -> Result<Vec<AstNode>> {
        match node.child_by_field_name("alternative") {
            Some(alt) if alt.kind() == "else_clause" => self.field_body(&alt, "body", source),
            Some(alt) => self.extract_body(&alt, source),
            None => Ok(Vec::new()),
        }
    }

    fn extract_try(&self, node: &Node, source: &str) -> Result<AstNode> {
        let body = self.field_body(node, "body", source)?;
        let mut handlers = Vec::new();
        let mut else_body = Vec::new();
        let mut finally_body = Vec::new();

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "except_clause" | "except_group_clause" => handlers.push(self.extract_except_handler(&child, source)?),
                "else_clause" => else_body = self.field_body(&child, "body", source)?,
                "finally_clause" => finally_body = self.clause_block(&child, source)?,
                _ => {}
            }
        }

        Ok(AstNode::Try { body, handlers, else_body, finally_body })
    }

    fn clause_block(&self, clause: &Node, source: &str) -> Result<Vec<AstNode>> {
        let mut cursor = clause.walk();
        let block = clause.named_children(&mut cursor).find(|n| n.kind() == "block");
        match block {
            Some(block) => self.extract_body(&block, source),
            None => Ok(Vec::new()),
        }
    }

    /// `except E as e:`; older grammars spell the binding as a second expression
    fn extract_except_handler(&self, node: &Node, source: &str) -> Result<ExceptHandler> {
        let mut exprs = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "block" => {}
                "as_pattern" => {
                    if let Some(ty) = child.named_child(0) {
                        exprs.push(self.node_to_ast(ty, source)?);
                    }
                    if let Some(alias) = child.child_by_field_name("alias") {
                        let target = alias.named_child(0).unwrap_or(alias);
                        exprs.push(self.node_to_ast(target, source)?);
                    }
                }
                _ if child.is_extra() => {}
                _ => exprs.push(self.node_to_ast(child, source)?),
            }
        }

        let mut exprs = exprs.into_iter();
        let exception_type = exprs.next();
        let name = exprs.next();
        let body = self.clause_block(node, source)?;
        Ok(ExceptHandler { exception_type, name, body })
    }

    fn extract_with(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut items = Vec::new();
        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            if clause.kind() != "with_clause" {
                continue;
            }
            let mut clause_cursor = clause.walk();
            for item in clause.named_children(&mut clause_cursor) {
                if item.kind() != "with_item" {
                    continue;
                }
                let Some(value) = item.child_by_field_name("value") else { continue };
                if value.kind() == "as_pattern" {
                    let context_expr = match value.named_child(0) {
                        Some(expr) => self.node_to_ast(expr, source)?,
                        None => AstNode::Bad { approximation: Vec::new() },
                    };
                    let target = value
                        .child_by_field_name("alias")
                        .map(|alias| self.node_to_ast(alias.named_child(0).unwrap_or(alias), source))
                        .transpose()?;
                    items.push(WithItem { context_expr, target });
                } else {
                    items.push(WithItem { context_expr: self.node_to_ast(value, source)?, target: None });
                }
            }
        }

        let body = self.field_body(node, "body", source)?;
        Ok(AstNode::With { items, body })
    }

    fn extract_call_arguments(&self, node: &Node, source: &str) -> Result<InfoCall> {
        match node.child_by_field_name("arguments") {
            Some(arguments) if arguments.kind() == "generator_expression" => Ok(InfoCall {
                args: vec![self.node_to_ast(arguments, source)?],
                keywords: Vec::new(),
                starargs: None,
                kwargs: None,
            }),
            Some(arguments) => self.extract_argument_list(&arguments, source),
            None => Ok(InfoCall { args: Vec::new(), keywords: Vec::new(), starargs: None, kwargs: None }),
        }
    }

    fn extract_argument_list(&self, arguments: &Node, source: &str) -> Result<InfoCall> {
        let mut info = InfoCall { args: Vec::new(), keywords: Vec::new(), starargs: None, kwargs: None };
        let mut cursor = arguments.walk();

        for child in arguments.named_children(&mut cursor) {
            if child.is_extra() {
                continue;
            }
            match child.kind() {
                "keyword_argument" => {
                    let Some(name_node) = child.child_by_field_name("name") else { continue };
                    let name = self.text(&name_node, source)?.to_string();
                    let value = self.field_ast(&child, "value", source)?;
                    info.keywords.push(Keyword { name, value });
                }
                "list_splat" if info.starargs.is_none() => {
                    let value = self.first_named_ast(&child, source)?;
                    info.starargs = value.map(Box::new);
                }
                "dictionary_splat" if info.kwargs.is_none() => {
                    let value = self.first_named_ast(&child, source)?;
                    info.kwargs = value.map(Box::new);
                }
                _ => info.args.push(self.node_to_ast(child, source)?),
            }
        }

        Ok(info)
    }

    fn extract_slice(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut parts: [Option<Box<AstNode>>; 3] = [None, None, None];
        let mut index = 0;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == ":" {
                index = (index + 1).min(2);
            } else if child.is_named() && !child.is_extra() {
                parts[index] = Some(Box::new(self.node_to_ast(child, source)?));
            }
        }
        let [lower, upper, step] = parts;
        Ok(AstNode::Slice { lower, upper, step })
    }

    fn extract_comparison(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut operands = Vec::new();
        let mut ops = Vec::new();
        let mut pending: Option<&str> = None;
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            if child.is_extra() {
                continue;
            }
            if child.is_named() {
                if let Some(op) = pending.take() {
                    ops.push(self.parse_compare_operator(op)?);
                }
                operands.push(self.node_to_ast(child, source)?);
                continue;
            }
            pending = match (pending, child.kind()) {
                (Some("not"), "in") => Some("not in"),
                (Some("is"), "not") => Some("is not"),
                (_, kind) => Some(kind),
            };
        }

        if operands.is_empty() {
            return Ok(AstNode::Bad { approximation: Vec::new() });
        }
        let left = operands.remove(0);
        ops.truncate(operands.len());
        while ops.len() < operands.len() {
            ops.push(CompareOperator::Eq);
        }
        Ok(AstNode::Compare { left: Box::new(left), ops, comparators: operands })
    }

    fn extract_comprehension_clauses(&self, node: &Node, source: &str) -> Result<Vec<Comprehension>> {
        let mut generators: Vec<Comprehension> = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "for_in_clause" => {
                    let target = self.field_ast(&child, "left", source)?;
                    let mut right_cursor = child.walk();
                    let mut iters = Vec::new();
                    for right in child.children_by_field_name("right", &mut right_cursor) {
                        iters.push(self.node_to_ast(right, source)?);
                    }
                    let iter = match iters.len() {
                        0 => AstNode::Bad { approximation: Vec::new() },
                        1 => iters.remove(0),
                        _ => AstNode::Tuple { elements: iters },
                    };
                    generators.push(Comprehension { target, iter, ifs: Vec::new() });
                }
                "if_clause" => {
                    if let (Some(cond), Some(last)) = (child.named_child(0), generators.last_mut()) {
                        last.ifs.push(self.node_to_ast(cond, source)?);
                    }
                }
                _ => {}
            }
        }

        Ok(generators)
    }

    fn extract_dictionary(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut items = Vec::new();
        let mut splats = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "pair" => {
                    let key = self.field_ast(&child, "key", source)?;
                    let value = self.field_ast(&child, "value", source)?;
                    items.push((key, value));
                }
                "dictionary_splat" => {
                    if let Some(value) = self.first_named_ast(&child, source)? {
                        splats.push(value);
                    }
                }
                _ => {}
            }
        }
        Ok(AstNode::Dict { items, splats })
    }

    fn extract_literal_value(&self, node: &Node, source: &str) -> Result<Literal> {
        let text = self.text(node, source)?;

        match node.kind() {
            "integer" => {
                if text.ends_with(['j', 'J']) {
                    return Ok(Literal::Complex);
                }
                Ok(Literal::Integer(parse_integer(text)))
            }
            "float" => {
                if text.ends_with(['j', 'J']) {
                    return Ok(Literal::Complex);
                }
                Ok(Literal::Float)
            }
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            "none" => Ok(Literal::None),
            "ellipsis" => Ok(Literal::Ellipsis),
            other => Err(ParseError::TreeSitterError(format!("Unknown literal type: {other}")).into()),
        }
    }

    fn string_prefix(&self, node: &Node, source: &str) -> Result<String> {
        let mut cursor = node.walk();
        let start = node.children(&mut cursor).find(|child| child.kind() == "string_start");
        let Some(start) = start else { return Ok(String::new()) };
        let text = self.text(&start, source)?;
        let prefix = text.split(['\'', '"']).next().unwrap_or("");
        Ok(prefix.to_ascii_lowercase())
    }

    fn extract_string(&self, node: &Node, source: &str) -> Result<AstNode> {
        let prefix = self.string_prefix(node, source)?;

        if prefix.contains('f') {
            let mut values = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "interpolation" {
                    let expr = match child.child_by_field_name("expression") {
                        Some(expr) => Some(expr),
                        None => child.named_child(0),
                    };
                    if let Some(expr) = expr {
                        values.push(self.node_to_ast(expr, source)?);
                    }
                }
            }
            return Ok(AstNode::FormattedString { values });
        }
        if prefix.contains('b') {
            return Ok(AstNode::Literal { value: Literal::Bytes });
        }

        let raw = prefix.contains('r');
        let mut content = String::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "string_content" | "escape_sequence" => {
                    let text = self.text(&child, source)?;
                    if raw {
                        content.push_str(text);
                    } else {
                        content.push_str(&unescape(text));
                    }
                }
                _ => {}
            }
        }
        Ok(AstNode::Literal { value: Literal::Str(content) })
    }

    /// Adjacent literals: `"a" "b"`. Any f-string part makes the whole an f-string.
    fn extract_concatenated_string(&self, node: &Node, source: &str) -> Result<AstNode> {
        let mut text = String::new();
        let mut values = Vec::new();
        let mut formatted = false;
        let mut bytes = false;

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match self.node_to_ast(child, source)? {
                AstNode::Literal { value: Literal::Str(part) } => text.push_str(&part),
                AstNode::Literal { value: Literal::Bytes } => bytes = true,
                AstNode::FormattedString { values: parts } => {
                    formatted = true;
                    values.extend(parts);
                }
                _ => {}
            }
        }

        if formatted {
            Ok(AstNode::FormattedString { values })
        } else if bytes {
            Ok(AstNode::Literal { value: Literal::Bytes })
        } else {
            Ok(AstNode::Literal { value: Literal::Str(text) })
        }
    }

    fn parse_binary_operator(&self, op: &str) -> Result<BinaryOperator> {
        match op {
            "+" => Ok(BinaryOperator::Add),
            "-" => Ok(BinaryOperator::Sub),
            "*" => Ok(BinaryOperator::Mult),
            "/" => Ok(BinaryOperator::Div),
            "//" => Ok(BinaryOperator::FloorDiv),
            "%" => Ok(BinaryOperator::Mod),
            "**" => Ok(BinaryOperator::Pow),
            "@" => Ok(BinaryOperator::MatMult),
            "&" => Ok(BinaryOperator::BitAnd),
            "|" => Ok(BinaryOperator::BitOr),
            "^" => Ok(BinaryOperator::BitXor),
            "<<" => Ok(BinaryOperator::LeftShift),
            ">>" => Ok(BinaryOperator::RightShift),
            _ => Err(ParseError::TreeSitterError(format!("Unknown binary operator: {op}")).into()),
        }
    }

    fn parse_unary_operator(&self, op: &str) -> Result<UnaryOperator> {
        match op {
            "not" => Ok(UnaryOperator::Not),
            "~" => Ok(UnaryOperator::Invert),
            "+" => Ok(UnaryOperator::Plus),
            "-" => Ok(UnaryOperator::Minus),
            _ => Err(ParseError::TreeSitterError(format!("Unknown unary operator: {op}")).into()),
        }
    }

    fn parse_compare_operator(&self, op: &str) -> Result<CompareOperator> {
        match op {
            "==" => Ok(CompareOperator::Eq),
            "!=" | "<>" => Ok(CompareOperator::NotEq),
            "<" => Ok(CompareOperator::Lt),
            "<=" => Ok(CompareOperator::LtE),
            ">" => Ok(CompareOperator::Gt),
            ">=" => Ok(CompareOperator::GtE),
            "is" => Ok(CompareOperator::Is),
            "is not" => Ok(CompareOperator::IsNot),
            "in" => Ok(CompareOperator::In),
            "not in" => Ok(CompareOperator::NotIn),
            _ => Err(ParseError::TreeSitterError(format!("Unknown comparison operator: {op}")).into()),
        }
    }
}

/// Decimal, hex, octal and binary literals, with `_` separators and a legacy `L` suffix
fn parse_integer(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let cleaned = cleaned.trim_end_matches(['l', 'L']);
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    }
}

/// Resolve the common backslash escapes; unknown escapes are kept verbatim
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<AstNode> {
        let mut parser = PythonParser::new().unwrap();
        match parser.parse_module(source).unwrap() {
            AstNode::Module { body } => body,
            other => panic!("Expected module, got {other:?}"),
        }
    }

    fn single(source: &str) -> AstNode {
        let mut body = parse(source);
        assert_eq!(body.len(), 1, "expected one statement in {source:?}: {body:?}");
        body.remove(0)
    }

    #[test]
    fn test_parser_creation() {
        assert!(PythonParser::new().is_ok());
    }

    #[test]
    fn test_empty_source() {
        assert!(parse("").is_empty());
        assert!(parse("# just a comment\n").is_empty());
    }

    #[test]
    fn test_chained_assignment_collects_targets() {
        match single("a = b = 1") {
            AstNode::Assignment { targets, value } => {
                assert_eq!(targets, vec![AstNode::identifier("a"), AstNode::identifier("b")]);
                assert_eq!(*value, AstNode::Literal { value: Literal::Integer(Some(1)) });
            }
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_destructuring_target() {
        match single("a, b = [1, 2]") {
            AstNode::Assignment { targets, value } => {
                assert!(matches!(&targets[0], AstNode::Tuple { elements } if elements.len() == 2));
                assert!(matches!(*value, AstNode::List { ref elements } if elements.len() == 2));
            }
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_annotated_assignment() {
        match single("x: int = 5") {
            AstNode::AnnotatedAssignment { target, annotation, value } => {
                assert_eq!(*target, AstNode::identifier("x"));
                assert_eq!(*annotation, AstNode::identifier("int"));
                assert!(value.is_some());
            }
            other => panic!("Expected annotated assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_augmented_assignment() {
        match single("total += 1") {
            AstNode::AugAssignment { op, .. } => assert_eq!(op, BinaryOperator::Add),
            other => panic!("Expected augmented assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_function_parameters() {
        let source = "def f(self, a, b=1, *args, c: int, d=2, **kw) -> str:\n    return a\n";
        match single(source) {
            AstNode::FunctionDef { name, params, returns, body, .. } => {
                assert_eq!(name, "f");
                let names: Vec<_> = params.params.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["self", "a", "b", "c", "d"]);
                assert!(params.params[2].default.is_some());
                assert!(!params.params[2].keyword_only);
                assert!(params.params[3].keyword_only);
                assert!(params.params[3].annotation.is_some());
                assert_eq!(params.vararg.as_ref().map(|v| v.name.as_str()), Some("args"));
                assert_eq!(params.kwarg.as_ref().map(|v| v.name.as_str()), Some("kw"));
                assert_eq!(returns.as_deref(), Some(&AstNode::identifier("str")));
                assert!(matches!(body[0], AstNode::Return { value: Some(_) }));
            }
            other => panic!("Expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_keyword_only_marker() {
        match single("def f(a, *, b):\n    pass\n") {
            AstNode::FunctionDef { params, .. } => {
                assert!(params.vararg.is_none());
                assert!(!params.params[0].keyword_only);
                assert!(params.params[1].keyword_only);
            }
            other => panic!("Expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_decorated_definition_keeps_expressions() {
        let source = "class A:\n    @property\n    def x(self):\n        return 1\n    @x.setter\n    def x(self, v):\n        pass\n";
        match single(source) {
            AstNode::ClassDef { body, .. } => {
                match &body[0] {
                    AstNode::FunctionDef { decorators, .. } => assert_eq!(decorators, &vec![AstNode::identifier("property")]),
                    other => panic!("Expected function, got {other:?}"),
                }
                match &body[1] {
                    AstNode::FunctionDef { decorators, .. } => {
                        assert!(matches!(&decorators[0], AstNode::Attribute { attribute, .. } if attribute == "setter"))
                    }
                    other => panic!("Expected function, got {other:?}"),
                }
            }
            other => panic!("Expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_class_bases_and_keywords() {
        match single("class A(B, mod.C, metaclass=Meta):\n    pass\n") {
            AstNode::ClassDef { name, bases, keywords, .. } => {
                assert_eq!(name, "A");
                assert_eq!(bases.len(), 2);
                assert_eq!(keywords[0].name, "metaclass");
            }
            other => panic!("Expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_definition_ids_are_unique() {
        let body = parse("def a():\n    pass\ndef b():\n    pass\n");
        let ids: Vec<_> = body.iter().filter_map(AstNode::node_id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_imports() {
        match single("import os.path as p, sys") {
            AstNode::Import { names } => {
                assert_eq!(names[0].path, vec!["os", "path"]);
                assert_eq!(names[0].alias.as_deref(), Some("p"));
                assert_eq!(names[1].path, vec!["sys"]);
            }
            other => panic!("Expected import, got {other:?}"),
        }
        match single("from ..pkg.mod import a as b, c") {
            AstNode::ImportFrom { dots, module, names, wildcard } => {
                assert_eq!(dots, 2);
                assert_eq!(module, vec!["pkg", "mod"]);
                assert_eq!(names.len(), 2);
                assert_eq!(names[0].alias.as_deref(), Some("b"));
                assert!(!wildcard);
            }
            other => panic!("Expected import from, got {other:?}"),
        }
        match single("from . import *") {
            AstNode::ImportFrom { dots, module, wildcard, .. } => {
                assert_eq!(dots, 1);
                assert!(module.is_empty());
                assert!(wildcard);
            }
            other => panic!("Expected import from, got {other:?}"),
        }
    }

    #[test]
    fn test_call_arguments() {
        match single("f(1, x, key=2, *rest, **opts)") {
            AstNode::Call { args, keywords, starargs, kwargs, .. } => {
                assert_eq!(args.len(), 2);
                assert_eq!(keywords[0].name, "key");
                assert_eq!(starargs.as_deref(), Some(&AstNode::identifier("rest")));
                assert_eq!(kwargs.as_deref(), Some(&AstNode::identifier("opts")));
            }
            other => panic!("Expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_comparison_operators() {
        match single("a not in b") {
            AstNode::Compare { ops, .. } => assert_eq!(ops, vec![CompareOperator::NotIn]),
            other => panic!("Expected comparison, got {other:?}"),
        }
        match single("a is not None") {
            AstNode::Compare { ops, .. } => assert_eq!(ops, vec![CompareOperator::IsNot]),
            other => panic!("Expected comparison, got {other:?}"),
        }
        match single("a < b <= c") {
            AstNode::Compare { ops, comparators, .. } => {
                assert_eq!(ops, vec![CompareOperator::Lt, CompareOperator::LtE]);
                assert_eq!(comparators.len(), 2);
            }
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(single("0x10"), AstNode::Literal { value: Literal::Integer(Some(16)) });
        assert_eq!(single("1_000"), AstNode::Literal { value: Literal::Integer(Some(1000)) });
        assert_eq!(single("99999999999999999999"), AstNode::Literal { value: Literal::Integer(None) });
        assert_eq!(single("1.5"), AstNode::Literal { value: Literal::Float });
        assert_eq!(single("2j"), AstNode::Literal { value: Literal::Complex });
        assert_eq!(single("'a\\tb'"), AstNode::Literal { value: Literal::Str("a\tb".to_string()) });
        assert_eq!(single("'a' 'b'"), AstNode::Literal { value: Literal::Str("ab".to_string()) });
        assert_eq!(single("b'x'"), AstNode::Literal { value: Literal::Bytes });
    }

    #[test]
    fn test_fstring_keeps_interpolations() {
        match single("f'{name}: {value + 1}'") {
            AstNode::FormattedString { values } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0], AstNode::identifier("name"));
            }
            other => panic!("Expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn test_comprehension_clauses() {
        match single("[x * y for x in a if x for y in b]") {
            AstNode::ListComp { generators, .. } => {
                assert_eq!(generators.len(), 2);
                assert_eq!(generators[0].ifs.len(), 1);
                assert!(generators[1].ifs.is_empty());
            }
            other => panic!("Expected list comprehension, got {other:?}"),
        }
        assert!(matches!(single("{k: v for k, v in items}"), AstNode::DictComp { .. }));
        assert!(matches!(single("sum(x for x in xs)"), AstNode::Call { ref args, .. } if matches!(args[0], AstNode::GeneratorExp { .. })));
    }

    #[test]
    fn test_control_flow_statements() {
        let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        match single(source) {
            AstNode::If { branches, else_body } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("Expected if, got {other:?}"),
        }

        let source = "try:\n    pass\nexcept ValueError as e:\n    pass\nfinally:\n    done()\n";
        match single(source) {
            AstNode::Try { handlers, finally_body, .. } => {
                assert_eq!(handlers[0].exception_type, Some(AstNode::identifier("ValueError")));
                assert_eq!(handlers[0].name, Some(AstNode::identifier("e")));
                assert_eq!(finally_body.len(), 1);
            }
            other => panic!("Expected try, got {other:?}"),
        }

        match single("with open(p) as f, lock:\n    pass\n") {
            AstNode::With { items, .. } => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].target, Some(AstNode::identifier("f")));
                assert!(items[1].target.is_none());
            }
            other => panic!("Expected with, got {other:?}"),
        }
    }

    #[test]
    fn test_yield_and_lambda() {
        match single("def g():\n    yield 1\n") {
            AstNode::FunctionDef { body, .. } => {
                assert!(matches!(body[0], AstNode::Yield { value: Some(_), from: false }))
            }
            other => panic!("Expected function, got {other:?}"),
        }
        match single("f = lambda a, b=2: a") {
            AstNode::Assignment { value, .. } => match *value {
                AstNode::Lambda { params, .. } => assert_eq!(params.params.len(), 2),
                other => panic!("Expected lambda, got {other:?}"),
            },
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_error_recovery_produces_bad_nodes() {
        let mut parser = PythonParser::new().unwrap();
        let ast = parser.parse_module("x = (1,\ny = 2\n").unwrap();
        assert!(matches!(ast, AstNode::Module { .. }));
    }

    #[test]
    fn test_debug_tree() {
        let mut parser = PythonParser::new().unwrap();
        let parsed = parser.parse("x = 1").unwrap();
        let tree = parser.debug_tree(&parsed);
        assert!(tree.contains("module"));
        assert!(tree.contains("assignment"));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\nb"), "a\nb");
        assert_eq!(unescape("\\d+"), "\\d+");
    }

    #[test]
    fn test_parse_integer_radix() {
        assert_eq!(parse_integer("0o17"), Some(15));
        assert_eq!(parse_integer("0b101"), Some(5));
        assert_eq!(parse_integer("10L"), Some(10));
    }
}
