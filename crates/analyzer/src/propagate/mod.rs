//! Abstract interpretation of scope bodies
//!
//! A [`Propagator`] walks the body of one scope (a module, a function or lambda, a class body or
//! a comprehension) and unites every value it computes into the symbols of that scope. Control
//! flow is ignored: every branch, loop body and handler is visited once per pass and contributes
//! to the result.

mod assign;
mod call;
mod define;
mod expr;
mod guards;

use crate::assembler::Environment;
use crate::assembly::{Assembly, WorkItem};
use crate::importer::Importer;
use crate::symbol::{SymbolRef, SymbolTable};
use crate::value::{Args, Receiver, SourceClass, SourceFunction, SourceModule, Value, ValueContext};
use lantern_core::AnalysisError;
use lantern_parser::{AstNode, ExceptHandler, ImportAlias, WithItem};
use std::rc::Rc;

type Outcome = Result<Value, AnalysisError>;

/// Propagate one work item of the current pass
pub(crate) fn propagate_item(asm: &mut Assembly, env: &mut Environment, item: &WorkItem) -> Result<(), AnalysisError> {
    match item {
        WorkItem::Module(index) => {
            let Some(bundle) = asm.bundles.get(*index) else { return Ok(()) };
            let ast = bundle.ast.clone();
            let Some(module) = asm.sources.file(&bundle.path).cloned() else { return Ok(()) };
            env.tracer.line(format_args!("### PROPAGATING MODULE {}", module.path.display()));
            tracing::trace!("Propagating module {}", module.name);
            let scope = module.members.clone();
            Propagator::new(asm, env, module, scope, None).block(ast.body())
        }
        WorkItem::Function(function) => {
            let Some(module) = function.module() else { return Ok(()) };
            env.tracer.line(format_args!("### PROPAGATING FUNCTION {}", function.address()));
            let scope = function.locals.clone();
            Propagator::new(asm, env, module, scope, Some(function.clone())).function_body(function)
        }
    }
}

pub(crate) struct Propagator<'p> {
    asm: &'p mut Assembly,
    env: &'p mut Environment,
    module: Rc<SourceModule>,
    /// Table that bindings in this body write to
    scope: Rc<SymbolTable>,
    /// Table that functions defined in this body chain to; differs from `scope` in class bodies
    inherited: Rc<SymbolTable>,
    function: Option<Rc<SourceFunction>>,
    class: Option<Rc<SourceClass>>,
    globals: Vec<String>,
    nonlocals: Vec<String>,
}

impl<'p> Propagator<'p> {
    fn new(
        asm: &'p mut Assembly, env: &'p mut Environment, module: Rc<SourceModule>, scope: Rc<SymbolTable>,
        function: Option<Rc<SourceFunction>>,
    ) -> Self {
        Propagator {
            asm,
            env,
            module,
            inherited: scope.clone(),
            scope,
            function,
            class: None,
            globals: Vec::new(),
            nonlocals: Vec::new(),
        }
    }

    /// Propagator for a nested body sharing this one's assembly and environment
    fn child(
        &mut self, scope: Rc<SymbolTable>, inherited: Rc<SymbolTable>, class: Option<Rc<SourceClass>>,
    ) -> Propagator<'_> {
        Propagator {
            asm: &mut *self.asm,
            env: &mut *self.env,
            module: self.module.clone(),
            scope,
            inherited,
            function: None,
            class,
            globals: Vec::new(),
            nonlocals: Vec::new(),
        }
    }

    fn ctx(&self) -> ValueContext<'_> {
        self.env.ctx()
    }

    fn function_body(&mut self, function: &Rc<SourceFunction>) -> Result<(), AnalysisError> {
        self.bind_receiver(function);
        match function.node.as_ref() {
            AstNode::FunctionDef { body, .. } => {
                declared_names(body, &mut self.globals, &mut self.nonlocals);
                self.block(body)
            }
            AstNode::Lambda { body, .. } => {
                let value = self.eval(body)?;
                self.produce_return(&value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Bind `self` or `cls` to the defining class and every live subclass of it
    fn bind_receiver(&mut self, function: &SourceFunction) {
        let Some(first) = function.params.first() else { return };
        let Some(class) = function.class() else { return };
        let value = match function.receiver {
            Receiver::None => return,
            Receiver::Instance => Value::unite(class.walk_subclasses().into_iter().map(Value::Instance)),
            Receiver::Class => Value::unite(class.walk_subclasses().into_iter().map(Value::Class)),
        };
        first.symbol.put(value);
    }

    fn block(&mut self, body: &[AstNode]) -> Result<(), AnalysisError> {
        for stmt in body {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &AstNode) -> Result<(), AnalysisError> {
        self.env.cancel.check()?;
        match stmt {
            AstNode::FunctionDef { .. } => self.function_def(stmt),
            AstNode::ClassDef { .. } => self.class_def(stmt),
            AstNode::Assignment { targets, value } => self.assignment(targets, value),
            AstNode::AnnotatedAssignment { target, annotation, value } => {
                self.annotated_assignment(target, annotation, value.as_deref())
            }
            AstNode::AugAssignment { target, op, value } => {
                let result = self.binary(target, *op, value)?;
                self.assign(target, &result)
            }
            AstNode::Return { value } => {
                if let Some(value) = value {
                    let value = self.eval(value)?;
                    self.produce_return(&value);
                }
                Ok(())
            }
            AstNode::Import { names } => self.import(names),
            AstNode::ImportFrom { dots, module, names, wildcard } => self.import_from(*dots, module, names, *wildcard),
            AstNode::If { branches, else_body } => {
                for (test, body) in branches {
                    self.eval(test)?;
                    self.block(body)?;
                }
                self.block(else_body)
            }
            AstNode::For { target, iter, body, else_body } => {
                let seq = self.eval(iter)?;
                let elem = self.ctx().elem(&seq)?;
                self.assign(target, &elem)?;
                self.block(body)?;
                self.block(else_body)
            }
            AstNode::While { test, body, else_body } => {
                self.eval(test)?;
                self.block(body)?;
                self.block(else_body)
            }
            AstNode::Try { body, handlers, else_body, finally_body } => {
                self.block(body)?;
                for handler in handlers {
                    self.except_handler(handler)?;
                }
                self.block(else_body)?;
                self.block(finally_body)
            }
            AstNode::With { items, body } => {
                for item in items {
                    self.with_item(item)?;
                }
                self.block(body)
            }
            AstNode::Assert { test, msg } => {
                self.eval(test)?;
                if let Some(msg) = msg {
                    self.eval(msg)?;
                }
                self.narrow_assertion(test)
            }
            AstNode::Raise { exc, cause } => {
                for expr in exc.iter().chain(cause.iter()) {
                    self.eval(expr)?;
                }
                Ok(())
            }
            AstNode::Delete { targets } => {
                for target in targets {
                    self.eval(target)?;
                }
                Ok(())
            }
            AstNode::Bad { approximation } => self.block(approximation),
            AstNode::Module { body } => self.block(body),
            AstNode::Global { .. } | AstNode::Nonlocal { .. } | AstNode::Pass | AstNode::Break | AstNode::Continue => {
                Ok(())
            }
            expr => self.eval(expr).map(|_| ()),
        }
    }

    fn except_handler(&mut self, handler: &ExceptHandler) -> Result<(), AnalysisError> {
        let ty = match &handler.exception_type {
            Some(expr) => self.eval(expr)?,
            None => Value::empty(),
        };
        if let Some(target) = &handler.name {
            let instance = self.instantiate(&ty);
            self.assign(target, &instance)?;
        }
        self.block(&handler.body)
    }

    fn with_item(&mut self, item: &WithItem) -> Result<(), AnalysisError> {
        let manager = self.eval(&item.context_expr)?;
        let Some(target) = &item.target else { return Ok(()) };
        let enter = self.ctx().attr(&manager, "__enter__")?;
        let entered = self.do_call(&enter, &Args::default())?;
        let value = if entered.is_empty() { manager } else { entered };
        self.assign(target, &value)
    }

    fn import(&mut self, names: &[ImportAlias]) -> Result<(), AnalysisError> {
        let private = self.env.options.private_imports;
        for alias in names {
            let Some(root) = alias.path.first() else { continue };
            let value = {
                let importer = Importer::new(&self.module.path, &self.asm.sources, &self.asm.python_paths);
                let ctx = self.env.ctx();
                match alias.alias {
                    Some(_) => importer.import_abs(&ctx, &alias.path)?,
                    None => importer.import_root(&ctx, root),
                }
            };
            let name = alias.alias.as_deref().unwrap_or(root);
            self.assign_name(name, &value, private);
        }
        Ok(())
    }

    fn import_from(
        &mut self, dots: usize, module: &[String], names: &[ImportAlias], wildcard: bool,
    ) -> Result<(), AnalysisError> {
        let source = {
            let importer = Importer::new(&self.module.path, &self.asm.sources, &self.asm.python_paths);
            importer.resolve(&self.env.ctx(), dots, module)?
        };
        if source.is_empty() {
            for alias in names {
                if let Some(name) = alias.alias.as_deref().or(alias.path.last().map(String::as_str)) {
                    self.binding(name);
                }
            }
            return Ok(());
        }

        if wildcard {
            let exported = self.ctx().dir(&source)?;
            for name in exported {
                if name.starts_with('_') {
                    continue;
                }
                let symbols = self.ctx().attr_symbols(&source, &name, false)?;
                if !symbols.is_empty() && symbols.iter().all(|s| s.is_private()) {
                    continue;
                }
                let value = self.ctx().attr(&source, &name)?;
                if !value.is_empty() {
                    self.assign_name(&name, &value, false);
                }
            }
        }

        let private = self.env.options.private_imports;
        for alias in names {
            let Some(name) = alias.path.last() else { continue };
            let value = self.ctx().attr(&source, name)?;
            match &alias.alias {
                Some(local) => self.assign_name(local, &value, false),
                None => self.assign_name(name, &value, private),
            };
        }
        Ok(())
    }

    /// Unite `value` into the binding of `name` in this scope
    fn assign_name(&mut self, name: &str, value: &Value, private: bool) -> SymbolRef {
        let symbol = if self.is_declared(name) { self.binding(name) } else { self.scope.create_private(name, private) };
        symbol.produce_private(value, private);
        self.env.tracer.line(format_args!("{} <- {}", symbol.address(), value));
        symbol
    }

    fn is_declared(&self, name: &str) -> bool {
        self.globals.iter().chain(&self.nonlocals).any(|n| n == name)
    }

    /// Symbol a binding of `name` writes to, honoring `global` and `nonlocal` declarations
    fn binding(&self, name: &str) -> SymbolRef {
        if self.globals.iter().any(|g| g == name) {
            return self.module.members.create(name);
        }
        if self.nonlocals.iter().any(|n| n == name) {
            let enclosing = self.scope.parent().and_then(|p| p.lookup(name));
            if let Some(symbol) = enclosing.filter(|s| !self.is_builtin(s)) {
                return symbol;
            }
        }
        self.scope.create(name)
    }

    fn lookup(&self, name: &str) -> Option<SymbolRef> {
        if self.globals.iter().any(|g| g == name) {
            return self.module.members.lookup(name);
        }
        self.scope.lookup(name)
    }

    /// Like [`Propagator::lookup`], but never returns a member of the builtin scope
    fn lookup_binding(&self, name: &str) -> Option<SymbolRef> {
        self.lookup(name).filter(|s| !self.is_builtin(s))
    }

    fn is_builtin(&self, symbol: &SymbolRef) -> bool {
        self.env.builtins.get(symbol.name()).is_some_and(|b| Rc::ptr_eq(&b, symbol))
    }

    fn produce_return(&mut self, value: &Value) {
        if let Some(function) = &self.function {
            function.returns.produce(value);
            self.env.tracer.line(format_args!("{} <- {}", function.returns.address(), value));
        }
    }
}

/// Names declared `global` or `nonlocal` anywhere in a function body, outside nested definitions
fn declared_names(body: &[AstNode], globals: &mut Vec<String>, nonlocals: &mut Vec<String>) {
    for stmt in body {
        match stmt {
            AstNode::Global { names } => globals.extend(names.iter().cloned()),
            AstNode::Nonlocal { names } => nonlocals.extend(names.iter().cloned()),
            AstNode::If { branches, else_body } => {
                for (_, branch) in branches {
                    declared_names(branch, globals, nonlocals);
                }
                declared_names(else_body, globals, nonlocals);
            }
            AstNode::For { body, else_body, .. } | AstNode::While { body, else_body, .. } => {
                declared_names(body, globals, nonlocals);
                declared_names(else_body, globals, nonlocals);
            }
            AstNode::Try { body, handlers, else_body, finally_body } => {
                declared_names(body, globals, nonlocals);
                for handler in handlers {
                    declared_names(&handler.body, globals, nonlocals);
                }
                declared_names(else_body, globals, nonlocals);
                declared_names(finally_body, globals, nonlocals);
            }
            AstNode::With { body, .. } => declared_names(body, globals, nonlocals),
            _ => {}
        }
    }
}
