//! Call sites
//!
//! Calling a source function binds the arguments onto its parameters and yields whatever its
//! return symbol holds so far; the body itself is propagated separately as its own work item.

use super::{Outcome, Propagator};
use crate::symbol::SymbolRef;
use crate::value::{Args, Builtin, BuiltinFunction, BuiltinType, Receiver, SourceFunction, Value};
use lantern_core::AnalysisError;
use lantern_parser::{AstNode, Keyword};
use std::rc::Rc;

impl Propagator<'_> {
    pub(super) fn call_expr(
        &mut self, function: &AstNode, args: &[AstNode], keywords: &[Keyword], starargs: Option<&AstNode>,
        kwargs: Option<&AstNode>,
    ) -> Outcome {
        let callee = self.eval(function)?;

        let mut call_args = Args::default();
        let mut arg_symbols = Vec::with_capacity(args.len());
        let mut spread = Vec::new();
        for arg in args {
            match arg {
                AstNode::Starred { value } => spread.push(self.eval(value)?),
                other => {
                    call_args.positional.push(self.eval(other)?);
                    arg_symbols.push(other.as_name().and_then(|n| self.lookup(n)));
                }
            }
        }
        if let Some(starargs) = starargs {
            spread.push(self.eval(starargs)?);
        }
        if !spread.is_empty() {
            call_args.vararg = Some(Value::unite(spread));
        }
        for keyword in keywords {
            let value = self.eval(&keyword.value)?;
            if keyword.name.is_empty() {
                call_args.kwarg = Some(value);
            } else {
                call_args.keywords.push((keyword.name.clone(), value));
            }
        }
        if let Some(kwargs) = kwargs {
            let value = self.eval(kwargs)?;
            let merged = Value::unite([call_args.kwarg.take().unwrap_or_else(Value::empty), value]);
            call_args.kwarg = Some(merged);
        }

        let mut results = Vec::new();
        for disjunct in callee.disjuncts() {
            let result = match disjunct {
                Value::Builtin(Builtin::Function(BuiltinFunction::Eval)) => self.eval_string(&call_args)?,
                Value::Builtin(Builtin::Type(BuiltinType::Super)) => self.super_value(),
                other => self.do_call(other, &call_args)?,
            };
            results.push(result);
        }

        self.record_argument_flow(&callee, &arg_symbols);
        self.rebind_mutation(function, &callee, &call_args)?;
        Ok(Value::unite(results))
    }

    /// Bind `args` onto every source function `callee` reaches, then call it
    pub(super) fn do_call(&mut self, callee: &Value, args: &Args) -> Outcome {
        let targets = self.call_targets(callee)?;
        for function in targets {
            self.bind_arguments(&function, args)?;
        }
        self.ctx().call(callee, args)
    }

    /// Source functions run by calling `callee`: functions, `__init__` of classes and
    /// `__call__` of instances
    fn call_targets(&self, callee: &Value) -> Result<Vec<Rc<SourceFunction>>, AnalysisError> {
        let mut targets = Vec::new();
        for disjunct in callee.disjuncts() {
            let dunder = match disjunct {
                Value::Function(function) => {
                    targets.push(function.clone());
                    continue;
                }
                Value::Class(_) => "__init__",
                Value::Instance(_) => "__call__",
                _ => continue,
            };
            for symbol in self.ctx().attr_symbols(disjunct, dunder, false)? {
                for value in symbol.value().disjuncts() {
                    if let Value::Function(function) = value {
                        targets.push(function.clone());
                    }
                }
            }
        }
        Ok(targets)
    }

    fn bind_arguments(&mut self, function: &SourceFunction, args: &Args) -> Result<(), AnalysisError> {
        self.env.tracer.line(format_args!("binding arguments of {}", function.address()));
        let offset = usize::from(function.receiver != Receiver::None);
        let positional: Vec<&SymbolRef> =
            function.params.iter().skip(offset).filter(|p| !p.keyword_only).map(|p| &p.symbol).collect();

        for (symbol, value) in positional.iter().zip(&args.positional) {
            symbol.produce(value);
        }
        if args.positional.len() > positional.len() {
            if let Some(vararg) = &function.vararg {
                let overflow = Value::unite(args.positional[positional.len()..].iter().cloned());
                vararg.produce(&Value::list(overflow));
            }
        }
        if let Some(spread) = &args.vararg {
            let elem = self.ctx().elem(spread)?;
            for symbol in positional.iter().skip(args.positional.len()) {
                symbol.produce(&elem);
            }
            if let Some(vararg) = &function.vararg {
                vararg.produce(&Value::list(elem));
            }
        }

        for (name, value) in &args.keywords {
            bind_keyword(function, name, value);
        }
        // a plain dict spread names no keys, so only kwargs dicts can bind
        if let Some(kwarg) = &args.kwarg {
            for disjunct in kwarg.disjuncts() {
                if let Value::KwargDict(dict) = disjunct {
                    for (name, value) in dict.entries() {
                        bind_keyword(function, &name, &value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Record flows from bare-name arguments into the parameters they bind
    fn record_argument_flow(&mut self, callee: &Value, arg_symbols: &[Option<SymbolRef>]) {
        if self.env.recorder.is_none() || arg_symbols.iter().all(Option::is_none) {
            return;
        }
        let Ok(targets) = self.call_targets(callee) else { return };
        let Some(recorder) = self.env.recorder.as_mut() else { return };
        for function in targets {
            let offset = usize::from(function.receiver != Receiver::None);
            for (param, symbol) in function.params.iter().skip(offset).zip(arg_symbols) {
                if let Some(symbol) = symbol {
                    recorder.record_flow(symbol, &param.symbol);
                }
            }
        }
    }

    /// Grow the container behind `x.append(v)` and friends
    ///
    /// Only a bare name or `name.attr` receiver is rebound; the container value itself is
    /// immutable, so the grown value is produced into the symbol holding it.
    fn rebind_mutation(&mut self, function: &AstNode, callee: &Value, args: &Args) -> Result<(), AnalysisError> {
        let AstNode::Attribute { object, .. } = function else { return Ok(()) };
        let rebindable = match object.as_ref() {
            AstNode::Identifier { .. } => true,
            AstNode::Attribute { object: inner, .. } => inner.as_name().is_some(),
            _ => false,
        };
        if !rebindable {
            return Ok(());
        }

        let mut grown = Vec::new();
        for disjunct in callee.disjuncts() {
            let Value::Method(method) = disjunct else { continue };
            let added = match (&method.receiver, &*method.name) {
                (Value::List(_), "append") => Value::list(args.get(0)),
                (Value::List(_), "insert") => Value::list(args.get(1)),
                (Value::List(_), "extend") => Value::list(self.ctx().elem(&args.get(0))?),
                (Value::Set(_), "add") => Value::set(args.get(0).widen()),
                (Value::Set(_), "update") => Value::set(self.ctx().elem(&args.get(0))?.widen()),
                (Value::Dict(..), "update") => args.get(0),
                _ => continue,
            };
            grown.push(added);
        }
        let grown = Value::unite(grown);
        if grown.is_empty() {
            return Ok(());
        }
        self.rebind(object, &grown)
    }

    /// `super()` inside a method: the bases of the method's class
    fn super_value(&self) -> Value {
        let Some(class) = self.function.as_ref().and_then(|f| f.class()) else { return Value::empty() };
        let bases: Vec<Value> = class.bases.borrow().iter().flat_map(|b| b.disjuncts().to_vec()).collect();
        Value::Super(Rc::from(bases))
    }

    /// `eval(source)` with a constant string: the source is parsed and propagated in this scope
    fn eval_string(&mut self, args: &Args) -> Outcome {
        let source = args.get(0);
        let mut results = Vec::new();
        for disjunct in source.disjuncts() {
            let Some(text) = disjunct.as_str_constant() else { continue };
            if text.len() > self.env.options.max_eval_len {
                tracing::debug!("Skipping eval of a {} byte string", text.len());
                continue;
            }
            let Some(ast) = self.env.parse_eval(text) else { continue };
            match ast.body() {
                [single] if !single.is_statement() => results.push(self.eval(single)?),
                body => self.block(body)?,
            }
        }
        Ok(Value::unite(results))
    }

    /// Run `accessor` as a property getter (no `value`) or setter on `instance`
    pub(super) fn call_accessor(&mut self, accessor: &Value, instance: &Value, value: Option<&Value>) -> Outcome {
        let mut results = Vec::new();
        for disjunct in accessor.disjuncts() {
            let mut positional = Vec::with_capacity(2);
            // methods get the instance through their receiver binding
            if let Value::Function(function) = disjunct {
                if function.receiver == Receiver::None {
                    positional.push(instance.clone());
                }
            }
            positional.extend(value.cloned());
            results.push(self.do_call(disjunct, &Args::positional(positional))?);
        }
        Ok(Value::unite(results))
    }
}

fn bind_keyword(function: &SourceFunction, name: &str, value: &Value) {
    match function.param(name) {
        Some(symbol) => symbol.produce(value),
        None => {
            if let Some(dict) = &function.kwarg_dict {
                dict.add(name, value);
            }
        }
    }
}
