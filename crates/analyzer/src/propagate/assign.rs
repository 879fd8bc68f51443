//! Assignment targets

use super::Propagator;
use crate::symbol::SymbolRef;
use crate::value::ops::{is_assignable, set_index};
use crate::value::{Args, Value};
use lantern_core::AnalysisError;
use lantern_parser::AstNode;

impl Propagator<'_> {
    pub(super) fn assignment(&mut self, targets: &[AstNode], value: &AstNode) -> Result<(), AnalysisError> {
        // a literal right-hand side keeps its elements apart for destructuring
        let elements = match value {
            AstNode::Tuple { elements } | AstNode::List { elements } if !elements.iter().any(is_starred) => {
                Some(elements)
            }
            _ => None,
        };
        let (rhs, items) = match elements {
            Some(elements) => {
                let items = self.eval_all(elements)?;
                let whole = match value {
                    AstNode::Tuple { .. } => Value::tuple(items.clone()),
                    _ => Value::list(Value::unite(items.iter().cloned())),
                };
                if let Some(delegate) = self.env.delegate.as_mut() {
                    delegate.resolved(value, &whole);
                }
                (whole, Some(items))
            }
            None => (self.eval(value)?, None),
        };

        for target in targets {
            match (target, &items) {
                (AstNode::Tuple { elements } | AstNode::List { elements }, Some(items))
                    if elements.len() == items.len() && !elements.iter().any(is_starred) =>
                {
                    for (element, item) in elements.iter().zip(items) {
                        self.assign(element, item)?;
                    }
                }
                _ => self.assign(target, &rhs)?,
            }
        }
        self.record_assignment_flow(targets, value);
        Ok(())
    }

    pub(super) fn annotated_assignment(
        &mut self, target: &AstNode, annotation: &AstNode, value: Option<&AstNode>,
    ) -> Result<(), AnalysisError> {
        let ty = self.annotation(annotation)?;
        if let Some(value) = value {
            let value = self.eval(value)?;
            self.assign(target, &value)?;
        }
        let instance = self.instantiate(&ty);
        self.assign(target, &instance)
    }

    pub(super) fn assign(&mut self, target: &AstNode, value: &Value) -> Result<(), AnalysisError> {
        match target {
            AstNode::Identifier { name } => {
                self.assign_name(name, value, false);
            }
            AstNode::Attribute { object, attribute } => {
                let base = self.eval(object)?;
                self.record_attr(object, attribute);
                self.assign_attr(&base, attribute, value)?;
            }
            AstNode::Subscript { value: container, slice } => self.assign_index(container, slice, value)?,
            AstNode::Tuple { elements } | AstNode::List { elements } => self.destructure(elements, value)?,
            AstNode::Starred { value: inner } => self.assign(inner, &Value::list(value.clone()))?,
            other => {
                self.eval(other)?;
            }
        }
        Ok(())
    }

    /// `a, *b, c = value`: element `i` receives the `i`th tuple item, or an element of any
    /// other iterable; a dict yields its keys
    fn destructure(&mut self, elements: &[AstNode], value: &Value) -> Result<(), AnalysisError> {
        let starred = elements.iter().any(is_starred);
        for (i, element) in elements.iter().enumerate() {
            let mut parts = Vec::with_capacity(value.disjuncts().len());
            for disjunct in value.disjuncts() {
                parts.push(match disjunct {
                    Value::Dict(key, _) => (**key).clone(),
                    Value::Tuple(items) if !starred && items.len() == elements.len() => items[i].clone(),
                    Value::Tuple(items) => Value::unite(items.iter().cloned()),
                    other => self.ctx().elem(other)?,
                });
            }
            let part = Value::unite(parts);
            match element {
                AstNode::Starred { value: inner } => self.assign(inner, &Value::list(part))?,
                other => self.assign(other, &part)?,
            }
        }
        Ok(())
    }

    /// `base.name = value`: unite into the member, running the setter of a property reached
    /// through an instance
    fn assign_attr(&mut self, base: &Value, name: &str, value: &Value) -> Result<(), AnalysisError> {
        for disjunct in base.disjuncts() {
            let symbols = self.ctx().attr_symbols(disjunct, name, true)?;
            for symbol in symbols {
                if disjunct.is_instance() {
                    let current = symbol.value();
                    for member in current.disjuncts() {
                        if let Value::Property(property) = member {
                            let setter = property.fset.clone();
                            self.call_accessor(&setter, disjunct, Some(value))?;
                        }
                    }
                }
                symbol.produce(value);
                self.env.tracer.line(format_args!("{} <- {}", symbol.address(), value));
            }
        }
        Ok(())
    }

    /// `container[key] = value`
    ///
    /// Lists and dicts grow to include the new element and are rebound; an unknown container
    /// becomes a fresh list or dict depending on the key. Instances go through `__setitem__`.
    fn assign_index(&mut self, container: &AstNode, slice: &AstNode, value: &Value) -> Result<(), AnalysisError> {
        let base = self.eval(container)?;
        let (key, value) = match slice {
            AstNode::Slice { .. } => {
                self.eval(slice)?;
                (Value::Int(None), self.ctx().elem(value)?)
            }
            other => (self.eval(other)?, value.clone()),
        };

        let updated = if is_assignable(&base) {
            set_index(&base, &key, &value)
        } else if base.is_empty() {
            fresh_container(&key, &value)
        } else {
            for disjunct in base.disjuncts() {
                if matches!(disjunct, Value::Instance(_) | Value::ExternalInstance(_)) {
                    let setter = self.ctx().attr(disjunct, "__setitem__")?;
                    self.do_call(&setter, &Args::positional(vec![key.clone(), value.clone()]))?;
                }
            }
            return Ok(());
        };
        self.rebind(container, &updated)
    }

    /// Produce `value` into whatever symbol the expression `target` reads from
    pub(super) fn rebind(&mut self, target: &AstNode, value: &Value) -> Result<(), AnalysisError> {
        match target {
            AstNode::Identifier { name } => match self.lookup_binding(name) {
                Some(symbol) => {
                    symbol.produce(value);
                    self.env.tracer.line(format_args!("{} <- {}", symbol.address(), value));
                }
                None => {
                    self.assign_name(name, value, false);
                }
            },
            AstNode::Attribute { object, attribute } => {
                let base = match object.as_name() {
                    Some(name) => self.lookup(name).map(|s| s.value()).unwrap_or_else(Value::empty),
                    None => self.eval(object)?,
                };
                let symbols = self.ctx().attr_symbols(&base, attribute, true)?;
                for symbol in symbols {
                    symbol.produce(value);
                    self.env.tracer.line(format_args!("{} <- {}", symbol.address(), value));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Record `a = b` and `a = f(...)` as flows into `a`
    fn record_assignment_flow(&mut self, targets: &[AstNode], value: &AstNode) {
        if self.env.recorder.is_none() {
            return;
        }
        let [target] = targets else { return };
        let Some(dst) = target.as_name().and_then(|n| self.lookup(n)) else { return };
        let sources: Vec<SymbolRef> = match value {
            AstNode::Identifier { name } => self.lookup(name).into_iter().collect(),
            AstNode::Call { function, .. } => self.callee_returns(function),
            _ => Vec::new(),
        };
        if let Some(recorder) = self.env.recorder.as_mut() {
            for src in &sources {
                recorder.record_flow(src, &dst);
            }
        }
    }

    /// Return symbols of the source functions a simple callee expression names
    fn callee_returns(&self, function: &AstNode) -> Vec<SymbolRef> {
        let callee = match function {
            AstNode::Identifier { name } => self.lookup(name).map(|s| s.value()),
            AstNode::Attribute { object, attribute } => object
                .as_name()
                .and_then(|n| self.lookup(n))
                .and_then(|s| self.ctx().attr(&s.value(), attribute).ok()),
            _ => None,
        };
        let Some(callee) = callee else { return Vec::new() };
        callee
            .disjuncts()
            .iter()
            .filter_map(|d| match d {
                Value::Function(function) => Some(function.returns.clone()),
                _ => None,
            })
            .collect()
    }
}

fn is_starred(node: &AstNode) -> bool {
    matches!(node, AstNode::Starred { .. })
}

/// Container created by indexing into an unknown value
fn fresh_container(key: &Value, value: &Value) -> Value {
    if key.is_empty() {
        return Value::unite([Value::list(value.clone()), Value::dict(Value::empty(), value.widen())]);
    }
    Value::unite(key.disjuncts().iter().map(|k| match k {
        Value::Int(_) => Value::list(value.clone()),
        other => Value::dict(other.widen(), value.widen()),
    }))
}
