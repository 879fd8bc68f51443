//! Expression evaluation

use super::{Outcome, Propagator};
use crate::graph::NodeKind;
use crate::symbol::SymbolTable;
use crate::value::{Builtin, Value};
use lantern_core::AnalysisError;
use lantern_parser::{AstNode, BinaryOperator, CompareOperator, Comprehension, Literal, NodeId, UnaryOperator};

impl Propagator<'_> {
    pub(super) fn eval(&mut self, expr: &AstNode) -> Outcome {
        self.env.cancel.check()?;
        let value = self.eval_inner(expr)?;
        self.env.tracer.line(format_args!("evaluated {} -> {}", expr, value));
        if let Some(delegate) = self.env.delegate.as_mut() {
            delegate.resolved(expr, &value);
        }
        Ok(value)
    }

    fn eval_inner(&mut self, expr: &AstNode) -> Outcome {
        match expr {
            AstNode::Identifier { name } => Ok(self.lookup(name).map(|s| s.value()).unwrap_or_else(Value::empty)),
            AstNode::Literal { value } => Ok(literal(value)),
            AstNode::FormattedString { values } => {
                for value in values {
                    self.eval(value)?;
                }
                Ok(Value::Str(None))
            }
            AstNode::Attribute { object, attribute } => self.attribute(object, attribute),
            AstNode::Call { function, args, keywords, starargs, kwargs } => {
                self.call_expr(function, args, keywords, starargs.as_deref(), kwargs.as_deref())
            }
            AstNode::Subscript { value, slice } => {
                let base = self.eval(value)?;
                if let AstNode::Slice { .. } = slice.as_ref() {
                    self.eval(slice)?;
                    return self.ctx().slice(&base);
                }
                let key = self.eval(slice)?;
                self.ctx().index(&base, &key)
            }
            AstNode::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.eval(part)?;
                }
                Ok(Value::Object)
            }
            AstNode::BinaryOp { left, op, right } => self.binary(left, *op, right),
            AstNode::UnaryOp { op, operand } => self.unary(*op, operand),
            AstNode::Compare { left, ops, comparators } => self.compare(left, ops, comparators),
            AstNode::IfExp { test, body, orelse } => {
                self.eval(test)?;
                let body = self.eval(body)?;
                let orelse = self.eval(orelse)?;
                Ok(Value::unite([body, orelse]))
            }
            AstNode::Lambda { .. } => self.lambda(expr),
            AstNode::ListComp { id, element, generators } => {
                let (_, elem) = self.comprehension(*id, generators, None, element)?;
                Ok(Value::list(elem))
            }
            AstNode::SetComp { id, element, generators } => {
                let (_, elem) = self.comprehension(*id, generators, None, element)?;
                Ok(Value::set(elem.widen()))
            }
            AstNode::GeneratorExp { id, element, generators } => {
                let (_, elem) = self.comprehension(*id, generators, None, element)?;
                Ok(Value::generator(elem))
            }
            AstNode::DictComp { id, key, value, generators } => {
                let (key, value) = self.comprehension(*id, generators, Some(key), value)?;
                Ok(Value::dict(key.widen(), value.widen()))
            }
            AstNode::Tuple { elements } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval(element)?);
                }
                Ok(Value::tuple(items))
            }
            AstNode::List { elements } => {
                let items = self.eval_all(elements)?;
                Ok(Value::list(Value::unite(items)))
            }
            AstNode::Set { elements } => {
                let items = self.eval_all(elements)?;
                Ok(Value::set(Value::unite(items.iter().map(Value::widen))))
            }
            AstNode::Dict { items, splats } => self.dict(items, splats),
            AstNode::Starred { value } => {
                let seq = self.eval(value)?;
                self.ctx().elem(&seq)
            }
            AstNode::NamedExpr { target, value } => {
                let value = self.eval(value)?;
                self.assign_name(target, &value, false);
                Ok(value)
            }
            AstNode::Await { value } => self.eval(value),
            AstNode::Yield { value, from } => {
                let yielded = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::None,
                };
                let yielded = if *from { self.ctx().elem(&yielded)? } else { yielded };
                self.produce_return(&Value::generator(yielded));
                Ok(Value::empty())
            }
            AstNode::Bad { approximation } => {
                for node in approximation {
                    self.eval(node)?;
                }
                Ok(Value::empty())
            }
            _ => Ok(Value::empty()),
        }
    }

    pub(super) fn eval_all(&mut self, exprs: &[AstNode]) -> Result<Vec<Value>, AnalysisError> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr)?);
        }
        Ok(values)
    }

    /// Read `object.name`, running property getters reached through instances
    fn attribute(&mut self, object: &AstNode, name: &str) -> Outcome {
        let base = self.eval(object)?;
        self.record_attr(object, name);
        let mut found = Vec::new();
        for disjunct in base.disjuncts() {
            let member = self.ctx().attr(disjunct, name)?;
            for candidate in member.disjuncts() {
                match candidate {
                    Value::Property(property) if disjunct.is_instance() => {
                        let getter = property.fget.clone();
                        found.push(self.call_accessor(&getter, disjunct, None)?);
                    }
                    other => found.push(other.clone()),
                }
            }
        }
        Ok(Value::unite(found))
    }

    /// Note that `name` is accessed on the symbol bound to a bare-name `object`
    pub(super) fn record_attr(&mut self, object: &AstNode, name: &str) {
        if self.env.recorder.is_none() {
            return;
        }
        let Some(symbol) = object.as_name().and_then(|n| self.lookup(n)) else { return };
        if let Some(recorder) = self.env.recorder.as_mut() {
            recorder.record_attr(&symbol, name);
        }
    }

    pub(super) fn binary(&mut self, left: &AstNode, op: BinaryOperator, right: &AstNode) -> Outcome {
        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;
        match op {
            BinaryOperator::Div => return Ok(Value::Float),
            BinaryOperator::Add => {
                if let (Some(a), Some(b)) = (lhs.as_str_constant(), rhs.as_str_constant()) {
                    return Ok(Value::str(&format!("{a}{b}")));
                }
            }
            BinaryOperator::Mod => {
                if lhs.disjuncts().iter().any(|d| matches!(d, Value::Str(_))) {
                    return Ok(Value::Str(None));
                }
            }
            BinaryOperator::Mult => {
                // sequence repetition keeps the sequence
                let sequences: Vec<Value> = lhs
                    .disjuncts()
                    .iter()
                    .chain(rhs.disjuncts())
                    .filter(|d| matches!(d, Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Bytes))
                    .map(Value::widen)
                    .collect();
                if !sequences.is_empty() {
                    return Ok(Value::unite(sequences));
                }
            }
            BinaryOperator::And | BinaryOperator::Or => {
                let either = Value::unite([lhs, rhs]);
                return Ok(if either.is_empty() { Value::Bool(None) } else { either });
            }
            _ => {}
        }

        let widened = Value::unite([lhs.widen(), rhs.widen()]);
        if !widened.is_empty() {
            return Ok(widened);
        }
        Ok(match op {
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mult
            | BinaryOperator::FloorDiv
            | BinaryOperator::Pow
            | BinaryOperator::Mod => Value::unite([Value::Int(None), Value::Float]),
            BinaryOperator::BitAnd
            | BinaryOperator::BitOr
            | BinaryOperator::BitXor
            | BinaryOperator::LeftShift
            | BinaryOperator::RightShift => Value::Int(None),
            _ => Value::empty(),
        })
    }

    fn unary(&mut self, op: UnaryOperator, operand: &AstNode) -> Outcome {
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOperator::Not => match value {
                Value::Bool(Some(b)) => Value::bool(!b),
                _ => Value::Bool(None),
            },
            _ if !value.is_empty() => value.widen(),
            UnaryOperator::Invert => Value::unite([Value::Int(None), Value::Bool(None)]),
            UnaryOperator::Plus | UnaryOperator::Minus => Value::unite([Value::Int(None), Value::Float]),
        })
    }

    fn compare(&mut self, left: &AstNode, ops: &[CompareOperator], comparators: &[AstNode]) -> Outcome {
        self.eval(left)?;
        self.eval_all(comparators)?;
        if self.env.recorder.is_some() && ops.first() == Some(&CompareOperator::Eq) {
            let lhs = left.as_name().and_then(|n| self.lookup(n));
            let rhs = comparators.first().and_then(AstNode::as_name).and_then(|n| self.lookup(n));
            if let (Some(lhs), Some(rhs), Some(recorder)) = (lhs, rhs, self.env.recorder.as_mut()) {
                recorder.record_flow(&lhs, &rhs);
                recorder.record_flow(&rhs, &lhs);
            }
        }
        Ok(Value::Bool(None))
    }

    fn dict(&mut self, items: &[(AstNode, AstNode)], splats: &[AstNode]) -> Outcome {
        let mut keys = Vec::with_capacity(items.len());
        let mut values = Vec::with_capacity(items.len());
        for (key, value) in items {
            keys.push(self.eval(key)?.widen());
            values.push(self.eval(value)?.widen());
        }
        for splat in splats {
            let spread = self.eval(splat)?;
            for disjunct in spread.disjuncts() {
                match disjunct {
                    Value::Dict(k, v) => {
                        keys.push((**k).clone());
                        values.push((**v).clone());
                    }
                    Value::KwargDict(kwargs) => {
                        keys.push(Value::Str(None));
                        values.push(kwargs.values().widen());
                    }
                    _ => {}
                }
            }
        }
        Ok(Value::dict(Value::unite(keys), Value::unite(values)))
    }

    /// Propagate a comprehension in its own scope, returning the key and element values
    ///
    /// The first iterable is evaluated in the enclosing scope; targets, conditions, later
    /// iterables and the element live in the comprehension scope.
    fn comprehension(
        &mut self, id: NodeId, generators: &[Comprehension], key: Option<&AstNode>, element: &AstNode,
    ) -> Result<(Value, Value), AnalysisError> {
        let table = match self.asm.comprehensions.get(&id) {
            Some(table) => table.clone(),
            None => {
                let address = self.asm.claim_address(self.scope.address().child("[comprehension]"));
                let table = SymbolTable::new(address, Some(self.inherited.clone()));
                self.asm.comprehensions.insert(id, table.clone());
                table
            }
        };
        let first = match generators.first() {
            Some(generator) => self.eval(&generator.iter)?,
            None => Value::empty(),
        };

        let mut inner = self.child(table.clone(), table, None);
        for (i, generator) in generators.iter().enumerate() {
            let seq = if i == 0 { first.clone() } else { inner.eval(&generator.iter)? };
            let elem = inner.ctx().elem(&seq)?.widen();
            inner.assign(&generator.target, &elem)?;
            for condition in &generator.ifs {
                inner.eval(condition)?;
            }
        }
        let key = match key {
            Some(key) => inner.eval(key)?,
            None => Value::empty(),
        };
        let element = inner.eval(element)?;
        Ok((key, element))
    }

    /// Value of `ty()` for each type disjunct of `ty`, as used by annotations and `except`
    pub(super) fn instantiate(&self, ty: &Value) -> Value {
        let ctx = self.ctx();
        Value::unite(ty.disjuncts().iter().map(|disjunct| match disjunct {
            Value::Class(class) => Value::Instance(class.clone()),
            Value::Builtin(Builtin::Type(builtin)) => builtin.instance(),
            Value::External(r) if ctx.graph.kind(r.path()) == Some(NodeKind::Type) => ctx.external_instance(r.path()),
            Value::Tuple(items) => Value::unite(items.iter().map(|item| self.instantiate(item))),
            Value::None => Value::None,
            _ => Value::empty(),
        }))
    }
}

fn literal(value: &Literal) -> Value {
    match value {
        Literal::Integer(Some(n)) => Value::int(*n),
        Literal::Integer(None) => Value::Int(None),
        Literal::Float => Value::Float,
        Literal::Complex => Value::Complex,
        Literal::Str(s) => Value::str(s),
        Literal::Bytes => Value::Bytes,
        Literal::Bool(b) => Value::bool(*b),
        Literal::None => Value::None,
        Literal::Ellipsis => Value::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Literal::Integer(Some(1))).to_string(), "int(1)");
        assert_eq!(literal(&Literal::Integer(Some(5000))).to_string(), "int");
        assert_eq!(literal(&Literal::Str("foo".into())).to_string(), "str('foo')");
        assert_eq!(literal(&Literal::Bool(true)).to_string(), "bool(True)");
        assert_eq!(literal(&Literal::None).to_string(), "None");
    }
}
