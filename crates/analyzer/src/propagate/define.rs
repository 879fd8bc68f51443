//! Function, lambda and class definitions
//!
//! A definition node is turned into its [`SourceFunction`] or [`SourceClass`] the first time it
//! is reached and looked up by node id on every later pass, so symbol identity is stable across
//! passes. New functions and lambdas are appended to the work list.

use super::{Outcome, Propagator};
use crate::assembly::WorkItem;
use crate::framework::apply_policies;
use crate::symbol::SymbolTable;
use crate::value::{Args, Builtin, BuiltinType, Receiver, SourceClass, SourceFunction, Value};
use lantern_core::AnalysisError;
use lantern_parser::{AstNode, NodeId, Parameters};
use std::rc::Rc;

/// Builtin methods of a property that return an updated property
const PROPERTY_UPDATERS: &[&str] = &["getter", "setter", "deleter"];

impl Propagator<'_> {
    pub(super) fn function_def(&mut self, node: &AstNode) -> Result<(), AnalysisError> {
        let AstNode::FunctionDef { id, name, params, decorators, returns, .. } = node else { return Ok(()) };
        let function = match self.asm.functions.get(id) {
            Some(function) => function.clone(),
            None => {
                let names: Vec<&str> = decorators.iter().filter_map(decorator_name).collect();
                let receiver = Receiver::classify(self.class.is_some(), !params.params.is_empty(), &names);
                let function = self.define(*id, name, node, params, receiver)?;
                self.asm.functions.insert(*id, function.clone());
                function
            }
        };

        let mut applied = Vec::with_capacity(decorators.len());
        for decorator in decorators {
            applied.push(self.eval(decorator)?);
        }
        if let Some(annotation) = returns {
            let ty = self.annotation(annotation)?;
            function.returns.produce(&self.instantiate(&ty));
        }
        self.bind_parameters(&function, params)?;

        // Only property decorators change what the name is bound to
        let mut bound = Value::Function(function);
        for decorator in applied.iter().rev() {
            if !is_property_decorator(decorator) {
                continue;
            }
            let wrapped = self.do_call(decorator, &Args::positional(vec![bound.clone()]))?;
            if !wrapped.is_empty() {
                bound = wrapped;
            }
        }
        self.assign_name(name, &bound, false);
        Ok(())
    }

    pub(super) fn lambda(&mut self, node: &AstNode) -> Outcome {
        let AstNode::Lambda { id, params, .. } = node else { return Ok(Value::empty()) };
        let lambda = match self.asm.lambdas.get(id) {
            Some(lambda) => lambda.clone(),
            None => {
                let lambda = self.define(*id, "[lambda]", node, params, Receiver::None)?;
                self.asm.lambdas.insert(*id, lambda.clone());
                lambda
            }
        };
        self.bind_parameters(&lambda, params)?;
        Ok(Value::Function(lambda))
    }

    /// Create a function scope under this scope and schedule it
    fn define(
        &mut self, id: NodeId, name: &str, node: &AstNode, params: &Parameters, receiver: Receiver,
    ) -> Result<Rc<SourceFunction>, AnalysisError> {
        let address = self.asm.claim_address(self.scope.address().child(name));
        let function = SourceFunction::new(
            id,
            name,
            Rc::new(node.clone()),
            params,
            address,
            self.inherited.clone(),
            receiver,
            self.class.as_ref(),
            &self.module,
        );
        if let Some(vararg) = &function.vararg {
            vararg.produce(&Value::list(Value::empty()));
        }
        tracing::trace!("Defined {}", function.address());
        self.asm.order.push(WorkItem::Function(function.clone()));
        Ok(function)
    }

    /// Unite defaults and annotated types into the parameters, evaluated in the defining scope
    fn bind_parameters(&mut self, function: &SourceFunction, params: &Parameters) -> Result<(), AnalysisError> {
        for (param, slot) in params.params.iter().zip(&function.params) {
            if let Some(default) = &param.default {
                let value = self.eval(default)?;
                slot.symbol.produce(&value);
            }
            if let Some(annotation) = &param.annotation {
                let ty = self.annotation(annotation)?;
                slot.symbol.produce(&self.instantiate(&ty));
            }
        }
        if let (Some(vararg), Some(symbol)) = (&params.vararg, &function.vararg) {
            if let Some(annotation) = &vararg.annotation {
                let ty = self.annotation(annotation)?;
                symbol.produce(&Value::list(self.instantiate(&ty)));
            }
        }
        if let (Some(kwarg), Some(symbol)) = (&params.kwarg, &function.kwarg) {
            if let Some(annotation) = &kwarg.annotation {
                let ty = self.annotation(annotation)?;
                symbol.produce(&Value::dict(Value::Str(None), self.instantiate(&ty)));
            }
        }
        Ok(())
    }

    /// Type named by an annotation; string annotations are looked up as forward references
    pub(super) fn annotation(&mut self, node: &AstNode) -> Outcome {
        let ty = self.eval(node)?;
        Ok(Value::unite(ty.disjuncts().iter().map(|disjunct| match disjunct.as_str_constant() {
            Some(name) => self.lookup(name).map(|s| s.value()).unwrap_or_else(Value::empty),
            None => disjunct.clone(),
        })))
    }

    pub(super) fn class_def(&mut self, node: &AstNode) -> Result<(), AnalysisError> {
        let AstNode::ClassDef { id, name, bases, keywords, body, decorators, .. } = node else { return Ok(()) };
        let class = match self.asm.classes.get(id) {
            Some(class) => class.clone(),
            None => {
                let address = self.asm.claim_address(self.scope.address().child(name));
                let class = SourceClass::new(*id, name, address, &self.module.name);
                tracing::trace!("Defined class {}", class.address());
                self.asm.classes.insert(*id, class.clone());
                class
            }
        };

        let mut base_values = Vec::with_capacity(bases.len());
        for base in bases {
            let value = self.eval(base)?;
            for disjunct in value.disjuncts() {
                if let Value::Class(parent) = disjunct {
                    if !Rc::ptr_eq(parent, &class) {
                        parent.add_subclass(&class);
                    }
                }
            }
            self.env.tracer.line(format_args!("adding base {} to {}", value, class.address()));
            if !value.is_empty() {
                base_values.push(value);
            }
        }
        for keyword in keywords {
            self.eval(&keyword.value)?;
        }
        for decorator in decorators {
            self.eval(decorator)?;
        }
        *class.bases.borrow_mut() = base_values;

        // The body binds into a fresh table each pass; the policy then merges it into the members.
        // Functions defined in the body chain past it to the enclosing scope.
        let anonymous = SymbolTable::new(class.address().clone(), Some(self.inherited.clone()));
        let inherited = self.inherited.clone();
        self.child(anonymous.clone(), inherited, Some(class.clone())).block(body)?;
        apply_policies(&self.env.ctx(), &self.env.policies, &class, &anonymous)?;
        anonymous.clear_values();

        self.assign_name(name, &Value::Class(class), false);
        Ok(())
    }
}

/// Name a decorator is known by: `staticmethod`, `abc.abstractmethod`, `app.route(...)`
fn decorator_name(decorator: &AstNode) -> Option<&str> {
    match decorator {
        AstNode::Identifier { name } => Some(name),
        AstNode::Attribute { attribute, .. } => Some(attribute),
        AstNode::Call { function, .. } => decorator_name(function),
        _ => None,
    }
}

fn is_property_decorator(decorator: &Value) -> bool {
    decorator.disjuncts().iter().any(|d| match d {
        Value::Builtin(Builtin::Type(BuiltinType::Property)) => true,
        Value::Method(method) => {
            matches!(method.receiver, Value::Property(_)) && PROPERTY_UPDATERS.contains(&&*method.name)
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorator_names() {
        let attr = AstNode::Attribute { object: Box::new(AstNode::identifier("abc")), attribute: "abstractmethod".into() };
        assert_eq!(decorator_name(&attr), Some("abstractmethod"));
        assert_eq!(decorator_name(&AstNode::identifier("staticmethod")), Some("staticmethod"));
        assert_eq!(decorator_name(&AstNode::Pass), None);
    }

    #[test]
    fn test_property_decorators() {
        assert!(is_property_decorator(&Value::builtin_type(BuiltinType::Property)));
        let getter = Value::property(Value::None, Value::empty(), Value::empty());
        assert!(is_property_decorator(&Value::method(getter.clone(), "setter")));
        assert!(!is_property_decorator(&Value::method(getter, "fget")));
        assert!(!is_property_decorator(&Value::builtin_type(BuiltinType::Str)));
    }
}
