//! Narrowing from `assert isinstance(...)` and `assert issubclass(...)`

use super::Propagator;
use crate::value::{Builtin, BuiltinFunction, Value};
use lantern_core::AnalysisError;
use lantern_parser::AstNode;

impl Propagator<'_> {
    /// Replace the value of the asserted name with the asserted type
    ///
    /// `isinstance(x, T)` narrows `x` to instances of `T` (each member of a tuple of types);
    /// `issubclass(x, C)` narrows `x` to `C` and its live subclasses.
    pub(super) fn narrow_assertion(&mut self, test: &AstNode) -> Result<(), AnalysisError> {
        let AstNode::Call { function, args, .. } = test else { return Ok(()) };
        let [subject, types, ..] = args.as_slice() else { return Ok(()) };
        let callee = self.eval(function)?;
        let guard = callee.disjuncts().iter().find_map(|d| match d {
            Value::Builtin(Builtin::Function(f @ (BuiltinFunction::Isinstance | BuiltinFunction::Issubclass))) => Some(*f),
            _ => None,
        });
        let Some(guard) = guard else { return Ok(()) };

        let types = self.eval(types)?;
        let narrowed = match guard {
            BuiltinFunction::Isinstance => self.instantiate(&types),
            _ => subclasses(&types),
        };
        if narrowed.is_empty() {
            return Ok(());
        }

        match subject {
            AstNode::Identifier { name } => {
                let symbol = if self.is_declared(name) { self.binding(name) } else { self.scope.create(name) };
                self.env.tracer.line(format_args!("{} narrowed to {}", symbol.address(), narrowed));
                symbol.put(narrowed);
                Ok(())
            }
            other => self.assign(other, &narrowed),
        }
    }
}

/// Every class in `types` with its live subclasses; non-source types are kept as given
fn subclasses(types: &Value) -> Value {
    Value::unite(types.disjuncts().iter().map(|disjunct| match disjunct {
        Value::Class(class) => Value::unite(class.walk_subclasses().into_iter().map(Value::Class)),
        Value::Tuple(items) => Value::unite(items.iter().map(subclasses)),
        other => other.clone(),
    }))
}
