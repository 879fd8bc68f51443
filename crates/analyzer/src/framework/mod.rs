//! Class-construction policies
//!
//! After a class body has been propagated into its anonymous scope, a policy decides how that
//! scope becomes the class's member table. The default policy copies every binding across;
//! framework policies additionally synthesize the members a metaclass would create at runtime.

pub mod orm;

pub use orm::OrmModelPolicy;

use crate::symbol::SymbolTable;
use crate::value::{SourceClass, Value, ValueContext};
use lantern_core::AnalysisError;
use std::rc::Rc;

pub trait ClassPolicy {
    /// Short name recorded on classes this policy built
    fn name(&self) -> &'static str;

    /// Whether the policy handles a class with these base values
    fn claims(&self, ctx: &ValueContext<'_>, bases: &[Value]) -> bool;

    /// Populate `class.members` from the propagated class body
    fn apply(&self, ctx: &ValueContext<'_>, class: &Rc<SourceClass>, anonymous: &SymbolTable)
    -> Result<(), AnalysisError>;
}

/// Plain Python semantics: class members are exactly the class-body bindings
#[derive(Debug, Default)]
pub struct DefaultPolicy;

impl ClassPolicy for DefaultPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn claims(&self, _ctx: &ValueContext<'_>, _bases: &[Value]) -> bool {
        true
    }

    fn apply(
        &self, _ctx: &ValueContext<'_>, class: &Rc<SourceClass>, anonymous: &SymbolTable,
    ) -> Result<(), AnalysisError> {
        merge_members(class, anonymous)
    }
}

/// Policies consulted for every class, in priority order
pub fn default_policies() -> Vec<Box<dyn ClassPolicy>> {
    vec![Box::new(OrmModelPolicy)]
}

/// Build `class` with the first policy claiming its bases, falling back to [`DefaultPolicy`]
pub fn apply_policies(
    ctx: &ValueContext<'_>, policies: &[Box<dyn ClassPolicy>], class: &Rc<SourceClass>, anonymous: &SymbolTable,
) -> Result<(), AnalysisError> {
    let bases = class.bases.borrow().clone();
    match policies.iter().find(|p| p.claims(ctx, &bases)) {
        Some(policy) => {
            if class.framework() != Some(policy.name()) {
                tracing::debug!("Class {} built by the {} policy", class.address(), policy.name());
                class.set_framework(policy.name());
            }
            policy.apply(ctx, class, anonymous)
        }
        None => DefaultPolicy.apply(ctx, class, anonymous),
    }
}

/// Unite every class-body binding into the member of the same name
///
/// The anonymous scope shares the class's address, so each pair of symbols must agree on it.
pub fn merge_members(class: &SourceClass, anonymous: &SymbolTable) -> Result<(), AnalysisError> {
    for symbol in anonymous.symbols() {
        let member = class.members.create(symbol.name());
        if member.address() != symbol.address() {
            return Err(AnalysisError::InvariantViolation(format!(
                "class member {} does not match class-body binding {}",
                member.address(),
                symbol.address()
            )));
        }
        member.produce(&symbol.value());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::symbol::Address;
    use lantern_core::CancelHandle;
    use lantern_parser::NodeId;

    #[test]
    fn test_default_policy_merges_bindings() {
        let address = Address::new("/app.py", "C");
        let class = SourceClass::new(NodeId::fresh(), "C", address.clone(), "app");
        let body = SymbolTable::new(address, None);
        body.put("x", Value::int(1));

        let graph = MemoryGraph::default();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        apply_policies(&ctx, &default_policies(), &class, &body).unwrap();

        assert_eq!(class.members.get("x").unwrap().value().to_string(), "int(1)");
        assert_eq!(class.framework(), None);
        class.clear();
    }

    #[test]
    fn test_mismatched_addresses_are_an_invariant_violation() {
        let class = SourceClass::new(NodeId::fresh(), "C", Address::new("/app.py", "C"), "app");
        let body = SymbolTable::new(Address::new("/app.py", "Other"), None);
        body.put("x", Value::None);
        let err = merge_members(&class, &body).unwrap_err();
        assert!(matches!(err, AnalysisError::InvariantViolation(_)));
        class.clear();
    }
}
