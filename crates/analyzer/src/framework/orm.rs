//! Django-style ORM models
//!
//! A model class gets an `objects` manager whose query methods return query sets of the model,
//! plus the `DoesNotExist` / `MultipleObjectsReturned` exception types and the `pk` / `id` fields
//! that the model metaclass adds at runtime.

use super::{ClassPolicy, merge_members};
use crate::symbol::SymbolTable;
use crate::value::{Args, SourceClass, Synthetic, Value, ValueContext};
use lantern_core::AnalysisError;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Graph paths of the ORM model base class
const MODEL_BASES: &[&str] = &["django.db.models.Model", "django.db.models.base.Model"];

const EXCEPTIONS: &[(&str, &str)] = &[
    ("DoesNotExist", "django.core.exceptions.ObjectDoesNotExist"),
    ("MultipleObjectsReturned", "django.core.exceptions.MultipleObjectsReturned"),
];

/// Query methods returning another query set
const QUERYSET_METHODS: &[&str] = &[
    "all", "filter", "exclude", "order_by", "select_related", "prefetch_related", "distinct", "none", "annotate",
    "using", "reverse",
];
/// Query methods returning a single model instance
const INSTANCE_METHODS: &[&str] = &["get", "create", "first", "last", "latest", "earliest"];
const OTHER_METHODS: &[&str] = &["count", "exists", "update", "delete", "get_or_create", "update_or_create", "values"];

#[derive(Debug, Default)]
pub struct OrmModelPolicy;

impl ClassPolicy for OrmModelPolicy {
    fn name(&self) -> &'static str {
        "orm"
    }

    fn claims(&self, ctx: &ValueContext<'_>, bases: &[Value]) -> bool {
        bases.iter().flat_map(|b| b.disjuncts().iter()).any(|base| match base {
            Value::External(r) => derives_from_model(ctx, r.path()),
            Value::Class(class) => class.framework() == Some(self.name()),
            _ => false,
        })
    }

    fn apply(
        &self, ctx: &ValueContext<'_>, class: &Rc<SourceClass>, anonymous: &SymbolTable,
    ) -> Result<(), AnalysisError> {
        merge_members(class, anonymous)?;

        let manager = OrmValue::new(OrmKind::Manager, class);
        class.members.create("objects").produce(&manager);
        for (name, path) in EXCEPTIONS {
            let mut exception = ctx.external_value(path);
            if exception.is_empty() {
                exception = ctx.external_value("builtins.Exception");
            }
            class.members.create(name).produce(&exception);
        }
        for field in ["pk", "id"] {
            class.members.create(field).produce(&Value::Int(None));
        }
        Ok(())
    }
}

/// Whether the graph type at `path` is, or derives from, the model base
fn derives_from_model(ctx: &ValueContext<'_>, path: &str) -> bool {
    let mut visited = FxHashSet::default();
    let mut queue = VecDeque::from([path.to_string()]);
    while let Some(current) = queue.pop_front() {
        if MODEL_BASES.contains(&current.as_str()) {
            return true;
        }
        if visited.insert(current.clone()) {
            queue.extend(ctx.graph.bases(&current));
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrmKind {
    Manager,
    QuerySet,
    Method(&'static str),
}

/// Manager, query set or query method bound to a model class
struct OrmValue {
    kind: OrmKind,
    model: Weak<SourceClass>,
}

impl OrmValue {
    fn new(kind: OrmKind, model: &Rc<SourceClass>) -> Value {
        Value::Synthetic(Rc::new(OrmValue { kind, model: Rc::downgrade(model) }))
    }

    fn derive(&self, kind: OrmKind) -> Value {
        Value::Synthetic(Rc::new(OrmValue { kind, model: self.model.clone() }))
    }

    fn instance(&self) -> Value {
        self.model.upgrade().map(Value::Instance).unwrap_or_else(Value::empty)
    }

    fn model_name(&self) -> String {
        self.model.upgrade().map(|m| m.name.clone()).unwrap_or_default()
    }
}

impl Synthetic for OrmValue {
    fn name(&self) -> String {
        match self.kind {
            OrmKind::Manager => format!("Manager[{}]", self.model_name()),
            OrmKind::QuerySet => format!("QuerySet[{}]", self.model_name()),
            OrmKind::Method(name) => format!("method QuerySet[{}].{}", self.model_name(), name),
        }
    }

    fn key(&self) -> String {
        let kind = match self.kind {
            OrmKind::Manager => "manager".to_string(),
            OrmKind::QuerySet => "queryset".to_string(),
            OrmKind::Method(name) => format!("method:{name}"),
        };
        format!("orm:{}:{:x}", kind, self.model.as_ptr() as usize)
    }

    fn attr(&self, name: &str) -> Value {
        if let OrmKind::Method(_) = self.kind {
            return Value::empty();
        }
        if name == "model" {
            return self.model.upgrade().map(Value::Class).unwrap_or_else(Value::empty);
        }
        QUERYSET_METHODS
            .iter()
            .chain(INSTANCE_METHODS)
            .chain(OTHER_METHODS)
            .find(|m| **m == name)
            .map(|m| self.derive(OrmKind::Method(*m)))
            .unwrap_or_else(Value::empty)
    }

    fn call(&self, _args: &Args) -> Value {
        let OrmKind::Method(name) = self.kind else { return Value::empty() };
        if QUERYSET_METHODS.contains(&name) {
            return self.derive(OrmKind::QuerySet);
        }
        if INSTANCE_METHODS.contains(&name) {
            return self.instance();
        }
        match name {
            "count" | "update" => Value::Int(None),
            "exists" => Value::Bool(None),
            "delete" => Value::tuple(vec![Value::Int(None), Value::dict(Value::Str(None), Value::Int(None))]),
            "get_or_create" | "update_or_create" => Value::tuple(vec![self.instance(), Value::Bool(None)]),
            "values" => Value::list(Value::dict(Value::Str(None), Value::empty())),
            _ => Value::empty(),
        }
    }

    fn elem(&self) -> Value {
        match self.kind {
            OrmKind::QuerySet => self.instance(),
            _ => Value::empty(),
        }
    }

    fn index(&self, _key: &Value) -> Value {
        self.elem()
    }

    fn dir(&self) -> Vec<String> {
        match self.kind {
            OrmKind::Method(_) => Vec::new(),
            _ => QUERYSET_METHODS
                .iter()
                .chain(INSTANCE_METHODS)
                .chain(OTHER_METHODS)
                .chain(std::iter::once(&"model"))
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::symbol::Address;
    use lantern_core::CancelHandle;
    use lantern_parser::NodeId;

    fn model(name: &str) -> Rc<SourceClass> {
        let class = SourceClass::new(NodeId::fresh(), name, Address::new("/app/models.py", name), "models");
        *class.bases.borrow_mut() = vec![Value::external("django.db.models.base.Model")];
        class
    }

    #[test]
    fn test_claims_model_subclasses() {
        let graph = MemoryGraph::bundled();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(graph.as_ref(), &handle);
        let policy = OrmModelPolicy;

        assert!(policy.claims(&ctx, &[Value::external("django.db.models.base.Model")]));
        assert!(!policy.claims(&ctx, &[Value::external("builtins.object")]));

        let parent = model("Base");
        parent.set_framework("orm");
        assert!(policy.claims(&ctx, &[Value::Class(parent.clone())]));
        parent.clear();
    }

    #[test]
    fn test_manager_queries_produce_model_instances() {
        let graph = MemoryGraph::bundled();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(graph.as_ref(), &handle);
        let user = model("User");
        let body = SymbolTable::new(user.address().clone(), None);
        body.put("name", Value::Str(None));
        OrmModelPolicy.apply(&ctx, &user, &body).unwrap();

        let objects = user.members.get("objects").unwrap().value();
        assert_eq!(objects.to_string(), "Manager[User]");

        let filter = ctx.attr(&objects, "filter").unwrap();
        let queryset = ctx.call(&filter, &Args::default()).unwrap();
        assert_eq!(queryset.to_string(), "QuerySet[User]");
        assert_eq!(ctx.elem(&queryset).unwrap().to_string(), "instance User");

        let get = ctx.attr(&queryset, "get").unwrap();
        assert_eq!(ctx.call(&get, &Args::default()).unwrap().to_string(), "instance User");
        let count = ctx.attr(&objects, "count").unwrap();
        assert_eq!(ctx.call(&count, &Args::default()).unwrap().to_string(), "int");

        let missing = user.members.get("DoesNotExist").unwrap().value();
        assert_eq!(missing.to_string(), "django.core.exceptions.ObjectDoesNotExist");
        assert_eq!(user.members.get("name").unwrap().value().to_string(), "str");
        user.clear();
    }
}
