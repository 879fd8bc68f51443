//! Import resolution against local sources and the package graph
//!
//! A name is looked up in both places and the results are united: a local `tkinter/` directory
//! does not hide the standard-library `tkinter`, since analysis cannot tell which one the
//! interpreter would pick.

use crate::sources::SourceTree;
use crate::value::{Value, ValueContext};
use lantern_core::AnalysisError;
use std::path::{Path, PathBuf};

pub struct Importer<'a> {
    /// File containing the import statement
    from: &'a Path,
    local: &'a SourceTree,
    roots: Vec<&'a Path>,
}

impl<'a> Importer<'a> {
    pub fn new(from: &'a Path, local: &'a SourceTree, roots: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        Importer { from, local, roots: roots.into_iter().map(PathBuf::as_path).collect() }
    }

    /// Value of the top-level package or module `name`
    pub fn import_root(&self, ctx: &ValueContext<'_>, name: &str) -> Value {
        let local = self
            .local
            .import_abs(self.from, name)
            .or_else(|| self.roots.iter().find_map(|root| self.local.import_from_root(root, name)))
            .map(|symbol| symbol.value())
            .unwrap_or_else(Value::empty);
        let global = if !ctx.graph.distributions(name).is_empty() || ctx.graph.kind(name).is_some() {
            ctx.external_value(name)
        } else {
            Value::empty()
        };
        if local.is_empty() && global.is_empty() {
            tracing::trace!("Unresolved import {} from {}", name, self.from.display());
        }
        Value::unite([local, global])
    }

    /// Value of the dotted module path `path`
    pub fn import_abs(&self, ctx: &ValueContext<'_>, path: &[String]) -> Result<Value, AnalysisError> {
        let Some((first, rest)) = path.split_first() else { return Ok(Value::empty()) };
        let root = self.import_root(ctx, first);
        traverse(ctx, root, rest)
    }

    /// Package `dots` levels up from the importing file
    pub fn import_rel(&self, dots: usize) -> Value {
        self.local.import_rel(self.from, dots).map(Value::Package).unwrap_or_else(Value::empty)
    }

    /// Module named by an `import` or `from ... import` clause
    pub fn resolve(&self, ctx: &ValueContext<'_>, dots: usize, path: &[String]) -> Result<Value, AnalysisError> {
        if dots == 0 {
            return self.import_abs(ctx, path);
        }
        traverse(ctx, self.import_rel(dots), path)
    }
}

fn traverse(ctx: &ValueContext<'_>, mut value: Value, path: &[String]) -> Result<Value, AnalysisError> {
    for name in path {
        if value.is_empty() {
            break;
        }
        value = ctx.attr(&value, name)?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::sources::module_name;
    use crate::symbol::{Address, SymbolTable};
    use crate::value::SourceModule;
    use lantern_core::CancelHandle;

    fn tree(paths: &[&str]) -> SourceTree {
        let builtins = SymbolTable::new(Address::file(""), None);
        let mut tree = SourceTree::default();
        for path in paths {
            let module = SourceModule::new(&module_name(Path::new(path)), Path::new(path), builtins.clone());
            tree.add_file(Path::new(path), module);
        }
        tree
    }

    #[test]
    fn test_local_and_graph_results_are_united() {
        let graph = MemoryGraph::builder().module("tkinter").build();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let tree = tree(&["/code/tkinter/__init__.py", "/code/app.py"]);

        let importer = Importer::new(Path::new("/code/app.py"), &tree, []);
        let value = importer.import_root(&ctx, "tkinter");
        assert_eq!(value.disjuncts().len(), 2);
        assert!(value.disjuncts().iter().any(|v| matches!(v, Value::Package(_))));
        assert!(value.disjuncts().iter().any(|v| matches!(v, Value::External(_))));
        tree.clear();
    }

    #[test]
    fn test_dotted_import_walks_packages() {
        let graph = MemoryGraph::default();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let tree = tree(&["/scratch/src1.py", "/scratch/scratch/scratch.py"]);

        let importer = Importer::new(Path::new("/scratch/src1.py"), &tree, []);
        let path = vec!["scratch".to_string(), "scratch".to_string()];
        let Value::Module(module) = importer.import_abs(&ctx, &path).unwrap() else { panic!("expected module") };
        assert_eq!(module.path, Path::new("/scratch/scratch/scratch.py"));
        tree.clear();
    }

    #[test]
    fn test_python_path_roots_are_searched() {
        let graph = MemoryGraph::default();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let tree = tree(&["/site/lib/helpers.py", "/code/app.py"]);
        let roots = vec![PathBuf::from("/site/lib")];

        let importer = Importer::new(Path::new("/code/app.py"), &tree, &roots);
        assert!(matches!(importer.import_root(&ctx, "helpers"), Value::Module(_)));
        let without_roots = Importer::new(Path::new("/code/app.py"), &tree, []);
        assert!(without_roots.import_root(&ctx, "helpers").is_empty());
        tree.clear();
    }

    #[test]
    fn test_relative_resolution() {
        let graph = MemoryGraph::default();
        let handle = CancelHandle::new();
        let ctx = ValueContext::new(&graph, &handle);
        let tree = tree(&["/code/pkg/a.py", "/code/pkg/b.py"]);

        let importer = Importer::new(Path::new("/code/pkg/a.py"), &tree, []);
        let value = importer.resolve(&ctx, 1, &["b".to_string()]).unwrap();
        assert!(matches!(value, Value::Module(m) if m.name == "b"));
        assert!(importer.resolve(&ctx, 1, &["missing".to_string()]).unwrap().is_empty());
        tree.clear();
    }
}
