//! Initial module ordering
//!
//! Modules are propagated dependencies-first so that most names already hold a value when they are
//! first read. Imports are resolved against the analyzed files only; cycles are cut wherever the
//! depth-first walk meets a file it has already entered.

use indexmap::{IndexMap, IndexSet};
use lantern_parser::ImportDecl;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

/// Order `files` so that every file comes after the files it imports, where cycles allow
///
/// Each file appears exactly once. Ties keep input order.
pub fn order(files: &[(PathBuf, Vec<ImportDecl>)], roots: &[PathBuf]) -> Vec<PathBuf> {
    let known: FxHashSet<&Path> = files.iter().map(|(path, _)| path.as_path()).collect();
    let dirs: FxHashSet<&Path> =
        files.iter().flat_map(|(path, _)| path.ancestors().skip(1)).chain(roots.iter().map(PathBuf::as_path)).collect();

    let mut deps: IndexMap<&Path, IndexSet<PathBuf>> = IndexMap::new();
    for (path, imports) in files {
        let entry = deps.entry(path.as_path()).or_default();
        for decl in imports {
            match resolve(decl, &known, &dirs, roots) {
                Some(dep) if dep != *path => {
                    entry.insert(dep);
                }
                Some(_) => {}
                None => tracing::trace!("Import {:?} from {} is not a local file", decl.path, path.display()),
            }
        }
    }

    let mut visited: FxHashSet<&Path> = FxHashSet::default();
    let mut out = Vec::with_capacity(files.len());
    for (start, _) in files {
        if !visited.insert(start.as_path()) {
            continue;
        }
        let mut stack: Vec<(&Path, usize)> = vec![(start.as_path(), 0)];
        while let Some(&(node, next)) = stack.last() {
            let dep = deps.get(node).and_then(|d| d.get_index(next));
            match dep {
                Some(dep) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if visited.insert(dep.as_path()) {
                        stack.push((dep.as_path(), 0));
                    }
                }
                None => {
                    out.push(node.to_path_buf());
                    stack.pop();
                }
            }
        }
    }
    out
}

/// Local file an import refers to, if any
fn resolve(decl: &ImportDecl, files: &FxHashSet<&Path>, dirs: &FxHashSet<&Path>, roots: &[PathBuf]) -> Option<PathBuf> {
    let mut components: Vec<&str> = decl.path.iter().map(String::as_str).collect();
    if let Some(name) = &decl.name {
        components.push(name);
    }

    if decl.is_relative() {
        let mut base = decl.origin.parent()?;
        for _ in 1..decl.dots {
            base = base.parent()?;
        }
        return deepest_match(base, &components, files, dirs);
    }

    let start = decl.origin.parent()?;
    start
        .ancestors()
        .chain(roots.iter().map(PathBuf::as_path))
        .filter(|dir| dirs.contains(dir))
        .find_map(|dir| deepest_match(dir, &components, files, dirs))
}

/// Deepest file named by a prefix of `components` below `base`
///
/// A module file wins over a package of the same name, and a package contributes its
/// `__init__.py`.
fn deepest_match(
    base: &Path, components: &[&str], files: &FxHashSet<&Path>, dirs: &FxHashSet<&Path>,
) -> Option<PathBuf> {
    if components.is_empty() {
        let init = base.join("__init__.py");
        return files.contains(init.as_path()).then_some(init);
    }
    let mut best = None;
    let mut current = base.to_path_buf();
    for component in components {
        let module = current.join(format!("{component}.py"));
        if files.contains(module.as_path()) {
            return Some(module);
        }
        let package = current.join(component);
        if !dirs.contains(package.as_path()) {
            break;
        }
        let init = package.join("__init__.py");
        if files.contains(init.as_path()) {
            best = Some(init);
        }
        current = package;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_parser::{PythonParser, extract_imports};

    fn inputs(files: &[(&str, &str)]) -> Vec<(PathBuf, Vec<ImportDecl>)> {
        let mut parser = PythonParser::new().unwrap();
        files
            .iter()
            .map(|(path, src)| {
                let ast = parser.parse_module(src).unwrap();
                (PathBuf::from(path), extract_imports(Path::new(path), &ast))
            })
            .collect()
    }

    fn names(order: &[PathBuf]) -> Vec<String> {
        order.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let files = inputs(&[("/p/a.py", "import b\n"), ("/p/b.py", "from c import x\n"), ("/p/c.py", "x = 1\n")]);
        assert_eq!(names(&order(&files, &[])), vec!["/p/c.py", "/p/b.py", "/p/a.py"]);
    }

    #[test]
    fn test_cycles_emit_each_file_once() {
        let files = inputs(&[("/p/a.py", "import b\n"), ("/p/b.py", "import a\n"), ("/p/c.py", "import c\n")]);
        assert_eq!(names(&order(&files, &[])), vec!["/p/b.py", "/p/a.py", "/p/c.py"]);
    }

    #[test]
    fn test_relative_imports() {
        let files = inputs(&[
            ("/p/pkg/a.py", "from . import b\nfrom .. import top\n"),
            ("/p/pkg/b.py", ""),
            ("/p/top.py", ""),
        ]);
        assert_eq!(names(&order(&files, &[])), vec!["/p/pkg/b.py", "/p/top.py", "/p/pkg/a.py"]);
    }

    #[test]
    fn test_package_init_and_submodules() {
        let files = inputs(&[
            ("/p/main.py", "from pkg import thing\nimport pkg.sub\n"),
            ("/p/pkg/__init__.py", "thing = 1\n"),
            ("/p/pkg/sub.py", ""),
        ]);
        assert_eq!(names(&order(&files, &[])), vec!["/p/pkg/__init__.py", "/p/pkg/sub.py", "/p/main.py"]);
    }

    #[test]
    fn test_module_file_wins_over_package() {
        let files = inputs(&[("/p/main.py", "import util\n"), ("/p/util/__init__.py", ""), ("/p/util.py", "")]);
        assert_eq!(names(&order(&files, &[])), vec!["/p/util.py", "/p/main.py", "/p/util/__init__.py"]);
    }

    #[test]
    fn test_extra_roots_are_searched() {
        let files = inputs(&[("/code/main.py", "import helpers\n"), ("/site/helpers.py", "")]);
        let roots = vec![PathBuf::from("/site")];
        assert_eq!(names(&order(&files, &roots)), vec!["/site/helpers.py", "/code/main.py"]);
        assert_eq!(names(&order(&files, &[])), vec!["/code/main.py", "/site/helpers.py"]);
    }
}
