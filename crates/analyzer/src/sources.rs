//! Source files handed to the assembler and the package tree built from them

use crate::value::{SourceModule, SourcePackage, Value};
use crate::symbol::SymbolRef;
use indexmap::IndexMap;
use lantern_parser::{AstNode, ImportDecl, PythonParser, extract_imports};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A parsed file together with the imports it declares
#[derive(Debug, Clone)]
pub struct SourceBundle {
    pub path: PathBuf,
    pub ast: Rc<AstNode>,
    pub imports: Vec<ImportDecl>,
    /// Root directory of the library this file belongs to, searched by absolute imports
    pub library_root: Option<PathBuf>,
}

impl SourceBundle {
    pub fn new(path: impl Into<PathBuf>, ast: AstNode) -> Self {
        let path = path.into();
        let imports = extract_imports(&path, &ast);
        SourceBundle { path, ast: Rc::new(ast), imports, library_root: None }
    }

    /// Parse `source` and collect its imports
    pub fn parse(path: impl Into<PathBuf>, source: &str, parser: &mut PythonParser) -> lantern_core::Result<Self> {
        let ast = parser.parse_module(source)?;
        Ok(SourceBundle::new(path, ast))
    }

    pub fn with_library_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.library_root = Some(root.into());
        self
    }

    /// Module name derived from the file name; `__init__.py` takes its directory's name
    pub fn module_name(&self) -> String {
        module_name(&self.path)
    }
}

pub(crate) fn module_name(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    if stem == "__init__" {
        if let Some(dir) = path.parent().and_then(Path::file_name) {
            return dir.to_string_lossy().into_owned();
        }
    }
    stem
}

/// Directory tree of every analyzed file
///
/// Each directory becomes a [`SourcePackage`] whose entries name the modules and sub-packages it
/// contains; an `__init__.py` becomes the package's init module instead of an entry.
#[derive(Default)]
pub struct SourceTree {
    files: IndexMap<PathBuf, Rc<SourceModule>>,
    dirs: IndexMap<PathBuf, Rc<SourcePackage>>,
}

impl SourceTree {
    pub fn add_file(&mut self, path: &Path, module: Rc<SourceModule>) {
        let parent = path.parent().unwrap_or(Path::new(""));
        let package = self.add_dir(parent);
        if path.file_name().is_some_and(|n| n == "__init__.py") {
            *package.init.borrow_mut() = Some(module.clone());
        } else {
            let stem = module_name(path);
            package.entries.create(&stem).produce(&Value::Module(module.clone()));
        }
        self.files.insert(path.to_path_buf(), module);
    }

    /// Package for `dir`, creating it and its ancestors on first use
    pub fn add_dir(&mut self, dir: &Path) -> Rc<SourcePackage> {
        if let Some(package) = self.dirs.get(dir) {
            return package.clone();
        }
        let package = SourcePackage::new(dir);
        self.dirs.insert(dir.to_path_buf(), package.clone());
        if let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) {
            let parent = self.add_dir(parent);
            parent.entries.create(&name.to_string_lossy()).produce(&Value::Package(package.clone()));
        }
        package
    }

    pub fn file(&self, path: &Path) -> Option<&Rc<SourceModule>> {
        self.files.get(path)
    }

    pub fn dir(&self, path: &Path) -> Option<&Rc<SourcePackage>> {
        self.dirs.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &Rc<SourceModule>)> {
        self.files.iter()
    }

    pub fn dirs(&self) -> impl Iterator<Item = (&PathBuf, &Rc<SourcePackage>)> {
        self.dirs.iter()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Entry `name` in the nearest ancestor directory of `from` that has one
    pub fn import_abs(&self, from: &Path, name: &str) -> Option<SymbolRef> {
        let start = from.parent()?;
        start.ancestors().find_map(|dir| self.dirs.get(dir).and_then(|p| p.entries.get(name)))
    }

    /// Entry `name` directly under `root`
    pub fn import_from_root(&self, root: &Path, name: &str) -> Option<SymbolRef> {
        self.dirs.get(root).and_then(|p| p.entries.get(name))
    }

    /// Package `dots` levels up from the file `from`; one dot is the file's own directory
    pub fn import_rel(&self, from: &Path, dots: usize) -> Option<Rc<SourcePackage>> {
        let mut dir = from.parent()?;
        for _ in 1..dots {
            dir = dir.parent()?;
        }
        self.dirs.get(dir).cloned()
    }

    pub(crate) fn clear(&self) {
        for package in self.dirs.values() {
            package.entries.clear_values();
            package.init.borrow_mut().take();
        }
        for module in self.files.values() {
            module.members.clear_values();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Address, SymbolTable};

    fn module(path: &str) -> Rc<SourceModule> {
        let builtins = SymbolTable::new(Address::file(""), None);
        SourceModule::new(&module_name(Path::new(path)), Path::new(path), builtins)
    }

    fn tree(paths: &[&str]) -> SourceTree {
        let mut tree = SourceTree::default();
        for path in paths {
            tree.add_file(Path::new(path), module(path));
        }
        tree
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("/code/util.py")), "util");
        assert_eq!(module_name(Path::new("/code/pkg/__init__.py")), "pkg");
    }

    #[test]
    fn test_init_becomes_package_init() {
        let tree = tree(&["/code/pkg/__init__.py", "/code/pkg/mod.py"]);
        let package = tree.dir(Path::new("/code/pkg")).unwrap();
        assert!(package.init().is_some());
        assert_eq!(package.entries.names(), vec!["mod"]);
        assert!(package.entries.get("__init__").is_none());
        tree.clear();
    }

    #[test]
    fn test_ancestors_are_registered() {
        let tree = tree(&["/code/a/b/c.py"]);
        let code = tree.dir(Path::new("/code")).unwrap();
        assert!(matches!(code.entries.get("a").unwrap().value(), Value::Package(_)));
        assert!(tree.dir(Path::new("/")).is_some());
        tree.clear();
    }

    #[test]
    fn test_import_abs_prefers_nearest_directory() {
        let tree = tree(&["/code/util.py", "/code/app/util.py", "/code/app/main.py"]);
        let found = tree.import_abs(Path::new("/code/app/main.py"), "util").unwrap();
        let Value::Module(module) = found.value() else { panic!("expected module") };
        assert_eq!(module.path, Path::new("/code/app/util.py"));
        assert!(tree.import_abs(Path::new("/code/app/main.py"), "missing").is_none());
        tree.clear();
    }

    #[test]
    fn test_import_rel() {
        let tree = tree(&["/code/pkg/sub/mod.py", "/code/pkg/other.py"]);
        let here = tree.import_rel(Path::new("/code/pkg/sub/mod.py"), 1).unwrap();
        assert_eq!(here.dir, Path::new("/code/pkg/sub"));
        let up = tree.import_rel(Path::new("/code/pkg/sub/mod.py"), 2).unwrap();
        assert!(up.entries.get("other").is_some());
        tree.clear();
    }
}
