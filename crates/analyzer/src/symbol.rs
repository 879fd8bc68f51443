//! Addresses, symbols and lexically chained symbol tables
//!
//! A [`Symbol`] is a named binding whose value only grows during ordinary passes. Symbols are
//! shared (`Rc`) between the table that owns them and every value that refers to them, such as a
//! function's parameter list or a class member table, so their value lives behind a `RefCell`.

use crate::value::Value;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// Defining file plus dotted path within it, e.g. `/src/app.py` + `Model.save.self`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub file: PathBuf,
    pub path: String,
}

impl Address {
    pub fn new(file: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Self { file: file.into(), path: path.into() }
    }

    /// Root address of a file or directory
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self::new(file, "")
    }

    pub fn child(&self, name: &str) -> Address {
        let path = if self.path.is_empty() { name.to_string() } else { format!("{}.{}", self.path, name) };
        Address { file: self.file.clone(), path }
    }

    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Last dotted component, or the empty string at a file root
    pub fn tail(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or("")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.file.display())
        } else if self.file.as_os_str().is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}:{}", self.file.display(), self.path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u64);

impl SymbolId {
    fn fresh() -> Self {
        SymbolId(NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct Symbol {
    id: SymbolId,
    name: String,
    address: Address,
    value: RefCell<Value>,
    private: Cell<bool>,
}

pub type SymbolRef = Rc<Symbol>;

impl Symbol {
    pub fn new(name: impl Into<String>, address: Address) -> SymbolRef {
        Rc::new(Symbol {
            id: SymbolId::fresh(),
            name: name.into(),
            address,
            value: RefCell::new(Value::empty()),
            private: Cell::new(false),
        })
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn is_private(&self) -> bool {
        self.private.get()
    }

    /// Unite `value` into the current value
    pub fn produce(&self, value: &Value) {
        self.produce_private(value, false);
    }

    /// Unite `value` into the current value; the symbol stays private only if every binding was
    pub fn produce_private(&self, value: &Value, private: bool) {
        self.private.set(self.private.get() && private);
        if value.is_empty() {
            return;
        }
        let current = self.value();
        let merged = Value::unite([current, value.clone()]);
        *self.value.borrow_mut() = merged;
    }

    /// Replace the current value outright
    pub fn put(&self, value: Value) {
        *self.value.borrow_mut() = value;
    }

    pub(crate) fn clear(&self) {
        *self.value.borrow_mut() = Value::empty();
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("address", &self.address.to_string())
            .field("value", &self.value.borrow().to_string())
            .field("private", &self.private.get())
            .finish()
    }
}

/// Ordered name to symbol map chained to its lexical parent
pub struct SymbolTable {
    address: Address,
    entries: RefCell<IndexMap<String, SymbolRef>>,
    parent: Option<Rc<SymbolTable>>,
}

impl SymbolTable {
    pub fn new(address: Address, parent: Option<Rc<SymbolTable>>) -> Rc<Self> {
        Rc::new(SymbolTable { address, entries: RefCell::new(IndexMap::new()), parent })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn parent(&self) -> Option<&Rc<SymbolTable>> {
        self.parent.as_ref()
    }

    /// Symbol bound directly in this table
    pub fn get(&self, name: &str) -> Option<SymbolRef> {
        self.entries.borrow().get(name).cloned()
    }

    /// Resolve `name` in this table or the nearest ancestor that binds it
    pub fn lookup(&self, name: &str) -> Option<SymbolRef> {
        let mut table = Some(self);
        while let Some(current) = table {
            if let Some(symbol) = current.get(name) {
                return Some(symbol);
            }
            table = current.parent.as_deref();
        }
        None
    }

    /// Local symbol for `name`, created if missing
    pub fn create(&self, name: &str) -> SymbolRef {
        self.create_private(name, false)
    }

    pub fn create_private(&self, name: &str, private: bool) -> SymbolRef {
        if let Some(symbol) = self.get(name) {
            return symbol;
        }
        let symbol = Symbol::new(name, self.address.child(name));
        symbol.private.set(private);
        self.entries.borrow_mut().insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Create `name` if needed and overwrite its value
    pub fn put(&self, name: &str, value: Value) -> SymbolRef {
        let symbol = self.create(name);
        symbol.put(value);
        symbol
    }

    pub fn symbols(&self) -> Vec<SymbolRef> {
        self.entries.borrow().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub(crate) fn clear_values(&self) {
        for symbol in self.entries.borrow().values() {
            symbol.clear();
        }
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("address", &self.address.to_string())
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_table() -> Rc<SymbolTable> {
        SymbolTable::new(Address::file("/src/app.py"), None)
    }

    #[test]
    fn test_address_child_and_display() {
        let root = Address::file("/src/app.py");
        let child = root.child("Model").child("save");
        assert_eq!(child.path, "Model.save");
        assert_eq!(child.tail(), "save");
        assert_eq!(child.to_string(), "/src/app.py:Model.save");
        assert_eq!(root.to_string(), "/src/app.py");
    }

    #[test]
    fn test_lookup_walks_parent_chain() {
        let module = module_table();
        module.put("x", Value::int(1));
        let function = SymbolTable::new(module.address().child("f"), Some(module.clone()));
        function.put("y", Value::str("a"));

        assert_eq!(function.lookup("x").unwrap().value(), Value::int(1));
        assert!(function.get("x").is_none());
        assert!(module.lookup("y").is_none());
    }

    #[test]
    fn test_create_is_idempotent() {
        let table = module_table();
        let first = table.create("a");
        let second = table.create("a");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.address().path, "a");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_produce_unites() {
        let table = module_table();
        let symbol = table.create("a");
        symbol.produce(&Value::int(1));
        symbol.produce(&Value::str("x"));
        symbol.produce(&Value::int(1));
        assert_eq!(symbol.value().to_string(), "int(1) | str('x')");
    }

    #[test]
    fn test_private_only_while_every_binding_is_private() {
        let table = module_table();
        let symbol = table.create_private("os", true);
        symbol.produce_private(&Value::None, true);
        assert!(symbol.is_private());
        symbol.produce(&Value::None);
        assert!(!symbol.is_private());
    }

    #[test]
    fn test_symbol_ids_are_unique() {
        let table = module_table();
        assert_ne!(table.create("a").id(), table.create("b").id());
    }
}
