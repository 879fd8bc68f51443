//! Whole-program value inference for Python
//!
//! This crate builds an [`Assembly`] from a set of parsed source files:
//! - Every module, class, function, lambda and comprehension becomes a scope of symbols
//! - Repeated propagation passes unite the abstract values each binding can hold
//! - Imports resolve against the analyzed files first and an external package graph second
//! - Optional capability refinement narrows ambiguous unions after the final pass

pub mod assembler;
pub mod assembly;
pub mod bootstrap;
pub mod capabilities;
pub mod config;
pub mod framework;
pub mod graph;
pub mod importer;
mod propagate;
pub mod sources;
pub mod symbol;
pub mod trace;
pub mod value;

pub use assembler::Assembler;
pub use assembly::Assembly;
pub use capabilities::{CapabilityRecorder, refine_unions};
pub use config::Options;
pub use framework::{ClassPolicy, DefaultPolicy, OrmModelPolicy, default_policies};
pub use graph::{MemoryGraph, NodeKind, PackageGraph};
pub use sources::{SourceBundle, SourceTree};
pub use symbol::{Address, Symbol, SymbolId, SymbolRef, SymbolTable};
pub use trace::{PropagatorDelegate, ResolutionTally, Tracer};
pub use value::{Args, Value, ValueContext};
