//! Builds an [`Assembly`] from parsed source bundles
//!
//! The assembler owns the shared state of a build: the package graph, the options, the class
//! policies, the trace sink and the capability recorder. [`Assembler::build`] orders the modules,
//! then runs the configured number of propagation passes over every module, function and lambda
//! discovered so far. Items discovered during a pass are appended to the work list and propagated
//! in the same pass.

use crate::assembly::{Assembly, WorkItem};
use crate::bootstrap;
use crate::capabilities::{CapabilityRecorder, refine_unions};
use crate::config::Options;
use crate::framework::{ClassPolicy, default_policies};
use crate::graph::PackageGraph;
use crate::propagate;
use crate::sources::SourceBundle;
use crate::symbol::{Address, SymbolId, SymbolTable};
use crate::trace::{PropagatorDelegate, Tracer};
use crate::value::{ValueContext, builtins};
use indexmap::{IndexMap, IndexSet};
use lantern_core::{AnalysisError, CancelHandle};
use lantern_parser::{AstNode, ImportDecl, PythonParser};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

/// Everything a propagator needs besides the assembly itself
pub(crate) struct Environment {
    pub(crate) graph: Arc<dyn PackageGraph>,
    pub(crate) options: Options,
    pub(crate) policies: Vec<Box<dyn ClassPolicy>>,
    pub(crate) delegate: Option<Box<dyn PropagatorDelegate>>,
    pub(crate) tracer: Tracer,
    /// Present only while the final pass records capabilities
    pub(crate) recorder: Option<CapabilityRecorder>,
    pub(crate) builtins: Rc<SymbolTable>,
    pub(crate) cancel: CancelHandle,
    parser: Option<PythonParser>,
    evals: FxHashMap<String, Rc<AstNode>>,
}

impl Environment {
    pub(crate) fn ctx(&self) -> ValueContext<'_> {
        ValueContext::new(self.graph.as_ref(), &self.cancel)
    }

    /// Parsed form of an `eval` argument
    ///
    /// Parses are cached by source text so the statements keep their node identities across
    /// passes and functions defined inside them are created once.
    pub(crate) fn parse_eval(&mut self, source: &str) -> Option<Rc<AstNode>> {
        if let Some(ast) = self.evals.get(source) {
            return Some(ast.clone());
        }
        if self.parser.is_none() {
            match PythonParser::new() {
                Ok(parser) => self.parser = Some(parser),
                Err(e) => {
                    tracing::warn!("Cannot analyze eval arguments: {}", e);
                    return None;
                }
            }
        }
        let parser = self.parser.as_mut()?;
        match parser.parse_module(source) {
            Ok(ast) => {
                let ast = Rc::new(ast);
                self.evals.insert(source.to_string(), ast.clone());
                Some(ast)
            }
            Err(e) => {
                tracing::debug!("Skipping unparsable eval argument: {}", e);
                None
            }
        }
    }
}

pub struct Assembler {
    assembly: Assembly,
    env: Environment,
}

impl Assembler {
    pub fn new(graph: Arc<dyn PackageGraph>, options: Options) -> Self {
        let cancel = CancelHandle::new();
        let builtins = builtin_scope(graph.as_ref(), &cancel);
        let mut assembly = Assembly::default();
        assembly.python_paths = options.python_paths.clone();
        let env = Environment {
            graph,
            options,
            policies: default_policies(),
            delegate: None,
            tracer: Tracer::default(),
            recorder: None,
            builtins,
            cancel,
            parser: None,
            evals: FxHashMap::default(),
        };
        Assembler { assembly, env }
    }

    /// Replace the class policies consulted for every class
    pub fn with_policies(mut self, policies: Vec<Box<dyn ClassPolicy>>) -> Self {
        self.env.policies = policies;
        self
    }

    pub fn with_delegate(mut self, delegate: Box<dyn PropagatorDelegate>) -> Self {
        self.env.delegate = Some(delegate);
        self
    }

    /// Write a plain-text propagation trace to `sink`
    pub fn set_trace(&mut self, sink: Box<dyn Write>) {
        self.env.tracer = Tracer::new(sink);
    }

    pub fn options(&self) -> &Options {
        &self.env.options
    }

    /// Register a parsed file; a second bundle for the same path is ignored
    pub fn add_source(&mut self, bundle: SourceBundle) {
        if let Some(root) = &bundle.library_root {
            if !self.assembly.python_paths.contains(root) {
                self.assembly.python_paths.push(root.clone());
            }
        }
        if self.assembly.sources.contains(&bundle.path) {
            tracing::warn!("Source {} added twice; keeping the first", bundle.path.display());
            return;
        }
        let module = crate::value::SourceModule::new(&bundle.module_name(), &bundle.path, self.env.builtins.clone());
        self.assembly.sources.add_file(&bundle.path, module);
        self.assembly.bundles.push(bundle);
    }

    /// Run every propagation pass
    ///
    /// Returns [`AnalysisError::Cancelled`] as soon as `cancel` fires. A cancelled assembly is
    /// incomplete and must be discarded along with this assembler.
    pub fn build(&mut self, cancel: &CancelHandle) -> Result<&Assembly, AnalysisError> {
        self.env.options.validate().map_err(|e| AnalysisError::InvalidOptions(e.to_string()))?;
        cancel.check()?;
        self.env.cancel = cancel.clone();
        self.schedule_modules();

        let passes = self.env.options.passes;
        tracing::info!("Building assembly of {} files with {} passes", self.assembly.bundles.len(), passes);
        for pass in 0..passes {
            let current = pass + 1;
            self.env.tracer.line(format_args!("### PROPAGATION PASS {current}"));
            if let Some(delegate) = self.env.delegate.as_mut() {
                delegate.pass(current, passes);
            }
            self.env.recorder =
                (current == passes && self.env.options.use_capabilities).then(CapabilityRecorder::new);

            let mut index = 0;
            while index < self.assembly.order.len() {
                cancel.check()?;
                let item = self.assembly.order[index].clone();
                propagate::propagate_item(&mut self.assembly, &mut self.env, &item)?;
                index += 1;
            }
            tracing::debug!("Pass {}/{} propagated {} items", current, passes, self.assembly.order.len());
        }

        if let Some(recorder) = self.env.recorder.as_ref() {
            let refined = refine_unions(&self.env.ctx(), recorder)?;
            tracing::debug!("Refined {} ambiguous symbols", refined);
        }
        self.env.tracer.flush();
        tracing::info!(
            "Assembly built: {} classes, {} functions, {} lambdas",
            self.assembly.classes.len(),
            self.assembly.functions.len(),
            self.assembly.lambdas.len()
        );
        Ok(&self.assembly)
    }

    /// Append every module not yet scheduled, in bootstrap order
    fn schedule_modules(&mut self) {
        let scheduled: FxHashSet<usize> = self
            .assembly
            .order
            .iter()
            .filter_map(|item| match item {
                WorkItem::Module(index) => Some(*index),
                WorkItem::Function(_) => None,
            })
            .collect();
        let files: Vec<(PathBuf, Vec<ImportDecl>)> = self
            .assembly
            .bundles
            .iter()
            .enumerate()
            .filter(|(index, _)| !scheduled.contains(index))
            .map(|(_, bundle)| (bundle.path.clone(), bundle.imports.clone()))
            .collect();
        if files.is_empty() {
            return;
        }

        let order = bootstrap::order(&files, &self.assembly.python_paths);
        for path in order {
            if let Some(index) = self.assembly.bundles.iter().position(|b| b.path == path) {
                self.env.tracer.line(format_args!("bootstrap: {}", path.display()));
                self.assembly.order.push(WorkItem::Module(index));
            }
        }
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    pub fn into_assembly(self) -> Assembly {
        self.assembly
    }

    /// Attributes accessed per symbol during the final pass
    pub fn capabilities(&self) -> Option<&IndexMap<SymbolId, IndexSet<String>>> {
        self.env.recorder.as_ref().map(CapabilityRecorder::capabilities)
    }

    pub fn forward_graph(&self) -> Option<&IndexMap<SymbolId, IndexSet<SymbolId>>> {
        self.env.recorder.as_ref().map(CapabilityRecorder::forward_graph)
    }

    pub fn backward_graph(&self) -> Option<&IndexMap<SymbolId, IndexSet<SymbolId>>> {
        self.env.recorder.as_ref().map(CapabilityRecorder::backward_graph)
    }

    pub fn recorder(&self) -> Option<&CapabilityRecorder> {
        self.env.recorder.as_ref()
    }
}

/// Scope every module chains to: the graph's `builtins` members, then the modelled overrides
fn builtin_scope(graph: &dyn PackageGraph, cancel: &CancelHandle) -> Rc<SymbolTable> {
    let scope = SymbolTable::new(Address::new("", "builtins"), None);
    if graph.kind("builtins").is_none() {
        tracing::warn!("Package graph has no builtins module; only modelled builtins are available");
    }
    let ctx = ValueContext::new(graph, cancel);
    for name in graph.children("builtins") {
        let Some(path) = graph.attr("builtins", &name) else { continue };
        scope.create(&name).produce(&ctx.external_value(&path));
    }
    for (name, value) in builtins::overrides() {
        scope.put(name, value);
    }
    scope
}
