//! Propagation observers
//!
//! A [`PropagatorDelegate`] is told about pass boundaries and about every expression the engine
//! resolves. The [`Tracer`] writes a plain-text log of the propagation to any writer, independent
//! of the `tracing` subscriber.

use crate::value::Value;
use lantern_parser::AstNode;
use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

/// Callbacks invoked while an assembly is built
pub trait PropagatorDelegate {
    /// A new pass is starting; `current` counts from 1
    fn pass(&mut self, _current: usize, _total: usize) {}

    /// `expr` evaluated to `value`
    fn resolved(&mut self, _expr: &AstNode, _value: &Value) {}
}

/// Shared delegate, so the caller can inspect it after handing a clone to the assembler
impl<T: PropagatorDelegate> PropagatorDelegate for Rc<RefCell<T>> {
    fn pass(&mut self, current: usize, total: usize) {
        self.borrow_mut().pass(current, total);
    }

    fn resolved(&mut self, expr: &AstNode, value: &Value) {
        self.borrow_mut().resolved(expr, value);
    }
}

/// Counts resolutions, mostly useful in tests and benchmarks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolutionTally {
    pub passes: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl PropagatorDelegate for ResolutionTally {
    fn pass(&mut self, current: usize, _total: usize) {
        self.passes = current;
    }

    fn resolved(&mut self, _expr: &AstNode, value: &Value) {
        if value.is_empty() {
            self.unresolved += 1;
        } else {
            self.resolved += 1;
        }
    }
}

/// Optional line-oriented trace sink
#[derive(Default)]
pub struct Tracer {
    sink: Option<Box<dyn Write>>,
}

impl Tracer {
    pub fn new(sink: Box<dyn Write>) -> Self {
        Tracer { sink: Some(sink) }
    }

    pub fn enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Write one line; a failing sink is dropped after a warning
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let Some(sink) = self.sink.as_mut() else { return };
        if let Err(e) = sink.write_fmt(args).and_then(|_| sink.write_all(b"\n")) {
            tracing::warn!("Disabling propagation trace: {}", e);
            self.sink = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                tracing::warn!("Failed to flush propagation trace: {}", e);
            }
        }
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").field("enabled", &self.enabled()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracer_writes_lines() {
        let buffer = Shared::default();
        let mut tracer = Tracer::new(Box::new(buffer.clone()));
        tracer.line(format_args!("### PROPAGATION PASS {}", 1));
        tracer.line(format_args!("x <- {}", Value::int(1)));
        let text = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        assert_eq!(text, "### PROPAGATION PASS 1\nx <- int(1)\n");
    }

    #[test]
    fn test_disabled_tracer_is_silent() {
        let mut tracer = Tracer::default();
        assert!(!tracer.enabled());
        tracer.line(format_args!("ignored"));
    }

    #[test]
    fn test_tally_counts() {
        let mut tally = ResolutionTally::default();
        let expr = AstNode::identifier("x");
        tally.pass(2, 3);
        tally.resolved(&expr, &Value::None);
        tally.resolved(&expr, &Value::empty());
        assert_eq!(tally, ResolutionTally { passes: 2, resolved: 1, unresolved: 1 });
    }
}
