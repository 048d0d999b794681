//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ripple_core::{
    ImmediateQueue, MicrotaskQueue, ReactiveError, Runtime, RuntimeConfig, Value,
};
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A runtime that flushes when `next_tick()` is awaited.
pub fn deferred() -> Runtime {
    init_tracing();
    Runtime::with_config(RuntimeConfig::default(), MicrotaskQueue::new())
}

/// A runtime that flushes at the end of every synchronous write.
pub fn immediate() -> Runtime {
    init_tracing();
    Runtime::with_config(RuntimeConfig::default(), ImmediateQueue)
}

/// Collect everything sent to the runtime's error handler.
pub fn capture_errors(rt: &Runtime) -> Rc<RefCell<Vec<ReactiveError>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    rt.set_error_handler(move |err| sink.borrow_mut().push(err.clone()));
    errors
}

pub type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

/// A watch callback that records `(new, old)` pairs.
pub fn recorder() -> (Calls, impl Fn(&Value, &Value) + 'static) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    (calls, move |new: &Value, old: &Value| {
        sink.borrow_mut().push((new.clone(), old.clone()))
    })
}
