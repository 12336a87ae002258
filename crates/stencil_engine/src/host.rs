use std::fmt;
use std::sync::Arc;

use stencil_utils::thread_label;

use crate::sink::OutputSink;
use crate::value::Value;

/// Result of a host call; the error is a message reported as a runtime error.
pub type HostResult = Result<Value, String>;

type HostFn = dyn Fn(&[Value]) -> HostResult;

/// A native function callable from scripts.
pub struct HostFunction {
    name: String,
    func: Box<HostFn>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> HostResult + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> HostResult {
        (self.func)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// `print(value)`: write the first argument, labelled with the calling thread.
pub fn print(sink: Arc<dyn OutputSink>) -> HostFunction {
    HostFunction::new("print", move |args| {
        let text = args.first().map_or_else(|| "undefined".to_string(), Value::to_display);
        sink.emit(&thread_label(), &text);
        Ok(Value::Undefined)
    })
}
