use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;

use crate::artifact::ArtifactHandle;
use crate::engine::Engine;
use crate::error::{InstantiateError, RuntimeError};
use crate::host::{self, HostFunction};
use crate::value::Value;
use crate::vm::Interpreter;

/// A stencil bound to one execution context's globals.
#[derive(Debug)]
pub struct Script {
    artifact: ArtifactHandle,
    context_id: u64,
    globals: Vec<Value>,
}

impl Script {
    pub fn artifact(&self) -> &ArtifactHandle {
        &self.artifact
    }
}

/// Per-thread runtime state: globals, host functions and execution.
///
/// Holds reference-counted script values, so it never leaves its thread.
#[derive(Debug)]
pub struct ExecutionContext {
    engine: Arc<Engine>,
    id: u64,
    globals: AHashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(engine: &Arc<Engine>) -> Self {
        let id = engine.register_context();
        let mut context = Self {
            engine: Arc::clone(engine),
            id,
            globals: AHashMap::new(),
        };
        if engine.config().install_print {
            context.register(host::print(engine.sink()));
        }
        tracing::debug!(context = id, "Created execution context");
        context
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Define or replace a global, returning the previous value.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.globals.insert(name.into(), value)
    }

    /// Expose a host function under its own name.
    pub fn register(&mut self, function: HostFunction) -> Option<Value> {
        let name = function.name().to_string();
        self.define_global(name, Value::Function(Rc::new(function)))
    }

    pub fn remove_global(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// Link an artifact's free identifiers against this context's globals.
    pub fn instantiate(&self, artifact: &ArtifactHandle) -> Result<Script, InstantiateError> {
        let globals = artifact
            .stencil()
            .globals()
            .iter()
            .map(|name| {
                self.globals
                    .get(&**name)
                    .cloned()
                    .ok_or_else(|| InstantiateError::UnresolvedGlobal {
                        name: name.to_string(),
                        filename: artifact.filename().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Script {
            artifact: artifact.clone(),
            context_id: self.id,
            globals,
        })
    }

    /// Run an instantiated script, returning its completion value.
    pub fn execute(&mut self, script: &Script) -> Result<Value, RuntimeError> {
        if script.context_id != self.id {
            return Err(RuntimeError::ForeignScript);
        }
        Interpreter::new(
            script.artifact.stencil(),
            &script.globals,
            self.engine.config().max_string_bytes,
        )
        .run()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.engine.unregister_context();
        tracing::debug!(context = self.id, "Destroyed execution context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ScriptCompiler, StencilCompiler};
    use crate::sink::BufferSink;
    use stencil_config::ContextConfig;

    fn engine_with_buffer() -> (Arc<Engine>, Arc<BufferSink>) {
        let sink = Arc::new(BufferSink::new());
        let engine = Engine::with_sink(ContextConfig::default(), sink.clone());
        (engine, sink)
    }

    #[test]
    fn test_instantiate_and_execute() {
        let (engine, sink) = engine_with_buffer();
        let mut context = engine.new_context();
        let artifact = StencilCompiler::default()
            .compile("print(`JS log one: ${1 + 2}`); 'done'", "none", 1)
            .unwrap();

        let script = context.instantiate(&artifact).unwrap();
        let value = context.execute(&script).unwrap();

        assert_eq!(value.to_display(), "done");
        assert_eq!(sink.texts(), vec!["JS log one: 3"]);
        assert!(script.artifact().ptr_eq(&artifact));
    }

    #[test]
    fn test_unresolved_global_fails_instantiation() {
        let (engine, _sink) = engine_with_buffer();
        let mut context = engine.new_context();
        context.remove_global("print");
        let artifact = StencilCompiler::default()
            .compile("print('hello')", "none", 1)
            .unwrap();

        let err = context.instantiate(&artifact).unwrap_err();
        assert_eq!(
            err,
            InstantiateError::UnresolvedGlobal {
                name: "print".into(),
                filename: "none".into(),
            }
        );
    }

    #[test]
    fn test_script_is_bound_to_its_context() {
        let (engine, _sink) = engine_with_buffer();
        let first = engine.new_context();
        let mut second = engine.new_context();
        let artifact = StencilCompiler::default().compile("1", "none", 1).unwrap();

        let script = first.instantiate(&artifact).unwrap();
        assert_eq!(second.execute(&script).unwrap_err(), RuntimeError::ForeignScript);
    }

    #[test]
    fn test_custom_host_function() {
        let (engine, _sink) = engine_with_buffer();
        let mut context = engine.new_context();
        context.register(HostFunction::new("twice", |args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number) * 2.0))
        }));
        let artifact = StencilCompiler::default()
            .compile("twice(21)", "none", 1)
            .unwrap();

        let script = context.instantiate(&artifact).unwrap();
        assert_eq!(context.execute(&script).unwrap().to_display(), "42");
    }

    #[test]
    fn test_print_can_be_disabled() {
        let engine = Engine::with_sink(
            ContextConfig {
                install_print: false,
                ..ContextConfig::default()
            },
            Arc::new(BufferSink::new()),
        );
        assert!(!engine.new_context().has_global("print"));
    }
}
