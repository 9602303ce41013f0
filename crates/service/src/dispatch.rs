//! Local function dispatch: turning an inbound `{Module, Function, Args}`
//! invocation into a value, without caring where the request came from
//! (SUPPLEMENT — the original spec left the application side of this as an
//! implementation detail of whatever registers handlers).

use codec::Term;

/// What an invocation produced. `Crash` models a function that panicked or
/// refused to run; it becomes an `RpcError::Crash` in the reply, never an
/// actor-level failure.
pub enum Outcome {
    Value(Term),
    Crash(String),
    /// No handler registered for this module/function pair.
    NoSuchFunction,
}

/// The collaborator a server acceptor asks to run an invocation. Kept
/// synchronous and object-safe so it can be shared as `Arc<dyn Invoke>`
/// across every acceptor and executor task; an implementation that needs to
/// await something should do so before returning, or spawn its own task and
/// block on it.
pub trait Invoke: Send + Sync + 'static {
    fn invoke(&self, module: &str, function: &str, args: Term) -> Outcome;
}

type Handler = dyn Fn(Term) -> Outcome + Send + Sync;

/// A default [`Invoke`] implementation: a plain table of `(module,
/// function)` -> closure, populated by [`FunctionRegistry::register`]. Good
/// enough for any process that wants to expose a fixed, compile-time-known
/// set of RPC endpoints.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: ahash::HashMap<(String, String), std::sync::Arc<Handler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        handler: impl Fn(Term) -> Outcome + Send + Sync + 'static,
    ) {
        self.functions
            .insert((module.into(), function.into()), std::sync::Arc::new(handler));
    }
}

impl Invoke for FunctionRegistry {
    fn invoke(&self, module: &str, function: &str, args: Term) -> Outcome {
        match self.functions.get(&(module.to_string(), function.to_string())) {
            Some(handler) => handler(args),
            None => Outcome::NoSuchFunction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_function_is_invoked() {
        let mut registry = FunctionRegistry::new();
        registry.register("math", "double", |args| {
            let n = args.as_int().unwrap_or(0);
            Outcome::Value(Term::Int(n * 2))
        });

        match registry.invoke("math", "double", Term::Int(21)) {
            Outcome::Value(Term::Int(42)) => {}
            _ => panic!("expected Value(Int(42))"),
        }
    }

    #[test]
    fn missing_function_reports_no_such_function() {
        let registry = FunctionRegistry::new();
        match registry.invoke("math", "double", Term::Int(1)) {
            Outcome::NoSuchFunction => {}
            _ => panic!("expected NoSuchFunction"),
        }
    }
}
