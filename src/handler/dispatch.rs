//! Request dispatch.
//!
//! [`Dispatcher`] is what a listening transport calls for each request:
//! method name and wire arguments in, one wire value (or error) out.

use std::sync::Arc;

use crate::error::{Fault, Result, RpcError, GENERIC_FAULT_CODE};
use crate::value::{to_host_all, to_wire, CoercionOptions, HostValue, WireValue};

use super::{HandlerMap, HandlerRegistry};

/// Coercion settings applied around every handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Allow extension wire types in results.
    pub extensions: bool,
    /// Reject opaque extension values in arguments and results.
    pub strict: bool,
    /// Convert wire arguments to host values. When off, every argument
    /// reaches the handler as [`HostValue::Raw`].
    pub coerce_args: bool,
    /// Convert the handler's result to a wire value. When off, the handler
    /// must return [`HostValue::Raw`].
    pub coerce_result: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            extensions: false,
            strict: false,
            coerce_args: true,
            coerce_result: true,
        }
    }
}

impl DispatchOptions {
    fn coercion(&self) -> CoercionOptions {
        CoercionOptions::new()
            .with_extensions(self.extensions)
            .with_strict(self.strict)
    }
}

/// Routes calls to the handlers of a registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: HandlerRegistry, options: DispatchOptions) -> Self {
        Self { registry, options }
    }

    /// The registry this dispatcher reads.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Coercion settings.
    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Dispatch one call.
    ///
    /// The registry snapshot is taken once, when the call starts; updates
    /// made while the handler runs do not affect it.
    ///
    /// # Errors
    ///
    /// - [`RpcError::UnknownMethod`] if `method` is not registered
    /// - [`RpcError::Fault`] for any handler failure; errors that are not
    ///   already faults become code-0 faults carrying the error message
    /// - [`RpcError::Coercion`] if the arguments or result cannot be coerced
    pub async fn dispatch(&self, method: &str, params: Vec<WireValue>) -> Result<WireValue> {
        let snapshot = self.registry.snapshot();
        dispatch_in(&snapshot, self.options, method, params).await
    }
}

/// Dispatch against an explicit snapshot.
pub(crate) async fn dispatch_in(
    snapshot: &HandlerMap,
    options: DispatchOptions,
    method: &str,
    params: Vec<WireValue>,
) -> Result<WireValue> {
    let entry = snapshot
        .get(method)
        .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;
    let handler = Arc::clone(&entry.handler);

    tracing::debug!(method, params = params.len(), "dispatching request");

    let coercion = options.coercion();
    let args = if options.coerce_args && !entry.raw_args {
        to_host_all(params, &coercion)?
    } else {
        params.into_iter().map(HostValue::Raw).collect()
    };

    // Run on its own task so a panicking handler cannot take the caller down
    let outcome = match tokio::spawn(async move { handler.call(args).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(method, "handler task failed: {}", e);
            return Err(Fault::new(
                GENERIC_FAULT_CODE,
                format!("handler for {} failed: {}", method, e),
            )
            .into());
        }
    };

    let value = outcome.map_err(handler_fault)?;

    if options.coerce_result {
        to_wire(&value, &coercion)
    } else {
        match value {
            HostValue::Raw(wire) => Ok(wire),
            other => Err(RpcError::Coercion(format!(
                "result coercion is disabled but {} returned a host value: {:?}",
                method, other
            ))),
        }
    }
}

/// Faults and unknown-method errors keep their identity; everything else a
/// handler raises becomes a generic fault.
fn handler_fault(err: RpcError) -> RpcError {
    match err {
        RpcError::Fault(_) | RpcError::UnknownMethod(_) => err,
        other => Fault::new(GENERIC_FAULT_CODE, other.to_string()).into(),
    }
}
