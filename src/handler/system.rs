//! Built-in `system.*` methods: introspection and multicall.
//!
//! These handlers read the registry they are installed in through a
//! [`WeakRegistry`], so they always see the live method map. They take raw
//! wire arguments and return [`HostValue::Raw`] whatever coercion mode the
//! server runs in. Multicall items are coerced one by one when dispatched,
//! so an item that fails coercion faults alone.

use std::sync::Arc;

use crate::error::{Fault, Result, RpcError, GENERIC_FAULT_CODE, INVALID_PARAMS_CODE};
use crate::value::{to_wire, CoercionOptions, HostValue, WireValue};

use super::dispatch::{dispatch_in, DispatchOptions};
use super::registry::WeakRegistry;
use super::{HandlerEntry, HandlerMap};

/// Lists every registered method.
pub const LIST_METHODS: &str = "system.listMethods";
/// Returns a method's help text.
pub const METHOD_HELP: &str = "system.methodHelp";
/// Returns a method's signatures.
pub const METHOD_SIGNATURE: &str = "system.methodSignature";
/// Runs a batch of calls in one request.
pub const MULTICALL: &str = "system.multicall";

/// Returned by `system.methodSignature` when no signature is declared.
pub const UNDEFINED_SIGNATURE: &str = "undefined";

/// Build the system handler map bound to `registry`.
pub(crate) fn system_handlers(registry: WeakRegistry, options: DispatchOptions) -> HandlerMap {
    let mut map = HandlerMap::new();

    let reg = registry.clone();
    map.insert(
        LIST_METHODS.to_string(),
        HandlerEntry::from_sync(move |_| {
            let snapshot = live(&reg)?;
            let names = snapshot.keys().cloned().map(WireValue::Str).collect();
            Ok(HostValue::Raw(WireValue::Array(names)))
        })
        .doc("Return the names of all methods served, sorted.")
        .signature(["array"])
        .raw_args(),
    );

    let reg = registry.clone();
    map.insert(
        METHOD_HELP.to_string(),
        HandlerEntry::from_sync(move |params| {
            let name = method_name_arg(METHOD_HELP, &params)?;
            let snapshot = live(&reg)?;
            let entry = snapshot
                .get(&name)
                .ok_or_else(|| RpcError::UnknownMethod(name.clone()))?;
            Ok(HostValue::Raw(WireValue::Str(entry.help().to_string())))
        })
        .doc("Return the help text of a method, or an empty string.")
        .signature(["string", "string"])
        .raw_args(),
    );

    let reg = registry.clone();
    map.insert(
        METHOD_SIGNATURE.to_string(),
        HandlerEntry::from_sync(move |params| {
            let name = method_name_arg(METHOD_SIGNATURE, &params)?;
            let snapshot = live(&reg)?;
            let entry = snapshot
                .get(&name)
                .ok_or_else(|| RpcError::UnknownMethod(name.clone()))?;
            let wire = match entry.signatures() {
                Some(signatures) => WireValue::Array(
                    signatures
                        .iter()
                        .map(|sig| sig.iter().cloned().map(WireValue::Str).collect::<Vec<_>>())
                        .map(WireValue::Array)
                        .collect(),
                ),
                None => WireValue::Str(UNDEFINED_SIGNATURE.to_string()),
            };
            Ok(HostValue::Raw(wire))
        })
        .doc("Return the signatures of a method, or \"undefined\".")
        .signature(["array", "string"])
        .signature(["string", "string"])
        .raw_args(),
    );

    map.insert(
        MULTICALL.to_string(),
        HandlerEntry::from_fn(move |params| {
            let registry = registry.clone();
            async move {
                let batch = batch_arg(params)?;
                let snapshot = live(&registry)?;
                let results = run_batch(&snapshot, options, batch).await;
                Ok(HostValue::Raw(WireValue::Array(results)))
            }
        })
        .doc("Run a list of {methodName, params} calls; each result is [value] or a fault struct.")
        .signature(["array", "array"])
        .raw_args(),
    );

    map
}

fn live(registry: &WeakRegistry) -> Result<Arc<HandlerMap>> {
    registry
        .snapshot()
        .ok_or_else(|| Fault::new(GENERIC_FAULT_CODE, "server is shutting down").into())
}

fn invalid_params(method: &str, detail: impl std::fmt::Display) -> RpcError {
    Fault::new(INVALID_PARAMS_CODE, format!("{}: {}", method, detail)).into()
}

/// First argument as a method name. Plain strings, keywords and raw wire
/// strings are all accepted.
fn method_name_arg(method: &str, params: &[HostValue]) -> Result<String> {
    match params.first() {
        Some(HostValue::Str(s)) => Ok(s.clone()),
        Some(HostValue::Keyword(k)) => Ok(k.to_string()),
        Some(HostValue::Raw(WireValue::Str(s))) => Ok(s.clone()),
        Some(other) => Err(invalid_params(
            method,
            format!("expected a method name, got {:?}", other),
        )),
        None => Err(invalid_params(method, "missing method name")),
    }
}

/// The batch argument in wire form. Dispatch hands it over raw; host values
/// only show up when the handler is called directly.
fn batch_arg(params: Vec<HostValue>) -> Result<Vec<WireValue>> {
    let first = params
        .into_iter()
        .next()
        .ok_or_else(|| invalid_params(MULTICALL, "missing call list"))?;

    let wire = match first {
        HostValue::Raw(wire) => wire,
        host => to_wire(&host, &CoercionOptions::new().with_extensions(true))
            .map_err(|e| invalid_params(MULTICALL, e))?,
    };

    match wire {
        WireValue::Array(items) => Ok(items),
        other => Err(invalid_params(
            MULTICALL,
            format!("expected an array of calls, got {}", other.type_name()),
        )),
    }
}

/// Run every item in order against one snapshot. A failing item yields its
/// fault struct and never affects the others.
async fn run_batch(
    snapshot: &HandlerMap,
    options: DispatchOptions,
    batch: Vec<WireValue>,
) -> Vec<WireValue> {
    let mut results = Vec::with_capacity(batch.len());

    for (index, item) in batch.into_iter().enumerate() {
        let outcome = match parse_item(item) {
            Ok((method, _)) if method == MULTICALL => {
                Err(invalid_params(MULTICALL, "nested multicall is not allowed"))
            }
            Ok((method, params)) => dispatch_in(snapshot, options, &method, params).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => results.push(WireValue::Array(vec![value])),
            Err(e) => {
                let fault = e.into_fault();
                tracing::warn!(index, code = fault.code, "multicall item failed: {}", fault.message);
                results.push(fault.to_wire());
            }
        }
    }

    results
}

/// Split a `{methodName, params}` struct.
fn parse_item(item: WireValue) -> Result<(String, Vec<WireValue>)> {
    let mut fields = match item {
        WireValue::Struct(fields) => fields,
        other => {
            return Err(invalid_params(
                MULTICALL,
                format!("call must be a struct, got {}", other.type_name()),
            ))
        }
    };

    let method = match fields.remove("methodName") {
        Some(WireValue::Str(method)) => method,
        _ => return Err(invalid_params(MULTICALL, "call is missing methodName")),
    };

    let params = match fields.remove("params") {
        Some(WireValue::Array(params)) => params,
        None | Some(WireValue::Nil) => Vec::new(),
        Some(other) => {
            return Err(invalid_params(
                MULTICALL,
                format!("params of {} must be an array, got {}", method, other.type_name()),
            ))
        }
    };

    Ok((method, params))
}
