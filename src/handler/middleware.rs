//! Handler middleware.
//!
//! A [`Middleware`] wraps a handler in another handler. Wrapping happens
//! once, when the map is composed, not per call.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wirecall::handler::{compose_middleware, HandlerEntry, HandlerMap, LogCalls, LogErrors, Middleware};
//! use wirecall::HostValue;
//!
//! let mut handlers = HandlerMap::new();
//! handlers.insert("ping".to_string(), HandlerEntry::from_sync(|_| Ok(HostValue::from("pong"))));
//!
//! let stack: Vec<Arc<dyn Middleware>> = vec![Arc::new(LogErrors), Arc::new(LogCalls)];
//! let wrapped = compose_middleware(handlers, &stack);
//! assert!(wrapped.contains_key("ping"));
//! ```

use std::sync::Arc;
use std::time::Instant;

use super::{BoxFuture, Handler, HandlerMap, HandlerResult};
use crate::value::HostValue;

/// Wraps a handler.
pub trait Middleware: Send + Sync {
    /// Return a handler that runs around `inner` for calls to `method`.
    fn wrap(&self, method: &str, inner: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

impl<F> Middleware for F
where
    F: Fn(&str, Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync,
{
    fn wrap(&self, method: &str, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self(method, inner)
    }
}

/// Wrap every handler of `handlers` in `middleware`.
///
/// The first middleware of the slice is the outermost: it sees the call
/// first and the result last. Help text and signatures are kept.
pub fn compose_middleware(handlers: HandlerMap, middleware: &[Arc<dyn Middleware>]) -> HandlerMap {
    handlers
        .into_iter()
        .map(|(method, mut entry)| {
            entry.handler = middleware
                .iter()
                .rev()
                .fold(entry.handler, |inner, m| m.wrap(&method, inner));
            (method, entry)
        })
        .collect()
}

/// Logs each call and its result at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCalls;

/// Logs how long each call took.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeCalls;

/// Logs failed calls at error level. The error itself is passed on unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrors;

#[derive(Clone, Copy)]
enum Observe {
    Calls,
    Time,
    Errors,
}

impl Middleware for LogCalls {
    fn wrap(&self, method: &str, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Observed::new(Observe::Calls, method, inner))
    }
}

impl Middleware for TimeCalls {
    fn wrap(&self, method: &str, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Observed::new(Observe::Time, method, inner))
    }
}

impl Middleware for LogErrors {
    fn wrap(&self, method: &str, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Observed::new(Observe::Errors, method, inner))
    }
}

struct Observed {
    kind: Observe,
    method: Arc<str>,
    inner: Arc<dyn Handler>,
}

impl Observed {
    fn new(kind: Observe, method: &str, inner: Arc<dyn Handler>) -> Self {
        Self {
            kind,
            method: Arc::from(method),
            inner,
        }
    }
}

impl Handler for Observed {
    fn call(&self, params: Vec<HostValue>) -> BoxFuture<'static, HandlerResult> {
        let kind = self.kind;
        let method = Arc::clone(&self.method);

        if let Observe::Calls = kind {
            tracing::debug!(method = %method, ?params, "call");
        }
        let started = Instant::now();
        let fut = self.inner.call(params);

        Box::pin(async move {
            let result = fut.await;
            match kind {
                Observe::Calls => {
                    tracing::debug!(method = %method, ?result, "call finished");
                }
                Observe::Time => {
                    tracing::debug!(
                        method = %method,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        ok = result.is_ok(),
                        "call timing"
                    );
                }
                Observe::Errors => {
                    if let Err(e) = &result {
                        tracing::error!(method = %method, "handler error: {}", e);
                    }
                }
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{Fault, RpcError};
    use crate::handler::HandlerEntry;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    struct Recorded {
        name: &'static str,
        log: Log,
        inner: Arc<dyn Handler>,
    }

    impl Middleware for Recorder {
        fn wrap(&self, _method: &str, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
            Arc::new(Recorded {
                name: self.name,
                log: Arc::clone(&self.log),
                inner,
            })
        }
    }

    impl Handler for Recorded {
        fn call(&self, params: Vec<HostValue>) -> BoxFuture<'static, HandlerResult> {
            let name = self.name;
            let log = Arc::clone(&self.log);
            let inner = Arc::clone(&self.inner);
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}-pre", name));
                let result = inner.call(params).await;
                log.lock().unwrap().push(format!("{}-post", name));
                result
            })
        }
    }

    fn recorded_map(log: &Log) -> HandlerMap {
        let log = Arc::clone(log);
        let mut map = HandlerMap::new();
        map.insert(
            "h".to_string(),
            HandlerEntry::from_sync(move |_| {
                log.lock().unwrap().push("h".to_string());
                Ok(HostValue::Nil)
            })
            .doc("doc")
            .signature(["nil"]),
        );
        map
    }

    #[tokio::test]
    async fn test_leftmost_middleware_is_outermost() {
        let log: Log = Arc::default();
        let stack: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder {
                name: "A",
                log: Arc::clone(&log),
            }),
            Arc::new(Recorder {
                name: "B",
                log: Arc::clone(&log),
            }),
        ];

        let composed = compose_middleware(recorded_map(&log), &stack);
        composed["h"].handler().call(vec![]).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["A-pre", "B-pre", "h", "B-post", "A-post"]
        );
    }

    #[test]
    fn test_metadata_preserved() {
        let log: Log = Arc::default();
        let stack: Vec<Arc<dyn Middleware>> = vec![Arc::new(LogCalls), Arc::new(TimeCalls)];

        let composed = compose_middleware(recorded_map(&log), &stack);

        assert_eq!(composed["h"].help(), "doc");
        assert_eq!(composed["h"].signatures().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closure_middleware() {
        let prefix = |_method: &str, inner: Arc<dyn Handler>| -> Arc<dyn Handler> {
            Arc::new(crate::handler::FnHandler::new(move |params| {
                let inner = Arc::clone(&inner);
                async move {
                    let value = inner.call(params).await?;
                    Ok(HostValue::from(format!("wrapped:{}", value.as_str().unwrap_or(""))))
                }
            }))
        };
        let mut map = HandlerMap::new();
        map.insert(
            "x".to_string(),
            HandlerEntry::from_sync(|_| Ok(HostValue::from("x"))),
        );

        let stack: Vec<Arc<dyn Middleware>> = vec![Arc::new(prefix)];
        let composed = compose_middleware(map, &stack);

        let out = composed["x"].handler().call(vec![]).await.unwrap();
        assert_eq!(out, HostValue::from("wrapped:x"));
    }

    #[tokio::test]
    async fn test_observers_do_not_change_outcomes() {
        let mut map = HandlerMap::new();
        map.insert(
            "ok".to_string(),
            HandlerEntry::from_sync(|params| Ok(HostValue::Seq(params))),
        );
        map.insert(
            "bad".to_string(),
            HandlerEntry::from_sync(|_| Err(Fault::new(3, "nope").into())),
        );
        let stack: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(LogErrors), Arc::new(LogCalls), Arc::new(TimeCalls)];

        let composed = compose_middleware(map, &stack);

        let ok = composed["ok"]
            .handler()
            .call(vec![HostValue::Int(1)])
            .await
            .unwrap();
        assert_eq!(ok, HostValue::Seq(vec![HostValue::Int(1)]));

        let err = composed["bad"].handler().call(vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::Fault(ref f) if f.code == 3));
    }
}
