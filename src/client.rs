//! Call client and its builder.
//!
//! A [`Client`] pairs an endpoint with default [`CallConfig`] settings and a
//! [`Transport`]. Each call coerces host arguments to wire values, hands them
//! to the transport, and coerces the reply back:
//! 1. Merge per-call overrides over the defaults (if any)
//! 2. `to_wire` every argument under the effective coercion mode
//! 3. Execute through the transport, bounded by the reply timeout
//! 4. `to_host` the reply; tag faults with the method and wire arguments
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wirecall::transport::LocalNetwork;
//! use wirecall::{params, Client};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let client = Client::builder(LocalNetwork::endpoint(8080))
//!     .transport(LocalNetwork::new())
//!     .reply_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! // Nothing listens on port 8080 of this fresh network
//! assert!(client.call("math.add", &params![1, 2]).await.is_err());
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::{CallConfig, CallOverrides, Credentials};
use crate::error::{Fault, Result, RpcError};
use crate::handler::{LIST_METHODS, METHOD_HELP, METHOD_SIGNATURE, MULTICALL, UNDEFINED_SIGNATURE};
use crate::pending::{self, PendingCall};
use crate::transport::{with_reply_timeout, Transport};
use crate::value::{to_host, to_wire_all, HostValue, WireValue};

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    endpoint: String,
    config: CallConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a builder for `endpoint` with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: CallConfig::default(),
            transport: None,
        }
    }

    /// Replace all default settings at once.
    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    /// Set basic-auth credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the reply timeout.
    ///
    /// Default: none (wait as long as the transport does)
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = Some(timeout);
        self
    }

    /// Compress outgoing requests.
    pub fn compress_request(mut self, enabled: bool) -> Self {
        self.config.compress_request = enabled;
        self
    }

    /// Accept compressed replies.
    pub fn accept_compressed(mut self, enabled: bool) -> Self {
        self.config.accept_compressed = enabled;
        self
    }

    /// Set the request character encoding.
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.encoding = encoding.into();
        self
    }

    /// Set the user-agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Allow extension wire types (64-bit integers).
    ///
    /// Default: false
    pub fn extensions(mut self, enabled: bool) -> Self {
        self.config.extensions = enabled;
        self
    }

    /// Fail coercion on opaque extension values instead of passing them
    /// through.
    ///
    /// Default: false
    pub fn strict(mut self, enabled: bool) -> Self {
        self.config.strict = enabled;
        self
    }

    /// Write extension types without their namespace prefix.
    pub fn non_namespaced_extensions(mut self, enabled: bool) -> Self {
        self.config.non_namespaced_extensions = enabled;
        self
    }

    /// Set the transport.
    pub fn transport<T: Transport>(self, transport: T) -> Self {
        self.transport_arc(Arc::new(transport))
    }

    /// Set an already shared transport.
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Config`] if the endpoint is empty or no transport
    /// was set.
    pub fn build(self) -> Result<Client> {
        if self.endpoint.trim().is_empty() {
            return Err(RpcError::Config("endpoint must not be empty".to_string()));
        }
        let transport = self
            .transport
            .ok_or_else(|| RpcError::Config("no transport configured".to_string()))?;

        Ok(Client {
            endpoint: Arc::from(self.endpoint),
            config: Arc::new(self.config),
            transport,
        })
    }
}

/// One call inside a multicall batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticallRequest {
    pub method: String,
    pub params: Vec<HostValue>,
}

impl MulticallRequest {
    /// A request for `method` with no arguments yet.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, value: impl Into<HostValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Replace the arguments.
    pub fn with_params(mut self, params: Vec<HostValue>) -> Self {
        self.params = params;
        self
    }
}

/// RPC client.
///
/// Cheap to clone; clones share the endpoint, defaults and transport. The
/// defaults are never modified after [`ClientBuilder::build`].
#[derive(Clone)]
pub struct Client {
    endpoint: Arc<str>,
    config: Arc<CallConfig>,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Create a builder for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Default call settings.
    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Call `method` with `args` using the default settings.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Coercion`] if an argument or the reply has no mapping
    /// - [`RpcError::Fault`] if the server answered with a fault
    /// - [`RpcError::Transport`] on connectivity failure or reply timeout
    pub async fn call(&self, method: &str, args: &[HostValue]) -> Result<HostValue> {
        self.invoke(&self.config, method, args).await
    }

    /// Call `method` with `overrides` merged over the default settings for
    /// this call only.
    pub async fn call_with(
        &self,
        overrides: &CallOverrides,
        method: &str,
        args: &[HostValue],
    ) -> Result<HostValue> {
        let config = self.config.merged(overrides);
        self.invoke(&config, method, args).await
    }

    /// Start a call and return at once.
    ///
    /// The transport completes the returned [`PendingCall`] exactly once.
    /// Argument coercion happens before this returns, so coercion errors are
    /// reported here rather than through the pending call.
    pub fn call_async(&self, method: &str, args: &[HostValue]) -> Result<PendingCall> {
        let opts = self.config.coercion_options();
        let wire_args = to_wire_all(args, &opts)?;
        let (completion, pending) = pending::channel();

        let tag_method = method.to_string();
        let tag_args = wire_args.clone();
        Arc::clone(&self.transport).execute_async(
            self.endpoint.to_string(),
            CallConfig::clone(&self.config),
            method.to_string(),
            wire_args,
            Box::new(move |outcome| {
                let result = outcome
                    .map_err(|e| tag_fault(e, &tag_method, tag_args))
                    .and_then(|reply| to_host(reply, &opts));
                completion.complete(result);
            }),
        );

        Ok(pending)
    }

    /// Run a batch in one round trip, failing on the first faulted item.
    ///
    /// Results come back in request order. A fault is raised tagged with its
    /// batch index; items after it are not examined.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`call`](Client::call), returns
    /// [`RpcError::Protocol`] if the reply is not one entry per request, each
    /// a one-element array or a fault struct.
    pub async fn multicall(&self, requests: &[MulticallRequest]) -> Result<Vec<HostValue>> {
        let (items, wire_params) = self.run_multicall(requests).await?;
        let opts = self.config.coercion_options();

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match split_item(index, item)? {
                Ok(value) => results.push(to_host(value, &opts)?),
                Err(fault) => {
                    let args = wire_params[index].clone();
                    return Err(fault
                        .with_call(&requests[index].method, args)
                        .at_index(index)
                        .into());
                }
            }
        }
        Ok(results)
    }

    /// Run a batch in one round trip and return every item's outcome.
    pub async fn multicall_results(
        &self,
        requests: &[MulticallRequest],
    ) -> Result<Vec<std::result::Result<HostValue, Fault>>> {
        let (items, mut wire_params) = self.run_multicall(requests).await?;
        let opts = self.config.coercion_options();

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let outcome = match split_item(index, item)? {
                Ok(value) => Ok(to_host(value, &opts)?),
                Err(fault) => Err(fault
                    .with_call(&requests[index].method, std::mem::take(&mut wire_params[index]))
                    .at_index(index)),
            };
            results.push(outcome);
        }
        Ok(results)
    }

    /// Names of every method the server offers.
    pub async fn list_methods(&self) -> Result<Vec<String>> {
        let reply = self.call(LIST_METHODS, &[]).await?;
        string_list(reply)
            .ok_or_else(|| RpcError::Protocol(format!("{} did not return a list of names", LIST_METHODS)))
    }

    /// Help text of `method`.
    pub async fn method_help(&self, method: &str) -> Result<String> {
        match self.call(METHOD_HELP, &[HostValue::from(method)]).await? {
            HostValue::Str(help) => Ok(help),
            other => Err(RpcError::Protocol(format!(
                "{} returned {:?}",
                METHOD_HELP, other
            ))),
        }
    }

    /// Signatures of `method`: return type first, then parameter types.
    /// `None` when the server has none declared.
    pub async fn method_signature(&self, method: &str) -> Result<Option<Vec<Vec<String>>>> {
        let reply = self.call(METHOD_SIGNATURE, &[HostValue::from(method)]).await?;
        if reply.as_str() == Some(UNDEFINED_SIGNATURE) {
            return Ok(None);
        }

        let signatures = match reply {
            HostValue::Seq(items) => items.into_iter().map(string_list).collect::<Option<Vec<_>>>(),
            _ => None,
        };
        signatures.map(Some).ok_or_else(|| {
            RpcError::Protocol(format!("{} returned a malformed signature list", METHOD_SIGNATURE))
        })
    }

    async fn invoke(&self, config: &CallConfig, method: &str, args: &[HostValue]) -> Result<HostValue> {
        let opts = config.coercion_options();
        let wire_args = to_wire_all(args, &opts)?;
        let reply = self.execute(config, method, wire_args).await?;
        to_host(reply, &opts)
    }

    async fn execute(&self, config: &CallConfig, method: &str, wire_args: Vec<WireValue>) -> Result<WireValue> {
        tracing::debug!(endpoint = %self.endpoint, method, "call");

        let outcome = with_reply_timeout(
            config.reply_timeout,
            self.transport
                .execute(&self.endpoint, config, method, wire_args.clone()),
        )
        .await;

        outcome.map_err(|e| tag_fault(e, method, wire_args))
    }

    /// Send the batch, returning the raw reply items and each request's wire
    /// arguments.
    async fn run_multicall(
        &self,
        requests: &[MulticallRequest],
    ) -> Result<(Vec<WireValue>, Vec<Vec<WireValue>>)> {
        let opts = self.config.coercion_options();

        let mut wire_params = Vec::with_capacity(requests.len());
        let mut batch = Vec::with_capacity(requests.len());
        for request in requests {
            let params = to_wire_all(&request.params, &opts)?;
            batch.push(WireValue::structure([
                ("methodName", WireValue::from(request.method.as_str())),
                ("params", WireValue::Array(params.clone())),
            ]));
            wire_params.push(params);
        }

        let reply = self
            .execute(&self.config, MULTICALL, vec![WireValue::Array(batch)])
            .await?;

        let items = match reply {
            WireValue::Array(items) => items,
            other => {
                return Err(RpcError::Protocol(format!(
                    "multicall reply must be an array, got {}",
                    other.type_name()
                )))
            }
        };
        if items.len() != requests.len() {
            return Err(RpcError::Protocol(format!(
                "multicall sent {} calls but got {} results",
                requests.len(),
                items.len()
            )));
        }

        Ok((items, wire_params))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn tag_fault(err: RpcError, method: &str, wire_args: Vec<WireValue>) -> RpcError {
    match err {
        RpcError::Fault(fault) => fault.with_call(method, wire_args).into(),
        other => other,
    }
}

/// A multicall item is either `[value]` or a fault struct.
fn split_item(index: usize, item: WireValue) -> Result<std::result::Result<WireValue, Fault>> {
    if let Some(fault) = Fault::from_wire(&item) {
        return Ok(Err(fault));
    }
    match item {
        WireValue::Array(mut values) if values.len() == 1 => Ok(Ok(values.remove(0))),
        other => Err(RpcError::Protocol(format!(
            "multicall result {} is neither [value] nor a fault: {:?}",
            index, other
        ))),
    }
}

fn string_list(value: HostValue) -> Option<Vec<String>> {
    match value {
        HostValue::Seq(items) => items
            .into_iter()
            .map(|item| match item {
                HostValue::Str(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::handler::BoxFuture;
    use crate::params;

    /// Transport that records calls and answers from a closure.
    struct Scripted<F> {
        calls: Mutex<Vec<(String, CallConfig, Vec<WireValue>)>>,
        reply: F,
    }

    impl<F> Scripted<F>
    where
        F: Fn(&str, &[WireValue]) -> Result<WireValue> + Send + Sync + 'static,
    {
        fn new(reply: F) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    impl<F> Transport for Scripted<F>
    where
        F: Fn(&str, &[WireValue]) -> Result<WireValue> + Send + Sync + 'static,
    {
        fn execute<'a>(
            &'a self,
            _endpoint: &'a str,
            config: &'a CallConfig,
            method: &'a str,
            params: Vec<WireValue>,
        ) -> BoxFuture<'a, Result<WireValue>> {
            let reply = (self.reply)(method, &params);
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), config.clone(), params));
            Box::pin(async move { reply })
        }
    }

    fn client_for<F>(transport: Arc<Scripted<F>>) -> Client
    where
        F: Fn(&str, &[WireValue]) -> Result<WireValue> + Send + Sync + 'static,
    {
        Client::builder("local://127.0.0.1:1/RPC2")
            .transport_arc(transport)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_endpoint_and_transport() {
        assert!(matches!(
            Client::builder("").transport(crate::transport::LocalNetwork::new()).build(),
            Err(RpcError::Config(_))
        ));
        assert!(matches!(
            Client::builder("local://h:1").build(),
            Err(RpcError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_call_coerces_args_and_reply() {
        let transport = Scripted::new(|_, params| Ok(WireValue::Array(params.to_vec())));
        let client = client_for(Arc::clone(&transport));

        let reply = client.call("echo", &params![1, "two"]).await.unwrap();
        assert_eq!(
            reply,
            HostValue::Seq(vec![HostValue::Int(1), HostValue::from("two")])
        );

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].2, vec![WireValue::Int(1), WireValue::from("two")]);
    }

    #[tokio::test]
    async fn test_coercion_error_never_reaches_transport() {
        let transport = Scripted::new(|_, _| Ok(WireValue::Nil));
        let client = client_for(Arc::clone(&transport));

        let err = client.call("big", &params![1i64 << 40]).await.unwrap_err();
        assert!(matches!(err, RpcError::Coercion(_)));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fault_tagged_with_call() {
        let transport = Scripted::new(|_, _| Err(Fault::new(4, "too many parameters").into()));
        let client = client_for(transport);

        let err = client.call("m", &params![1]).await.unwrap_err();
        let fault = err.as_fault().unwrap();
        assert_eq!(fault.code, 4);
        assert_eq!(fault.method.as_deref(), Some("m"));
        assert_eq!(fault.args, vec![WireValue::Int(1)]);
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let transport = Scripted::new(|_, _| Err(TransportError::connect("refused").into()));
        let client = client_for(transport);

        let err = client.call("m", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(ref e) if e.kind == TransportErrorKind::Connect));
    }

    #[tokio::test]
    async fn test_call_with_overrides_only_that_call() {
        let transport = Scripted::new(|_, _| Ok(WireValue::Nil));
        let client = client_for(Arc::clone(&transport));

        let overrides = CallOverrides::new().user_agent("probe/1").extensions(true);
        client
            .call_with(&overrides, "m", &params![1i64 << 40])
            .await
            .unwrap();
        client.call("m", &[]).await.unwrap();

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1.user_agent, "probe/1");
        assert_eq!(calls[0].2, vec![WireValue::I8(1 << 40)]);
        assert_ne!(calls[1].1.user_agent, "probe/1");
        assert!(!client.config().extensions);
    }

    #[tokio::test]
    async fn test_call_async_completes_once() {
        let transport = Scripted::new(|_, _| Ok(WireValue::from("done")));
        let client = client_for(transport);

        let pending = client.call_async("m", &[]).unwrap();
        assert_eq!(pending.wait().await.unwrap(), HostValue::from("done"));
        assert!(pending.is_complete());
    }

    #[test]
    fn test_call_async_without_runtime_fails_instead_of_panicking() {
        let transport = Scripted::new(|_, _| Ok(WireValue::from("done")));
        let client = client_for(transport);

        let pending = client.call_async("m", &[]).unwrap();
        assert!(pending.is_complete());
        match pending.try_result() {
            Some(Err(RpcError::Transport(e))) => {
                assert_eq!(e.kind, TransportErrorKind::Closed)
            }
            other => panic!("expected closed transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_async_reports_coercion_error_immediately() {
        let transport = Scripted::new(|_, _| Ok(WireValue::Nil));
        let client = client_for(transport);

        assert!(matches!(
            client.call_async("m", &params![i64::MAX]),
            Err(RpcError::Coercion(_))
        ));
    }

    fn batch_reply(
        items: Vec<WireValue>,
    ) -> impl Fn(&str, &[WireValue]) -> Result<WireValue> + Send + Sync + 'static {
        move |method: &str, _: &[WireValue]| {
            assert_eq!(method, MULTICALL);
            Ok(WireValue::Array(items.clone()))
        }
    }

    #[tokio::test]
    async fn test_multicall_request_shape() {
        let transport = Scripted::new(batch_reply(vec![
            WireValue::Array(vec![WireValue::Int(3)]),
            WireValue::Array(vec![WireValue::Int(7)]),
        ]));
        let client = client_for(Arc::clone(&transport));

        let results = client
            .multicall(&[
                MulticallRequest::new("math.add").arg(1).arg(2),
                MulticallRequest::new("math.sub").with_params(params![10, 3]),
            ])
            .await
            .unwrap();
        assert_eq!(results, vec![HostValue::Int(3), HostValue::Int(7)]);

        let calls = transport.calls.lock().unwrap();
        let sent = calls[0].2[0].as_array().unwrap();
        assert_eq!(
            sent[0],
            WireValue::structure([
                ("methodName", WireValue::from("math.add")),
                ("params", WireValue::Array(vec![WireValue::Int(1), WireValue::Int(2)])),
            ])
        );
    }

    #[tokio::test]
    async fn test_multicall_fails_fast_on_fault() {
        let transport = Scripted::new(batch_reply(vec![
            WireValue::Array(vec![WireValue::Int(1)]),
            Fault::new(9, "bad item").to_wire(),
            WireValue::Int(42),
        ]));
        let client = client_for(transport);

        let requests = [
            MulticallRequest::new("a"),
            MulticallRequest::new("b").arg("x"),
            MulticallRequest::new("c"),
        ];
        let err = client.multicall(&requests).await.unwrap_err();

        // The malformed third item is never looked at
        let fault = err.as_fault().unwrap();
        assert_eq!(fault.code, 9);
        assert_eq!(fault.index, Some(1));
        assert_eq!(fault.method.as_deref(), Some("b"));
        assert_eq!(fault.args, vec![WireValue::from("x")]);
    }

    #[tokio::test]
    async fn test_multicall_results_keeps_every_item() {
        let transport = Scripted::new(batch_reply(vec![
            WireValue::Array(vec![WireValue::Int(1)]),
            Fault::new(9, "bad item").to_wire(),
            WireValue::Array(vec![WireValue::Int(3)]),
        ]));
        let client = client_for(transport);

        let requests = [
            MulticallRequest::new("a"),
            MulticallRequest::new("b"),
            MulticallRequest::new("c"),
        ];
        let results = client.multicall_results(&requests).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(HostValue::Int(1)));
        assert_eq!(results[1].as_ref().unwrap_err().index, Some(1));
        assert_eq!(results[2], Ok(HostValue::Int(3)));
    }

    #[tokio::test]
    async fn test_multicall_malformed_item_is_protocol_error() {
        let transport = Scripted::new(batch_reply(vec![WireValue::Int(5)]));
        let client = client_for(transport);

        let err = client
            .multicall(&[MulticallRequest::new("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_multicall_length_mismatch() {
        let transport = Scripted::new(batch_reply(vec![]));
        let client = client_for(transport);

        let err = client
            .multicall(&[MulticallRequest::new("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_method_signature_undefined() {
        let transport = Scripted::new(|_, _| Ok(WireValue::from(UNDEFINED_SIGNATURE)));
        let client = client_for(transport);

        assert_eq!(client.method_signature("m").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout() {
        struct Never;
        impl Transport for Never {
            fn execute<'a>(
                &'a self,
                _endpoint: &'a str,
                _config: &'a CallConfig,
                _method: &'a str,
                _params: Vec<WireValue>,
            ) -> BoxFuture<'a, Result<WireValue>> {
                Box::pin(std::future::pending())
            }
        }

        let client = Client::builder("local://h:1")
            .transport(Never)
            .reply_timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let err = client.call("slow", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(ref e) if e.is_timeout()));
    }
}
