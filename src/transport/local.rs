//! In-process transport.
//!
//! [`LocalNetwork`] is both a [`Transport`] and a [`Listener`]. Listeners
//! register a dispatcher under a port; clients reach it through an endpoint
//! of the form `local://host:port/path`, routed by port alone. Requests and
//! replies are MsgPack-encoded on the way through, so values that cannot
//! cross a real wire fail here too.
//!
//! # Example
//!
//! ```
//! use wirecall::transport::{LocalNetwork, Listener, Transport};
//! use wirecall::handler::{DispatchOptions, Dispatcher, HandlerEntry, HandlerMap, HandlerRegistry};
//! use wirecall::config::CallConfig;
//! use wirecall::{HostValue, WireValue};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let mut handlers = HandlerMap::new();
//! handlers.insert("ping".to_string(), HandlerEntry::from_sync(|_| Ok(HostValue::from("pong"))));
//! let dispatcher = Dispatcher::new(HandlerRegistry::new(handlers), DispatchOptions::default());
//!
//! let network = LocalNetwork::new();
//! let listening = network.listen("0.0.0.0", 0, dispatcher).await.unwrap();
//!
//! let reply = network
//!     .execute(&listening.endpoint(), &CallConfig::default(), "ping", vec![])
//!     .await
//!     .unwrap();
//! assert_eq!(reply, WireValue::from("pong"));
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{Listener, Listening, Transport};
use crate::codec::MsgPackCodec;
use crate::config::CallConfig;
use crate::error::{Fault, Result, TransportError, TransportErrorKind};
use crate::handler::{BoxFuture, Dispatcher};
use crate::value::WireValue;

/// Scheme prefix of local endpoints.
pub const LOCAL_SCHEME: &str = "local://";

/// First port handed out when a listener asks for port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

/// Path used in endpoints built by [`LocalNetwork::endpoint`].
const DEFAULT_PATH: &str = "/RPC2";

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    method: String,
    params: Vec<WireValue>,
}

#[derive(Debug, Serialize, Deserialize)]
enum Response {
    Value(WireValue),
    Fault { code: i32, message: String },
}

impl From<Fault> for Response {
    fn from(fault: Fault) -> Self {
        Response::Fault {
            code: fault.code,
            message: fault.message,
        }
    }
}

/// An in-process network of listeners, shared by cloning.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    routes: Arc<Mutex<HashMap<u16, Dispatcher>>>,
}

impl LocalNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint for `port` on the loopback host.
    pub fn endpoint(port: u16) -> String {
        format!("{}127.0.0.1:{}{}", LOCAL_SCHEME, port, DEFAULT_PATH)
    }

    /// Returns true if a listener is bound to `port`.
    pub fn is_bound(&self, port: u16) -> bool {
        self.routes().contains_key(&port)
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<u16, Dispatcher>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn route(&self, port: u16) -> Option<Dispatcher> {
        self.routes().get(&port).cloned()
    }

    fn bind(&self, port: u16, dispatcher: Dispatcher) -> Result<u16> {
        let mut routes = self.routes();

        let port = if port == 0 {
            (EPHEMERAL_PORT_START..=u16::MAX)
                .find(|p| !routes.contains_key(p))
                .ok_or_else(|| {
                    TransportError::new(TransportErrorKind::Other, "no free local port")
                })?
        } else if routes.contains_key(&port) {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!("port {} already in use", port),
            )
            .into());
        } else {
            port
        };

        routes.insert(port, dispatcher);
        Ok(port)
    }

    fn unbind(&self, port: u16) {
        self.routes().remove(&port);
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ports: Vec<u16> = self.routes().keys().copied().collect();
        ports.sort_unstable();
        f.debug_struct("LocalNetwork").field("ports", &ports).finish()
    }
}

/// Port of a `local://host:port/path` endpoint.
fn parse_port(endpoint: &str) -> Result<u16> {
    let rest = endpoint.strip_prefix(LOCAL_SCHEME).ok_or_else(|| {
        TransportError::connect(format!("unsupported endpoint: {}", endpoint))
    })?;
    let authority = rest.split('/').next().unwrap_or(rest);

    authority
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .ok_or_else(|| TransportError::connect(format!("endpoint has no port: {}", endpoint)).into())
}

/// Handle one encoded request, producing the encoded reply.
async fn serve(dispatcher: &Dispatcher, frame: &[u8]) -> Result<Vec<u8>> {
    let response = match MsgPackCodec::decode::<Request>(frame) {
        Ok(request) => match dispatcher.dispatch(&request.method, request.params).await {
            Ok(value) => Response::Value(value),
            Err(e) => e.into_fault().into(),
        },
        Err(e) => e.into_fault().into(),
    };

    match MsgPackCodec::encode(&response) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            tracing::warn!("reply could not be encoded: {}", e);
            MsgPackCodec::encode(&Response::from(e.into_fault()))
        }
    }
}

impl Transport for LocalNetwork {
    fn execute<'a>(
        &'a self,
        endpoint: &'a str,
        config: &'a CallConfig,
        method: &'a str,
        params: Vec<WireValue>,
    ) -> BoxFuture<'a, Result<WireValue>> {
        Box::pin(async move {
            let port = parse_port(endpoint)?;
            let dispatcher = self.route(port).ok_or_else(|| {
                TransportError::connect(format!("connection refused: {}", endpoint))
            })?;

            tracing::trace!(
                endpoint,
                method,
                user_agent = %config.user_agent,
                "local request"
            );

            let frame = MsgPackCodec::encode(&Request {
                method: method.to_string(),
                params,
            })?;
            let reply = serve(&dispatcher, &frame).await?;

            match MsgPackCodec::decode::<Response>(&reply)? {
                Response::Value(value) => Ok(value),
                Response::Fault { code, message } => Err(Fault::new(code, message).into()),
            }
        })
    }
}

impl Listener for LocalNetwork {
    fn listen<'a>(
        &'a self,
        bind: &'a str,
        port: u16,
        dispatcher: Dispatcher,
    ) -> BoxFuture<'a, Result<Box<dyn Listening>>> {
        Box::pin(async move {
            let port = self.bind(port, dispatcher)?;
            let host = match bind {
                "" | "0.0.0.0" => "127.0.0.1",
                other => other,
            };
            tracing::debug!(bind, port, "local listener bound");

            Ok(Box::new(LocalListening {
                network: self.clone(),
                endpoint: format!("{}{}:{}{}", LOCAL_SCHEME, host, port, DEFAULT_PATH),
                port,
            }) as Box<dyn Listening>)
        })
    }
}

/// A bound local listener.
#[derive(Debug)]
pub struct LocalListening {
    network: LocalNetwork,
    endpoint: String,
    port: u16,
}

impl LocalListening {
    /// Bound port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Listening for LocalListening {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn shutdown(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        self.network.unbind(self.port);
        tracing::debug!(port = self.port, "local listener closed");
        Box::pin(async { Ok(()) })
    }
}
