//! Server builder and running-server handle.
//!
//! The [`ServerBuilder`] collects settings and the initial handler map, then
//! [`start`](ServerBuilder::start)s a listener. The returned
//! [`ServerHandle`] owns the live registry:
//! 1. Validate the settings (port present, at least one handler)
//! 2. Wrap handlers in the configured middleware
//! 3. Build the registry, adding `system.*` handlers when enabled
//! 4. Hand a [`Dispatcher`] to the listener
//!
//! # Example
//!
//! ```
//! use wirecall::handler::{HandlerEntry, HandlerMap, UpdateMode};
//! use wirecall::transport::LocalNetwork;
//! use wirecall::{HostValue, Server};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let network = LocalNetwork::new();
//! let server = Server::builder()
//!     .port(8080)
//!     .handle("ping", HandlerEntry::from_sync(|_| Ok(HostValue::from("pong"))))
//!     .start(&network)
//!     .await
//!     .unwrap();
//!
//! let mut extra = HandlerMap::new();
//! extra.insert("echo".to_string(), HandlerEntry::from_sync(|mut p| Ok(p.remove(0))));
//! server.update_handlers(extra, UpdateMode::Merge);
//! assert!(server.registry().contains("echo"));
//!
//! server.shutdown().await.unwrap();
//! # });
//! ```

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Result, RpcError};
use crate::handler::{
    compose_middleware, DispatchOptions, Dispatcher, HandlerEntry, HandlerMap, HandlerRegistry,
    Middleware, UpdateMode,
};
use crate::transport::{Listener, Listening};

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Server settings.
///
/// Deserializes from JSON; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port to listen on. Required; 0 lets the listener pick one.
    pub port: Option<u16>,
    /// Address to bind.
    pub bind_address: String,
    /// Serve the built-in `system.*` methods.
    pub system_handlers: bool,
    /// Allow extension wire types in results.
    pub extensions: bool,
    /// Reject opaque extension values during coercion.
    pub strict: bool,
    /// Coerce wire arguments to host values before calling handlers.
    pub coerce_args: bool,
    /// Coerce handler results to wire values.
    pub coerce_result: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            system_handlers: true,
            extensions: false,
            strict: false,
            coerce_args: true,
            coerce_result: true,
        }
    }
}

impl ServerSettings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Dispatch options implied by these settings.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            extensions: self.extensions,
            strict: self.strict,
            coerce_args: self.coerce_args,
            coerce_result: self.coerce_result,
        }
    }
}

/// Entry point for building a server.
pub struct Server;

impl Server {
    /// Create a server builder with default settings.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

/// Builder for configuring and starting a server.
#[derive(Default)]
pub struct ServerBuilder {
    settings: ServerSettings,
    handlers: HandlerMap,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ServerBuilder {
    /// Create a builder with default settings and no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all settings at once.
    pub fn settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Port to listen on.
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = Some(port);
        self
    }

    /// Address to bind.
    ///
    /// Default: `0.0.0.0`
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.settings.bind_address = address.into();
        self
    }

    /// Serve the built-in `system.*` methods.
    ///
    /// Default: true
    pub fn system_handlers(mut self, enabled: bool) -> Self {
        self.settings.system_handlers = enabled;
        self
    }

    /// Allow extension wire types.
    ///
    /// Default: false
    pub fn extensions(mut self, enabled: bool) -> Self {
        self.settings.extensions = enabled;
        self
    }

    /// Reject opaque extension values during coercion.
    ///
    /// Default: false
    pub fn strict(mut self, enabled: bool) -> Self {
        self.settings.strict = enabled;
        self
    }

    /// Coerce wire arguments before calling handlers.
    ///
    /// Default: true
    pub fn coerce_args(mut self, enabled: bool) -> Self {
        self.settings.coerce_args = enabled;
        self
    }

    /// Coerce handler results to wire values.
    ///
    /// Default: true
    pub fn coerce_result(mut self, enabled: bool) -> Self {
        self.settings.coerce_result = enabled;
        self
    }

    /// Register one method.
    pub fn handle(mut self, method: impl Into<String>, entry: HandlerEntry) -> Self {
        self.handlers.insert(method.into(), entry);
        self
    }

    /// Register several methods.
    pub fn handlers(mut self, handlers: HandlerMap) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Add a middleware. The first one added is the outermost.
    ///
    /// Middleware also wraps handlers installed later through
    /// [`ServerHandle::update_handlers`].
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Build the registry and start listening.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Config`] if no port is set or no handler is registered
    /// - whatever the listener reports when it cannot bind
    pub async fn start<L: Listener + ?Sized>(self, listener: &L) -> Result<ServerHandle> {
        let port = self
            .settings
            .port
            .ok_or_else(|| RpcError::Config("server port is required".to_string()))?;
        if self.handlers.is_empty() {
            return Err(RpcError::Config(
                "server needs at least one handler".to_string(),
            ));
        }

        let options = self.settings.dispatch_options();
        let handlers = compose_middleware(self.handlers, &self.middleware);
        let registry = if self.settings.system_handlers {
            HandlerRegistry::with_system_handlers(handlers, options)
        } else {
            HandlerRegistry::new(handlers)
        };
        let dispatcher = Dispatcher::new(registry.clone(), options);

        let listening = listener
            .listen(&self.settings.bind_address, port, dispatcher.clone())
            .await?;

        tracing::info!(
            endpoint = %listening.endpoint(),
            methods = registry.len(),
            system_handlers = self.settings.system_handlers,
            "server started"
        );

        Ok(ServerHandle {
            registry,
            dispatcher,
            listening,
            middleware: self.middleware,
        })
    }
}

/// A running server.
pub struct ServerHandle {
    registry: HandlerRegistry,
    dispatcher: Dispatcher,
    listening: Box<dyn Listening>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ServerHandle {
    /// Endpoint clients should call.
    pub fn endpoint(&self) -> String {
        self.listening.endpoint()
    }

    /// The live registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The dispatcher serving this server's requests.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Hot-reload handlers. Calls already running keep the handlers they
    /// started with.
    pub fn update_handlers(&self, handlers: HandlerMap, mode: UpdateMode) {
        let handlers = compose_middleware(handlers, &self.middleware);
        self.registry.update(handlers, mode);
    }

    /// Remove one method. Returns true if it was registered.
    pub fn remove_handler(&self, method: &str) -> bool {
        self.registry.remove(method)
    }

    /// Stop listening.
    pub async fn shutdown(self) -> Result<()> {
        let endpoint = self.listening.endpoint();
        self.listening.shutdown().await?;
        tracing::info!(endpoint = %endpoint, "server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("endpoint", &self.listening.endpoint())
            .field("methods", &self.registry.names())
            .finish_non_exhaustive()
    }
}
