//! Handler module - server-side method table and dispatch.
//!
//! Provides:
//! - [`HandlerEntry`] - a handler plus its help text and signatures
//! - [`HandlerRegistry`] - the live, hot-swappable method map
//! - [`Dispatcher`] - routes one request to its handler
//! - [`compose_middleware`] - wraps every handler of a map
//! - the built-in `system.*` methods
//!
//! # Example
//!
//! ```
//! use wirecall::handler::{DispatchOptions, Dispatcher, HandlerEntry, HandlerMap, HandlerRegistry};
//! use wirecall::{HostValue, WireValue};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let mut handlers = HandlerMap::new();
//! handlers.insert(
//!     "greet".to_string(),
//!     HandlerEntry::from_sync(|params| {
//!         let name = String::try_from(params[0].clone())?;
//!         Ok(HostValue::from(format!("hello, {}", name)))
//!     }),
//! );
//!
//! let options = DispatchOptions::default();
//! let dispatcher = Dispatcher::new(HandlerRegistry::with_system_handlers(handlers, options), options);
//!
//! let reply = dispatcher.dispatch("greet", vec![WireValue::from("ada")]).await.unwrap();
//! assert_eq!(reply, WireValue::from("hello, ada"));
//! # });
//! ```

mod dispatch;
mod entry;
mod middleware;
mod registry;
mod system;

pub use dispatch::{DispatchOptions, Dispatcher};
pub use entry::{BoxFuture, FnHandler, Handler, HandlerEntry, HandlerMap, HandlerResult, SyncHandler};
pub use middleware::{compose_middleware, LogCalls, LogErrors, Middleware, TimeCalls};
pub use registry::{HandlerRegistry, UpdateMode};
pub use system::{LIST_METHODS, METHOD_HELP, METHOD_SIGNATURE, MULTICALL, UNDEFINED_SIGNATURE};
