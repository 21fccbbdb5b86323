//! # wirecall
//!
//! Convenience layer over an XML-RPC-style protocol: value coercion, a call
//! client and a hot-reloadable handler registry.
//!
//! Byte-level encoding and sockets belong to a [`Transport`](transport::Transport)
//! and [`Listener`](transport::Listener); this crate supplies the layer
//! above them.
//!
//! ## Architecture
//!
//! - **Values**: [`HostValue`] (what callers and handlers use) and
//!   [`WireValue`] (what the protocol carries), with a coercion engine
//!   between them
//! - **Client**: [`Client`] calls, per-call overrides, async calls and
//!   multicall batches
//! - **Server**: [`Server`] builds a live [`HandlerRegistry`](handler::HandlerRegistry)
//!   that can be swapped while calls are in flight, plus `system.*`
//!   introspection and multicall
//!
//! ## Example
//!
//! ```
//! use wirecall::handler::HandlerEntry;
//! use wirecall::transport::LocalNetwork;
//! use wirecall::{params, Client, HostValue, MulticallRequest, Server};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let network = LocalNetwork::new();
//!
//! let server = Server::builder()
//!     .port(8080)
//!     .handle(
//!         "math.add",
//!         HandlerEntry::from_sync(|p| {
//!             Ok(HostValue::from(i64::try_from(p[0].clone())? + i64::try_from(p[1].clone())?))
//!         })
//!         .doc("Add two integers."),
//!     )
//!     .start(&network)
//!     .await
//!     .unwrap();
//!
//! let client = Client::builder(server.endpoint())
//!     .transport(network.clone())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(client.call("math.add", &params![2, 3]).await.unwrap(), HostValue::Int(5));
//!
//! let sums = client
//!     .multicall(&[
//!         MulticallRequest::new("math.add").arg(1).arg(2),
//!         MulticallRequest::new("math.add").arg(3).arg(4),
//!     ])
//!     .await
//!     .unwrap();
//! assert_eq!(sums, vec![HostValue::Int(3), HostValue::Int(7)]);
//! # });
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod pending;
pub mod server;
pub mod transport;
pub mod value;

pub use client::{Client, ClientBuilder, MulticallRequest};
pub use config::{CallConfig, CallOverrides};
pub use error::{Fault, Result, RpcError, TransportError, TransportErrorKind};
pub use pending::PendingCall;
pub use server::{Server, ServerBuilder, ServerHandle, ServerSettings};
pub use value::{HostValue, WireValue};
