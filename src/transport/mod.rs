//! Transport module - the seam between the call core and the network.
//!
//! The core never opens sockets or writes bytes. A [`Transport`] carries a
//! method name and wire arguments to an endpoint and hands back the wire
//! reply; a [`Listener`] accepts requests and feeds them to a
//! [`Dispatcher`]. [`LocalNetwork`] implements both in-process.

mod local;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CallConfig;
use crate::error::{Result, TransportError};
use crate::handler::{BoxFuture, Dispatcher};
use crate::value::WireValue;

pub use local::{LocalListening, LocalNetwork, LOCAL_SCHEME};

/// Callback receiving the outcome of [`Transport::execute_async`].
pub type OnComplete = Box<dyn FnOnce(Result<WireValue>) + Send + 'static>;

/// Client side of a transport.
pub trait Transport: Send + Sync + 'static {
    /// Send one call and wait for the reply.
    ///
    /// A wire fault in the reply is returned as
    /// [`RpcError::Fault`](crate::RpcError::Fault); connectivity failures as
    /// [`RpcError::Transport`](crate::RpcError::Transport).
    fn execute<'a>(
        &'a self,
        endpoint: &'a str,
        config: &'a CallConfig,
        method: &'a str,
        params: Vec<WireValue>,
    ) -> BoxFuture<'a, Result<WireValue>>;

    /// Send one call without waiting. `on_complete` runs exactly once, on a
    /// task owned by the transport.
    ///
    /// The default spawns [`execute`](Transport::execute) on the current
    /// tokio runtime and enforces `config.reply_timeout`. Without a runtime
    /// the call completes at once with a `Closed` transport error.
    fn execute_async(
        self: Arc<Self>,
        endpoint: String,
        config: CallConfig,
        method: String,
        params: Vec<WireValue>,
        on_complete: OnComplete,
    ) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(method = %method, "no tokio runtime for async call: {}", e);
                on_complete(Err(TransportError::closed(format!(
                    "cannot run {} without a tokio runtime: {}",
                    method, e
                ))
                .into()));
                return;
            }
        };

        runtime.spawn(async move {
            let outcome = with_reply_timeout(
                config.reply_timeout,
                self.execute(&endpoint, &config, &method, params),
            )
            .await;
            on_complete(outcome);
        });
    }
}

/// Await `fut`, failing with a timeout error once `timeout` has passed.
///
/// The future is dropped on expiry; nothing is sent to cancel the call on
/// the remote side.
pub async fn with_reply_timeout<F>(timeout: Option<Duration>, fut: F) -> Result<WireValue>
where
    F: Future<Output = Result<WireValue>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::timeout(format!("no reply within {:?}", limit)).into()),
        },
    }
}

/// Server side of a transport.
pub trait Listener: Send + Sync {
    /// Start accepting requests on `bind:port`, dispatching each through
    /// `dispatcher`. Port 0 picks a free port.
    fn listen<'a>(
        &'a self,
        bind: &'a str,
        port: u16,
        dispatcher: Dispatcher,
    ) -> BoxFuture<'a, Result<Box<dyn Listening>>>;
}

/// A listener that is accepting requests.
pub trait Listening: Send + Sync {
    /// Endpoint clients should call.
    fn endpoint(&self) -> String;

    /// Stop accepting requests.
    fn shutdown(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}
