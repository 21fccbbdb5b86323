//! Handler trait and the entries stored in the registry.

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::value::HostValue;

/// Result type for handler functions.
pub type HandlerResult = Result<HostValue>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Mapping from method name to handler entry.
pub type HandlerMap = BTreeMap<String, HandlerEntry>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a call with its (already coerced) parameters.
    fn call(&self, params: Vec<HostValue>) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper turning an async closure into a [`Handler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(Vec<HostValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Vec<HostValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new async handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Vec<HostValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, params: Vec<HostValue>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(params))
    }
}

/// Wrapper turning a synchronous closure into a [`Handler`].
pub struct SyncHandler<F>
where
    F: Fn(Vec<HostValue>) -> HandlerResult + Send + Sync + 'static,
{
    handler: F,
}

impl<F> SyncHandler<F>
where
    F: Fn(Vec<HostValue>) -> HandlerResult + Send + Sync + 'static,
{
    /// Create a new synchronous handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> Handler for SyncHandler<F>
where
    F: Fn(Vec<HostValue>) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, params: Vec<HostValue>) -> BoxFuture<'static, HandlerResult> {
        let result = (self.handler)(params);
        Box::pin(async move { result })
    }
}

/// A registered method: the handler plus its introspection metadata.
///
/// # Example
///
/// ```
/// use wirecall::handler::HandlerEntry;
///
/// let entry = HandlerEntry::from_sync(|params| {
///     let a = i64::try_from(params[0].clone())?;
///     let b = i64::try_from(params[1].clone())?;
///     Ok((a + b).into())
/// })
/// .doc("Add two integers.")
/// .signature(["int", "int", "int"]);
///
/// assert_eq!(entry.help(), "Add two integers.");
/// ```
#[derive(Clone)]
pub struct HandlerEntry {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) doc: Option<String>,
    pub(crate) signatures: Option<Vec<Vec<String>>>,
    pub(crate) raw_args: bool,
}

impl HandlerEntry {
    /// Entry for an existing handler, without metadata.
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            doc: None,
            signatures: None,
            raw_args: false,
        }
    }

    /// Entry for an async closure.
    pub fn from_fn<F, Fut>(handler: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::new(Arc::new(FnHandler::new(handler)))
    }

    /// Entry for a synchronous closure.
    pub fn from_sync<F>(handler: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(Arc::new(SyncHandler::new(handler)))
    }

    /// Attach a help text.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Add a signature: return type first, then parameter types.
    ///
    /// May be called more than once for overloaded methods.
    pub fn signature<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signatures
            .get_or_insert_with(Vec::new)
            .push(types.into_iter().map(Into::into).collect());
        self
    }

    /// Always receive arguments as [`HostValue::Raw`], whatever the
    /// server's argument coercion setting.
    pub fn raw_args(mut self) -> Self {
        self.raw_args = true;
        self
    }

    /// Returns true if the handler receives raw wire arguments.
    pub fn takes_raw_args(&self) -> bool {
        self.raw_args
    }

    /// The handler.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Help text, or the empty string.
    pub fn help(&self) -> &str {
        self.doc.as_deref().unwrap_or("")
    }

    /// Declared signatures, if any.
    pub fn signatures(&self) -> Option<&[Vec<String>]> {
        self.signatures.as_deref()
    }
}

impl From<Arc<dyn Handler>> for HandlerEntry {
    fn from(handler: Arc<dyn Handler>) -> Self {
        Self::new(handler)
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("doc", &self.doc)
            .field("signatures", &self.signatures)
            .field("raw_args", &self.raw_args)
            .finish_non_exhaustive()
    }
}
