//! Value model - wire values, host values and the coercion between them.
//!
//! - [`WireValue`] - the small, strictly-typed value model of the RPC protocol
//! - [`HostValue`] - the dynamic value model handlers and callers work with
//! - [`to_wire`] / [`to_host`] - the coercion engine
//!
//! # Example
//!
//! ```
//! use wirecall::value::{to_host, to_wire, CoercionOptions, HostValue, WireValue};
//!
//! let opts = CoercionOptions::default();
//! let wire = to_wire(&HostValue::from(2_147_483_647i64), &opts).unwrap();
//! assert_eq!(wire, WireValue::Int(i32::MAX));
//!
//! // 2^31 needs the i8 extension type
//! assert!(to_wire(&HostValue::from(2_147_483_648i64), &opts).is_err());
//!
//! let back = to_host(wire, &opts).unwrap();
//! assert_eq!(back, HostValue::Int(2_147_483_647));
//! ```

mod coerce;
mod host;
mod wire;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use coerce::{to_host, to_host_all, to_wire, to_wire_all, CoercionOptions};
pub use host::{Decimal, HostKey, HostValue, Keyword};
pub use wire::WireValue;

/// Opaque value passed through the coercion engine untouched.
///
/// This is the extension escape hatch: values the engine has no mapping for
/// travel as `Opaque` in both value models. A transport either knows how to
/// encode the payload or rejects it.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    /// Wrap any shareable value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the payload as `T` if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if the payload has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}
