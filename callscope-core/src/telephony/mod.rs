//! Telephony provider API integration.
//!
//! Four concerns, layered leaf-first:
//! - [`client`]: thin HTTP wrapper over the provider's REST API
//! - [`agents`]: agent discovery with response-shape normalization
//! - [`calls`]: call-log fetching (even-distribution and single-sweep)
//! - [`recordings`]: best-effort recording URL resolution
//!
//! [`source::TelephonySource`] is the seam the orchestrators depend on;
//! [`source::TelephonyApi`] is the production implementation.

pub mod agents;
pub mod calls;
pub mod client;
pub mod recordings;
pub mod source;

pub use client::TelephonyClient;
pub use source::{TelephonyApi, TelephonySource};
