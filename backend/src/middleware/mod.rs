//! Request middleware.
//!
//! Purpose: attach a request-scoped trace identifier to every request so log
//! lines, error envelopes and fan-out tasks can be correlated.

pub mod trace;

pub use trace::Trace;
