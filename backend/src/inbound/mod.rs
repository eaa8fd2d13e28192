//! Inbound adapters that translate external requests into domain service
//! calls while keeping framework details at the edge.
//!
//! HTTP handlers live under [`http`]; the datadump worker binary drives the
//! domain directly from the job queue.

pub mod http;
