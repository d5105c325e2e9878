//! Windowgate - Dual-Window Admission Control
//!
//! This crate decides, per client, whether an incoming HTTP request may
//! proceed. Each client gets a short burst window and a long sustained-rate
//! window; a request is admitted only while both have room, and rejected
//! requests are never counted.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
