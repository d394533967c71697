//! Probe module.
//!
//! This module provides the individual network checks:
//! - DNS record lookup
//! - ICMP latency sampling
//! - Throughput measurement
//! - IP geolocation
//! - Public/local address discovery
//! - Core request/result types

pub mod address;
pub mod dns;
pub mod geo;
pub mod latency;
pub mod throughput;
pub mod types;

pub use address::AddressProbe;
pub use dns::DnsProbe;
pub use geo::GeoProbe;
pub use latency::{EchoFacility, IcmpEcho, LatencyProbe};
pub use throughput::{BackendFactory, HttpSpeedBackend, SpeedBackend, SpeedServer, ThroughputProbe};
pub use types::*;
