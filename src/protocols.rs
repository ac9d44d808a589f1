//! Binary network interfaces.
//!
//! All multi-byte values are big-endian. The controls and FDM data interfaces
//! are UDP; telemetry is a TCP stream of length-prefixed `postcard` frames.
//! Every server runs until its cancellation token fires and logs, rather than
//! returns, errors caused by a single malformed datagram or client.

pub mod controls;
pub mod fdm_data;
pub mod telemetry;

/// Largest datagram any interface expects to receive.
const MAX_DATAGRAM_SIZE: usize = 512;
