//! Client core for the CASTV2 protocol spoken by cast receivers.
//!
//! One TCP (or TLS) stream carries length-prefixed protobuf envelopes for many
//! namespaces at once. castwire splits that stream into independent logical
//! channels, correlates requests with their replies and watches peer liveness.
//!
//! # Crate Structure
//!
//! - [`frame`]: length-prefixed envelope codec and async frame reader/writer
//! - [`mux`]: connection, channels, request correlation and heartbeat
//! - [`ctrl`]: connection, receiver and media controllers (behind `ctrl`)

/// Re-export frame types.
pub mod frame {
    pub use castwire_frame::*;
}

/// Re-export mux types.
pub mod mux {
    pub use castwire_mux::*;
}

/// Re-export controller types (requires `ctrl` feature).
#[cfg(feature = "ctrl")]
pub mod ctrl {
    pub use castwire_ctrl::*;
}
