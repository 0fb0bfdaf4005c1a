//! Domain layer - Port definitions
//!
//! This module defines the traits (ports) that the data source and the peer
//! transport implement, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
