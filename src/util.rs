//! Utility modules for Quiver.

pub mod varint;
