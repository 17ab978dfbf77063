//! Protobuf definitions for the Signal wire messages.

pub mod signal;
