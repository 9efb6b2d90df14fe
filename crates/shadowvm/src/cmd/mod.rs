//! Command implementations for the ShadowVM CLI

pub mod demo;
pub mod serve;
