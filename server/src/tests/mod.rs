//! Shared fixtures and end-to-end scenarios across wallet, pipeline and contract

pub mod common;
