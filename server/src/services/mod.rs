//! External collaborators: wallet, proof service and verifier contract

pub mod contract;
pub mod proof;
pub mod reclaim;
pub mod wallet;
pub mod wallet_http;
