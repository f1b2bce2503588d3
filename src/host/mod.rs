//! Host shell integration: the JSON line contract, the adapters that turn
//! assistant activity into host events, and the stdio bridge runner.

pub mod adapters;
pub mod contract;
pub mod stdio;
