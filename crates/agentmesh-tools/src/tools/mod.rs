//! Individual tool implementations.
//!
//! Each tool is a self-contained module implementing the Tool trait. These
//! six filesystem/shell tools are reference implementations of the contract
//! in `registry.rs`, not part of the delegation core itself.

pub mod bash;
pub mod edit;
pub mod glob;
pub mod grep;
pub mod read;
pub mod write;
