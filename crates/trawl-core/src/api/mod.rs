//! API implementation submodules.
//!
//! Each submodule contains `impl TrawlApi` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod discovery;
mod learning;

pub use builder::TrawlApiBuilder;
