//! Core traits for the component container.

pub mod dispose;
pub mod resolver;

pub use dispose::AsyncDispose;
pub use resolver::{Resolver, ResolverCore};
