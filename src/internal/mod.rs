//! Internal implementation details.

pub(crate) mod dispose_bag;

pub(crate) use dispose_bag::{BoxDisposeFuture, DisposeBag};
