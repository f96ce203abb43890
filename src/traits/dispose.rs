//! Disposal trait for instance teardown.

use crate::error::BoxError;

/// Trait for asynchronous instance teardown.
///
/// Implement this for instances built by a [`DelegateBuilder`](crate::DelegateBuilder)
/// that need structured teardown (closing connections, flushing buffers), or
/// register an `Arc` of a helper through
/// [`BuildContext::register_async_disposer`](crate::BuildContext::register_async_disposer).
/// Teardown runs once, after the last lock on the instance is released and
/// before its dependency locks are released.
///
/// Errors are reported to observers and the log; they never stop the
/// container from finishing the disposal.
///
/// # Examples
///
/// ```
/// use indirectx::{AsyncDispose, BoxError, DelegateBuilder, ProviderNodeConfig};
/// use async_trait::async_trait;
///
/// struct DatabaseClient {
///     connection_id: String,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for DatabaseClient {
///     async fn dispose(&self) -> Result<(), BoxError> {
///         println!("Closing database connection: {}", self.connection_id);
///         Ok(())
///     }
/// }
///
/// let node = ProviderNodeConfig::per_resolve(
///     DelegateBuilder::new(|_| Ok(DatabaseClient { connection_id: "conn_123".into() }))
///         .with_async_dispose::<DatabaseClient>(),
/// );
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Perform asynchronous cleanup of resources.
    async fn dispose(&self) -> Result<(), BoxError>;
}
