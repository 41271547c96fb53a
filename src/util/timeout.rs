//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::auth::provider::ProviderError;

/// Wrap a provider call with a timeout.
///
/// An elapsed timeout becomes [`ProviderError::Unavailable`], never a
/// credential failure.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Unavailable(format!(
            "timed out after {}ms",
            duration.as_millis()
        ))),
    }
}
