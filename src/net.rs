//! Outbound connection helpers shared by the tick consumer and order client

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectConfig;
use crate::error::ConnectError;

/// Connect to `addr`, retrying refused/reset attempts at a fixed interval
///
/// With `max_attempts == 0` this loops until a listener appears or `shutdown`
/// is cancelled. Errors that retrying cannot fix (unresolvable address,
/// permission denied) are returned immediately.
pub async fn connect_with_retry(
    addr: &str,
    policy: &ReconnectConfig,
    shutdown: &CancellationToken,
    attempts: Option<&AtomicU64>,
) -> Result<TcpStream, ConnectError> {
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;
        if let Some(counter) = attempts {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => return Err(ConnectError::Cancelled(addr.to_string())),
            result = TcpStream::connect(addr) => result,
        };

        let err = match result {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                }
                tracing::info!("🔌 Connected to {} (attempt {})", addr, attempt);
                return Ok(stream);
            }
            Err(e) => e,
        };

        if !ConnectError::is_transient(err.kind()) {
            return Err(ConnectError::Fatal {
                addr: addr.to_string(),
                source: err,
            });
        }

        if !policy.is_infinite() && attempt >= policy.max_attempts {
            return Err(ConnectError::RetriesExhausted {
                addr: addr.to_string(),
                attempts: attempt,
                source: err,
            });
        }

        tracing::warn!(
            "🔌 Connect to {} failed ({}), retrying in {:?}",
            addr,
            err,
            policy.retry_interval()
        );

        tokio::select! {
            _ = shutdown.cancelled() => return Err(ConnectError::Cancelled(addr.to_string())),
            _ = tokio::time::sleep(policy.retry_interval()) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Reserve a loopback port and release it so nothing is listening there
    async fn unused_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    fn policy(interval_ms: u64, max_attempts: u64) -> ReconnectConfig {
        ReconnectConfig {
            retry_interval_ms: interval_ms,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let addr = unused_addr().await;
        let counter = AtomicU64::new(0);

        let err = connect_with_retry(&addr, &policy(10, 3), &CancellationToken::new(), Some(&counter))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_retry_loop() {
        let addr = unused_addr().await;
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            connect_with_retry(&addr, &policy(20, 0), &shutdown, None),
        )
        .await
        .expect("retry loop ignored cancellation");

        assert!(matches!(result, Err(ConnectError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_fatal() {
        let err = connect_with_retry(
            "not a socket address",
            &policy(10, 0),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectError::Fatal { .. }));
    }
}
