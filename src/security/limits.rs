//! Request body limits.
//!
//! The webhook body is read up to a fixed ceiling. Bytes past the ceiling
//! are dropped rather than rejected, so an oversized document simply fails
//! JSON parsing downstream. The whole read is bounded by a deadline.

use std::time::Duration;

use axum::body::Body;
use futures_util::StreamExt;
use thiserror::Error;

/// Body bytes read under the ceiling.
#[derive(Debug)]
pub struct CappedBody {
    pub bytes: Vec<u8>,
    /// Set when the client sent more than the ceiling.
    pub truncated: bool,
}

#[derive(Debug, Error)]
pub enum BodyReadError {
    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
    #[error("timed out reading request body after {0:?}")]
    Timeout(Duration),
}

/// Read at most `limit` bytes of `body`, giving up after `timeout`.
pub async fn read_capped(
    body: Body,
    limit: usize,
    timeout: Duration,
) -> Result<CappedBody, BodyReadError> {
    let read = async move {
        let mut stream = body.into_data_stream();
        let mut bytes = Vec::new();
        let mut truncated = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(BodyReadError::Read)?;
            let remaining = limit - bytes.len();
            if chunk.len() > remaining {
                bytes.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(CappedBody { bytes, truncated })
    };

    tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| BodyReadError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use futures_util::stream;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn reads_small_body_fully() {
        let body = read_capped(Body::from("{\"a\":1}"), 1024, TIMEOUT).await.unwrap();
        assert_eq!(body.bytes, b"{\"a\":1}");
        assert!(!body.truncated);
    }

    #[tokio::test]
    async fn exact_limit_is_not_truncated() {
        let body = read_capped(Body::from(vec![b'x'; 16]), 16, TIMEOUT).await.unwrap();
        assert_eq!(body.bytes.len(), 16);
        assert!(!body.truncated);
    }

    #[tokio::test]
    async fn truncates_across_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"0123456789")),
            Ok(Bytes::from_static(b"abcdefghij")),
            Ok(Bytes::from_static(b"never read")),
        ];
        let body = Body::from_stream(stream::iter(chunks));
        let capped = read_capped(body, 15, TIMEOUT).await.unwrap();
        assert_eq!(capped.bytes, b"0123456789abcde");
        assert!(capped.truncated);
    }

    #[tokio::test]
    async fn stream_error_is_reported() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"partial\":")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(stream::iter(chunks));
        let err = read_capped(body, 1024, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, BodyReadError::Read(_)));
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let body = Body::from_stream(stream::pending::<Result<Bytes, std::io::Error>>());
        let err = read_capped(body, 1024, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BodyReadError::Timeout(_)));
    }
}
