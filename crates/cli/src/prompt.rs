//! Timed password prompt

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Read one line, giving up after `remaining`
///
/// Returns `None` on timeout or end of input.
pub async fn read_line_within<R>(reader: &mut R, remaining: Duration) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    match tokio::time::timeout(remaining, reader.read_line(&mut line)).await {
        Err(_) => Ok(None),
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(_)) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        Ok(Err(e)) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_line() {
        let mut input: &[u8] = b"hunter2\r\nignored\n";
        let line = read_line_within(&mut input, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some("hunter2"));
    }

    #[tokio::test]
    async fn test_eof_is_none() {
        let mut input: &[u8] = b"";
        let line = read_line_within(&mut input, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_timeout_is_none() {
        // Writer kept alive so the read stays pending
        let (_writer, reader) = tokio::io::duplex(64);
        let mut reader = BufReader::new(reader);
        let line = read_line_within(&mut reader, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(line, None);
    }
}
