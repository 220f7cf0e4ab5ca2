//! Bandwidth-limited body reading for simulated slow clients.
//!
//! The body is consumed in chunks of roughly a tenth of a second's worth of
//! bytes. After each chunk the reader sleeps long enough to hold the
//! configured rate, plus up to 50% jitter, and one chunk in ten adds a stall
//! of up to 100 ms.

use std::io;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

const READ_BUF_BYTES: usize = 32 * 1024;
const STALL_PROBABILITY: f64 = 0.1;
const MAX_STALL_MS: u64 = 100;

/// Bytes to request per read at `bytes_per_sec`, never more than `buf_len`.
pub fn chunk_size(bytes_per_sec: u64, buf_len: usize) -> usize {
    let per_tick = usize::try_from(bytes_per_sec / 10).unwrap_or(usize::MAX);
    per_tick.max(1).min(buf_len)
}

/// Sleep owed after reading `bytes` when `since_last` has already passed
/// since the previous chunk. `jitter` in `[0, 1)` scales the extra delay.
pub fn pacing_delay(bytes: usize, bytes_per_sec: u64, since_last: Duration, jitter: f64) -> Duration {
    if bytes_per_sec == 0 {
        return Duration::ZERO;
    }
    let expected = Duration::from_secs_f64(bytes as f64 / bytes_per_sec as f64);
    let Some(base) = expected.checked_sub(since_last) else {
        return Duration::ZERO;
    };
    base + base.mul_f64(jitter * 0.5)
}

/// Drain `reader` at about `bytes_per_sec`, returning the bytes read.
pub async fn read_throttled<R: AsyncRead>(reader: R, bytes_per_sec: u64) -> io::Result<u64> {
    let mut reader = std::pin::pin!(reader);
    let mut rng = StdRng::from_entropy();
    let mut buf = vec![0u8; READ_BUF_BYTES];
    let mut total = 0u64;
    let mut last_read = Instant::now();

    loop {
        let want = chunk_size(bytes_per_sec, buf.len());
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Ok(total);
        }
        total += n as u64;

        let delay = pacing_delay(n, bytes_per_sec, last_read.elapsed(), rng.gen::<f64>());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if rng.gen_bool(STALL_PROBABILITY) {
            let stall = Duration::from_millis(rng.gen_range(0..MAX_STALL_MS));
            tokio::time::sleep(stall).await;
        }
        last_read = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(1024, READ_BUF_BYTES), 102);
        assert_eq!(chunk_size(5, READ_BUF_BYTES), 1);
        assert_eq!(chunk_size(0, READ_BUF_BYTES), 1);
        assert_eq!(chunk_size(10 * 1024 * 1024, READ_BUF_BYTES), READ_BUF_BYTES);
    }

    #[test]
    fn test_pacing_delay_without_jitter() {
        let d = pacing_delay(100, 1000, Duration::ZERO, 0.0);
        assert_eq!(d, Duration::from_millis(100));
    }

    #[test]
    fn test_pacing_delay_subtracts_elapsed() {
        let d = pacing_delay(100, 1000, Duration::from_millis(40), 0.0);
        assert_eq!(d, Duration::from_millis(60));
        assert_eq!(
            pacing_delay(100, 1000, Duration::from_millis(150), 0.9),
            Duration::ZERO
        );
    }

    #[test]
    fn test_jitter_adds_at_most_half() {
        let base = Duration::from_millis(100);
        for jitter in [0.0, 0.25, 0.5, 0.999] {
            let d = pacing_delay(100, 1000, Duration::ZERO, jitter);
            assert!(d >= base);
            assert!(d < base + base / 2 + Duration::from_micros(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_throttled_holds_rate() {
        let body = vec![7u8; 1000];
        let started = Instant::now();

        let read = read_throttled(&body[..], 1000).await.unwrap();
        assert_eq!(read, 1000);

        // Ten 100 byte chunks at 1000 B/s, each with up to 50% jitter and a
        // possible 100 ms stall.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_read_throttled_empty_body() {
        assert_eq!(read_throttled(&b""[..], 10).await.unwrap(), 0);
    }
}
