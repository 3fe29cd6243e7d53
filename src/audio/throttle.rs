//! Byte-rate throttle for outbound audio

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};

use crate::{Error, Result};

/// Direct (unkeyed) byte limiter
type ByteLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Caps an outbound stream to a fixed byte rate in fixed-size chunks
///
/// Each byte is one governor cell. The burst equals the chunk size, so at
/// most one chunk can be released ahead of the steady rate.
pub struct Throttle {
    limiter: ByteLimiter,
    chunk_size: NonZeroU32,
}

impl Throttle {
    /// Create a throttle releasing `bytes_per_second` in `chunk_size` pieces
    ///
    /// # Errors
    ///
    /// Returns error if either value is zero or the chunk exceeds the rate
    pub fn new(bytes_per_second: u32, chunk_size: u32) -> Result<Self> {
        let rate = NonZeroU32::new(bytes_per_second)
            .ok_or_else(|| Error::Config("throttle rate must be non-zero".to_string()))?;
        let chunk_size = NonZeroU32::new(chunk_size)
            .ok_or_else(|| Error::Config("throttle chunk size must be non-zero".to_string()))?;

        if chunk_size > rate {
            return Err(Error::Config(format!(
                "throttle chunk size {chunk_size} exceeds rate {rate}"
            )));
        }

        let quota = Quota::per_second(rate).allow_burst(chunk_size);
        Ok(Self {
            limiter: RateLimiter::direct(quota),
            chunk_size,
        })
    }

    /// Bytes released per write
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get() as usize
    }

    /// Wait until `len` bytes may be written
    ///
    /// # Errors
    ///
    /// Returns error if `len` is larger than the chunk size
    pub async fn acquire(&self, len: usize) -> Result<()> {
        let Some(cells) = u32::try_from(len).ok().and_then(NonZeroU32::new) else {
            return Ok(());
        };

        self.limiter
            .until_n_ready(cells)
            .await
            .map_err(|e| Error::Audio(format!("throttle capacity exceeded: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn rejects_invalid_quota() {
        assert!(Throttle::new(0, 16).is_err());
        assert!(Throttle::new(1024, 0).is_err());
        assert!(Throttle::new(16, 32).is_err());
    }

    #[tokio::test]
    async fn oversized_acquire_is_an_error() {
        let throttle = Throttle::new(1024, 16).unwrap();
        assert!(throttle.acquire(17).await.is_err());
        assert!(throttle.acquire(0).await.is_ok());
    }

    #[tokio::test]
    async fn enforces_byte_rate() {
        // 256 B/s in 16-byte chunks: after the initial burst, 8 more chunks
        // (128 bytes) need about half a second
        let throttle = Throttle::new(256, 16).unwrap();
        assert_eq!(throttle.chunk_size(), 16);

        let start = Instant::now();
        for _ in 0..9 {
            throttle.acquire(16).await.unwrap();
        }
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(400), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
    }
}
