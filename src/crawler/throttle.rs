//! Request throttling between page fetches

use crate::TrawlError;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The delay to wait before a fetch
///
/// With `randomize` set, `base` is scaled by a random factor in [0.5, 1.5].
pub fn jittered_delay(base: Duration, randomize: bool) -> Duration {
    if !randomize || base.is_zero() {
        return base;
    }
    let factor = rand::thread_rng().gen_range(0.5..=1.5);
    base.mul_f64(factor)
}

/// Sleeps for `delay`, returning early with `Cancelled` if the run is stopped
pub async fn wait(delay: Duration, cancel: &CancellationToken) -> Result<(), TrawlError> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(TrawlError::Cancelled)
        } else {
            Ok(())
        };
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TrawlError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_jitter_stays_in_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..1000 {
            let d = jittered_delay(base, true);
            assert!(d >= Duration::from_millis(500), "{:?} too short", d);
            assert!(d <= Duration::from_millis(1500), "{:?} too long", d);
        }
    }

    #[test]
    fn test_fixed_delay_without_jitter() {
        let base = Duration::from_millis(250);
        assert_eq!(jittered_delay(base, false), base);
        assert_eq!(jittered_delay(Duration::ZERO, true), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_observes_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = wait(Duration::from_secs(10), &cancel).await;
        assert!(matches!(result, Err(TrawlError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_completes() {
        let started = Instant::now();
        wait(Duration::from_millis(20), &CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
