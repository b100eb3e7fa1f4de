use std::time::Duration;

use tokio::task::JoinHandle;

/// A cancellable one-shot timer bound to its owner's lifetime
///
/// Arming returns a guard; dropping or re-assigning the guard aborts the
/// pending timer task, so a state transition that supersedes a timer
/// cancels it structurally instead of relying on a manual `clear` call at
/// every transition site.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use vivaflow_lib::utils::ScopedTimer;
///
/// # async fn example() {
/// let timer = ScopedTimer::arm(Duration::from_millis(500), || {
///     println!("fired");
/// });
///
/// // Dropping (or calling cancel) before the delay elapses
/// // prevents the callback from running.
/// drop(timer);
/// # }
/// ```
#[derive(Debug)]
pub struct ScopedTimer {
    handle: Option<JoinHandle<()>>,
}

impl ScopedTimer {
    /// Arm a timer that runs `on_fire` after `delay`
    ///
    /// The callback runs at most once. It is skipped entirely if the
    /// timer is cancelled or dropped first.
    pub fn arm<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Cancel the timer if it has not fired yet
    ///
    /// Safe to call multiple times.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Check whether the timer is still pending
    pub fn is_armed(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);

        let _timer = ScopedTimer::arm(Duration::from_millis(100), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);

        let mut timer = ScopedTimer::arm(Duration::from_millis(100), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });

        timer.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);

        {
            let _timer = ScopedTimer::arm(Duration::from_millis(100), move || {
                fired_clone.store(true, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_cancel_is_safe() {
        let mut timer = ScopedTimer::arm(Duration::from_millis(100), || {});
        timer.cancel();
        timer.cancel();
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_armed() {
        let timer = ScopedTimer::arm(Duration::from_millis(100), || {});
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(200)).await;
        // Give the runtime a tick to mark the task finished
        tokio::task::yield_now().await;
        assert!(!timer.is_armed());
    }
}
