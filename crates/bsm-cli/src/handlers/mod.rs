//! Command handlers.

pub mod oculus;
pub mod steam;

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::CliError;

/// Call `stop` on the first Ctrl+C and exit on the second. Abort the handle
/// once the download ends.
fn stop_on_ctrl_c(stop: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    tokio::spawn(escalate(
        || async { tokio::signal::ctrl_c().await.is_ok() },
        stop,
        || std::process::exit(CliError::Cancelled.exit_code()),
    ))
}

/// `interrupted` resolves to `false` when no further signal can arrive.
async fn escalate<S, Fut>(mut interrupted: S, stop: impl FnOnce(), force: impl FnOnce())
where
    S: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !interrupted().await {
        return;
    }
    info!("Ctrl+C received, stopping download (press again to exit)");
    stop();

    if interrupted().await {
        warn!("Second Ctrl+C received, exiting without waiting for the download to stop");
        force();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deliver `count` interrupts, then report that no more can arrive.
    fn interrupts(count: usize) -> impl FnMut() -> std::future::Ready<bool> {
        let mut left = count;
        move || {
            let hit = left > 0;
            left = left.saturating_sub(1);
            std::future::ready(hit)
        }
    }

    async fn run(count: usize) -> (usize, usize) {
        let stops = Arc::new(AtomicUsize::new(0));
        let forced = Arc::new(AtomicUsize::new(0));
        let (s, f) = (Arc::clone(&stops), Arc::clone(&forced));
        escalate(
            interrupts(count),
            move || {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                f.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;
        (stops.load(Ordering::SeqCst), forced.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn second_interrupt_forces_exit() {
        assert_eq!(run(2).await, (1, 1));
    }

    #[tokio::test]
    async fn single_interrupt_only_stops() {
        assert_eq!(run(1).await, (1, 0));
    }

    #[tokio::test]
    async fn no_interrupt_does_nothing() {
        assert_eq!(run(0).await, (0, 0));
    }
}
