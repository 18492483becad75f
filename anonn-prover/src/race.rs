use std::future::Future;

use futures::future::Either;

/// Run two futures concurrently and return whichever finishes first.
///
/// The loser is dropped before this returns, which cancels it and releases
/// any listener or timer it owns. When both are ready on the same poll, `a`
/// wins.
pub async fn race<A, B>(a: A, b: B) -> Either<A::Output, B::Output>
where
    A: Future,
    B: Future,
{
    tokio::select! {
        biased;
        out = a => Either::Left(out),
        out = b => Either::Right(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_faster_future_wins() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "slow"
        };
        let fast = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            1u8
        };
        match race(slow, fast).await {
            Either::Right(v) => assert_eq!(v, 1),
            Either::Left(_) => panic!("slow future won"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loser_is_dropped() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(dropped.clone());
        let loser = async move {
            let _guard = guard;
            futures::future::pending::<()>().await
        };
        let winner = async { 7 };

        assert!(matches!(race(loser, winner).await, Either::Right(7)));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_tie_goes_to_first() {
        assert!(matches!(race(async { 1 }, async { 2 }).await, Either::Left(1)));
    }
}
