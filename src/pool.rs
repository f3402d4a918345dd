//! 作業キューとセッションプール
//!
//! N個のセッションそれぞれに1本のレーン（tokioタスク）を割り当て、共有FIFOキューから
//! 1件ずつ取り出して処理する。キューが空になったレーンから終了する。

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::ScraperError;
use crate::merge::merge_lanes;
use crate::traits::{Outcome, PageSession, Task};
use crate::types::WorkItem;

type SharedQueue = Arc<Mutex<VecDeque<WorkItem>>>;

pub struct WorkPool<S> {
    sessions: Vec<S>,
}

impl<S> WorkPool<S>
where
    S: PageSession + 'static,
{
    pub fn new(sessions: Vec<S>) -> Self {
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// プール実行の前処理（bootOptions 取得など）に使う
    pub fn first_session(&mut self) -> Option<&mut S> {
        self.sessions.first_mut()
    }

    /// items をすべて処理し、ID昇順の結果を返す
    ///
    /// 項目単位のエラーは `Outcome::failed` として結果に残す。セッション由来の致命的な
    /// エラーは他のレーンを止め、全セッションを閉じてから返す。
    pub async fn run<T>(
        &mut self,
        items: Vec<WorkItem>,
        task: Arc<T>,
    ) -> Result<Vec<T::Output>, ScraperError>
    where
        T: Task,
    {
        if self.sessions.is_empty() {
            return Err(ScraperError::BrowserInit(
                "セッションがありません".to_string(),
            ));
        }

        let total = items.len();
        info!(
            "Dispatching {} items across {} sessions",
            total,
            self.sessions.len()
        );

        let queue: SharedQueue = Arc::new(Mutex::new(VecDeque::from(items)));
        let abort = Arc::new(AtomicBool::new(false));
        let mut lanes = JoinSet::new();

        for (lane, session) in self.sessions.drain(..).enumerate() {
            lanes.spawn(run_lane(
                lane,
                session,
                Arc::clone(&queue),
                Arc::clone(&abort),
                Arc::clone(&task),
            ));
        }

        let mut partials = Vec::new();
        let mut first_error: Option<ScraperError> = None;

        while let Some(joined) = lanes.join_next().await {
            match joined {
                Ok((session, outcome)) => {
                    self.sessions.push(session);
                    match outcome {
                        Ok(results) => partials.push(results),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                Err(e) => {
                    // レーン内のパニックは run_lane で捕まえるため、ここに来るのは取り消しのみ。
                    // そのレーンのセッションは閉じられない
                    abort.store(true, Ordering::SeqCst);
                    error!("Lane task failed: {}", e);
                    first_error.get_or_insert(ScraperError::Worker(e.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            error!("Pool aborted: {}", e);
            self.close_sessions().await;
            return Err(e);
        }

        let results = merge_lanes(partials);
        let unresolved = results.iter().filter(|r| !r.is_converged()).count();
        info!(
            "Pool finished: {} results ({} not converged)",
            results.len(),
            unresolved
        );
        Ok(results)
    }

    /// 全セッションを閉じる
    pub async fn close(mut self) -> Result<(), ScraperError> {
        self.close_sessions().await;
        Ok(())
    }

    async fn close_sessions(&mut self) {
        for (i, mut session) in self.sessions.drain(..).enumerate() {
            if let Err(e) = session.close().await {
                warn!("Failed to close session {}: {}", i, e);
            }
        }
    }
}

async fn run_lane<S, T>(
    lane: usize,
    mut session: S,
    queue: SharedQueue,
    abort: Arc<AtomicBool>,
    task: Arc<T>,
) -> (S, Result<Vec<T::Output>, ScraperError>)
where
    S: PageSession + 'static,
    T: Task,
{
    let mut results = Vec::new();

    loop {
        if abort.load(Ordering::SeqCst) {
            debug!("Lane {} stopping: pool aborted", lane);
            break;
        }

        let next = queue.lock().await.pop_front();
        let Some(item) = next else {
            break;
        };

        debug!("Lane {} processing item {}", lane, item.id);
        let outcome = AssertUnwindSafe(task.run(&mut session, &item))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(output)) => results.push(output),
            Ok(Err(e)) if e.is_fatal() => {
                abort.store(true, Ordering::SeqCst);
                error!("Lane {} fatal error on item {}: {}", lane, item.id, e);
                return (session, Err(e));
            }
            Ok(Err(e)) => {
                warn!("Item {} failed: {}", item.id, e);
                results.push(T::Output::failed(&item, e.to_string()));
            }
            Err(payload) => {
                // セッションは呼び出し側で閉じられるよう返す
                abort.store(true, Ordering::SeqCst);
                let message = panic_message(payload.as_ref());
                error!("Lane {} panicked on item {}: {}", lane, item.id, message);
                return (
                    session,
                    Err(ScraperError::Worker(format!("item {}: {}", item.id, message))),
                );
            }
        }
    }

    debug!("Lane {} finished after {} items", lane, results.len());
    (session, Ok(results))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use crate::types::{Convergence, ExtractionResult};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;

    /// 遷移だけして即座に収束した結果を返す。broken の項目は項目エラーにする
    struct VisitTask {
        broken: BTreeSet<u64>,
    }

    #[async_trait]
    impl Task for VisitTask {
        type Output = ExtractionResult;

        async fn run(
            &self,
            session: &mut dyn PageSession,
            item: &WorkItem,
        ) -> Result<ExtractionResult, ScraperError> {
            session.navigate(&format!("item/{}", item.id)).await?;
            if self.broken.contains(&item.id) {
                return Err(ScraperError::Extraction {
                    id: item.id,
                    message: "malformed page".into(),
                });
            }
            let mut result = ExtractionResult::seeded(item);
            result.status = Convergence::Converged;
            Ok(result)
        }
    }

    fn items(ids: &[u64]) -> Vec<WorkItem> {
        ids.iter().map(|id| WorkItem::new(*id)).collect()
    }

    fn sessions(n: usize, counter: &Arc<AtomicUsize>) -> Vec<ScriptedSession> {
        (0..n)
            .map(|_| ScriptedSession::new(Vec::new()).with_close_counter(Arc::clone(counter)))
            .collect()
    }

    #[tokio::test]
    async fn test_five_items_two_sessions_sorted() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkPool::new(sessions(2, &closed));
        let task = Arc::new(VisitTask {
            broken: BTreeSet::new(),
        });

        let results = pool.run(items(&[5, 3, 1, 4, 2]), task).await.unwrap();

        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(pool.len(), 2);

        pool.close().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_loss_no_duplication() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkPool::new(sessions(3, &closed));
        let ids: Vec<u64> = (1..=40).rev().collect();
        let task = Arc::new(VisitTask {
            broken: BTreeSet::new(),
        });

        let results = pool.run(items(&ids), task).await.unwrap();

        let got: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(got, (1..=40).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_item_error_recorded_and_queue_continues() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkPool::new(sessions(2, &closed));
        let task = Arc::new(VisitTask {
            broken: BTreeSet::from([3]),
        });

        let results = pool.run(items(&[1, 2, 3, 4, 5]), task).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(matches!(results[2].status, Convergence::Failed(_)));
        assert!(results
            .iter()
            .filter(|r| r.id != 3)
            .all(|r| r.status == Convergence::Converged));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_and_releases_sessions() {
        let closed = Arc::new(AtomicUsize::new(0));
        let sessions = vec![
            ScriptedSession::new(Vec::new())
                .fail_navigation_on("item/3")
                .with_close_counter(Arc::clone(&closed)),
            ScriptedSession::new(Vec::new())
                .fail_navigation_on("item/3")
                .with_close_counter(Arc::clone(&closed)),
        ];
        let mut pool = WorkPool::new(sessions);
        let task = Arc::new(VisitTask {
            broken: BTreeSet::new(),
        });

        let err = pool.run(items(&[1, 2, 3, 4, 5]), task).await.unwrap_err();

        assert!(matches!(err, ScraperError::Navigation(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert!(pool.is_empty());
    }

    struct PanicTask;

    #[async_trait]
    impl Task for PanicTask {
        type Output = ExtractionResult;

        async fn run(
            &self,
            _session: &mut dyn PageSession,
            item: &WorkItem,
        ) -> Result<ExtractionResult, ScraperError> {
            if item.id == 2 {
                panic!("extractor bug");
            }
            Ok(ExtractionResult::seeded(item))
        }
    }

    #[tokio::test]
    async fn test_panicking_lane_still_releases_sessions() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkPool::new(sessions(2, &closed));

        let err = pool
            .run(items(&[1, 2, 3, 4]), Arc::new(PanicTask))
            .await
            .unwrap_err();

        match err {
            ScraperError::Worker(message) => assert!(message.contains("extractor bug")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_empty_pool_is_error() {
        let mut pool: WorkPool<ScriptedSession> = WorkPool::new(Vec::new());
        let task = Arc::new(VisitTask {
            broken: BTreeSet::new(),
        });

        assert!(pool.run(items(&[1]), task).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_queue_returns_empty() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkPool::new(sessions(2, &closed));
        let task = Arc::new(VisitTask {
            broken: BTreeSet::new(),
        });

        assert!(pool.run(Vec::new(), task).await.unwrap().is_empty());
    }
}
