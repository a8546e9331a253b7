// ABOUTME: Task fan-out for reconciliation stages: submit futures, join them at a barrier.
// ABOUTME: Bounded by a semaphore; timeouts and panics come back as failed tasks.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::swarm::SwarmError;

/// A submitted task. Dropping the handle does not cancel the task.
pub struct TaskHandle<T> {
    label: String,
    handle: JoinHandle<Result<T, SwarmError>>,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Runs stage tasks on the tokio runtime with at most `max_parallel`
/// running at once.
#[derive(Clone)]
pub struct Scheduler {
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl Scheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Spawn `task`. The timeout starts once the task holds a permit; when
    /// it fires, the future is dropped along with anything it owns.
    pub fn submit<T, F>(&self, label: impl Into<String>, timeout: Duration, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, SwarmError>> + Send + 'static,
    {
        let label = label.into();
        let permits = Arc::clone(&self.permits);
        let task_label = label.clone();

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| SwarmError::SchedulerClosed)?;
            tracing::debug!(task = task_label.as_str(), "task started");

            match tokio::time::timeout(timeout, task).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(task = task_label.as_str(), ?timeout, "task timed out");
                    Err(SwarmError::Timeout {
                        label: task_label,
                        after: timeout,
                    })
                }
            }
        });

        TaskHandle { label, handle }
    }

    /// Wait for every handle. Results come back in submission order.
    pub async fn join_all<T>(&self, handles: Vec<TaskHandle<T>>) -> Vec<Result<T, SwarmError>> {
        let (labels, joins): (Vec<_>, Vec<_>) =
            handles.into_iter().map(|h| (h.label, h.handle)).unzip();

        join_all(joins)
            .await
            .into_iter()
            .zip(labels)
            .map(|(joined, label)| match joined {
                Ok(result) => result,
                Err(err) => Err(SwarmError::TaskPanicked {
                    label,
                    message: err.to_string(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn results_keep_submission_order() {
        let scheduler = Scheduler::new(4);
        let handles = (0..5u64)
            .map(|i| {
                scheduler.submit(format!("task {i}"), Duration::from_secs(5), async move {
                    tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                    Ok(i)
                })
            })
            .collect();

        let results: Vec<u64> = scheduler
            .join_all(handles)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn timeout_is_a_failed_task() {
        let scheduler = Scheduler::new(1);
        let handle = scheduler.submit("slow", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });

        let results = scheduler.join_all(vec![handle]).await;
        assert!(matches!(
            results[0],
            Err(SwarmError::Timeout { ref label, .. }) if label == "slow"
        ));
    }

    #[tokio::test]
    async fn panic_is_a_failed_task() {
        let scheduler = Scheduler::new(1);
        let handle = scheduler.submit("boom", Duration::from_secs(5), async {
            if true {
                panic!("exploded");
            }
            Ok(())
        });

        let results = scheduler.join_all(vec![handle]).await;
        assert!(matches!(results[0], Err(SwarmError::TaskPanicked { .. })));
    }

    #[tokio::test]
    async fn semaphore_bounds_running_tasks() {
        let scheduler = Scheduler::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles = (0..6)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                scheduler.submit(format!("task {i}"), Duration::from_secs(5), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for result in scheduler.join_all(handles).await {
            result.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn one_failure_does_not_cancel_siblings() {
        let scheduler = Scheduler::new(4);
        let done = Arc::new(AtomicUsize::new(0));
        let finished = Arc::clone(&done);

        let failing = scheduler.submit("fails", Duration::from_secs(5), async {
            Err::<(), _>(SwarmError::NoFreePort {
                host: "web1".to_string(),
            })
        });
        let slow = scheduler.submit("slow", Duration::from_secs(5), async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let results = scheduler.join_all(vec![failing, slow]).await;
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
