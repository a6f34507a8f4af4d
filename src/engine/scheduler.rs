// ABOUTME: Batch scheduling with bounded concurrency
// ABOUTME: Runs the tasks of one batch concurrently, limited by a semaphore of execution permits

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::result::{TaskResult, TaskStatus};

pub struct TaskScheduler {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub label: String,
    pub class: String,
}

impl TaskScheduler {
    /// Create a new task scheduler with specified concurrency limit
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Execute a batch of tasks concurrently, returning results in batch order
    pub async fn execute_batch<F, Fut>(
        &self,
        tasks: Vec<ScheduledTask>,
        executor_fn: F,
    ) -> Vec<TaskResult>
    where
        F: Fn(ScheduledTask) -> Fut,
        Fut: Future<Output = TaskResult>,
    {
        if tasks.is_empty() {
            return Vec::new();
        }

        info!("Executing batch of {} tasks", tasks.len());

        let futures = tasks.into_iter().map(|task| {
            let semaphore = Arc::clone(&self.semaphore);
            let executor = &executor_fn;

            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!("Scheduler closed before task {} could start", task.label);
                        let mut result = TaskResult::new(task.label, task.class);
                        result.mark_completed(
                            TaskStatus::Failed,
                            Some("scheduler closed".to_string()),
                        );
                        return result;
                    }
                };

                debug!("Starting task execution: {}", task.label);
                executor(task).await
            }
        });

        let results = join_all(futures).await;

        for result in &results {
            debug!("Task {} completed with status: {}", result.task, result.status);
        }

        results
    }

    /// Get current resource usage statistics
    pub fn get_resource_stats(&self) -> ResourceStats {
        let available_permits = self.semaphore.available_permits();
        ResourceStats {
            max_concurrent: self.max_concurrent,
            available_permits,
            active_tasks: self.max_concurrent.saturating_sub(available_permits),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceStats {
    pub max_concurrent: usize,
    pub available_permits: usize,
    pub active_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    fn scheduled(label: &str) -> ScheduledTask {
        ScheduledTask {
            label: label.to_string(),
            class: "test.Task".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scheduler_creation() {
        let scheduler = TaskScheduler::new(4);
        let stats = scheduler.get_resource_stats();
        assert_eq!(stats.max_concurrent, 4);
        assert_eq!(stats.available_permits, 4);
        assert_eq!(stats.active_tasks, 0);

        assert_eq!(TaskScheduler::new(0).max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let scheduler = TaskScheduler::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = ["a", "b", "c", "d", "e"].iter().map(|l| scheduled(l)).collect();
        let results = scheduler
            .execute_batch(tasks, |task| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);

                    let mut result = TaskResult::new(task.label, task.class);
                    result.mark_completed(TaskStatus::Success, None);
                    result
                }
            })
            .await;

        assert_eq!(results.len(), 5);
        assert_eq!(results[0].task, "a");
        assert_eq!(results[4].task, "e");
        assert!(results.iter().all(TaskResult::is_successful));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
