use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::utils::error::AppError;

/// The closure a trigger runs on every tick.
pub type TriggerJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Fires a job at a fixed interval. The first tick lands one full interval
/// after `start`; callers that want an immediate pass run the job
/// themselves first.
pub struct PeriodicTrigger {
    state: Mutex<TriggerState>,
}

struct TriggerState {
    scheduler: Option<JobScheduler>,
    job_id: Option<Uuid>,
    job: Option<TriggerJob>,
    interval: Duration,
}

impl PeriodicTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Mutex::new(TriggerState {
                scheduler: None,
                job_id: None,
                job: None,
                interval,
            }),
        }
    }

    /// Begin ticking every `interval`. Starting an already-running trigger
    /// is a no-op.
    pub async fn start(&self, interval: Duration, job: TriggerJob) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if state.scheduler.is_some() {
            tracing::debug!("Trigger already running, start ignored");
            return Ok(());
        }

        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        let job_id = scheduler
            .add(build_job(interval, Arc::clone(&job))?)
            .await
            .map_err(scheduler_error)?;
        scheduler.start().await.map_err(scheduler_error)?;

        state.interval = interval;
        state.job = Some(job);
        state.job_id = Some(job_id);
        state.scheduler = Some(scheduler);

        tracing::info!("Periodic trigger started, first run in {:?}", interval);
        Ok(())
    }

    /// Stop ticking. A tick already in flight finishes on its own; stopping
    /// a stopped trigger is a no-op.
    pub async fn stop(&self) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut scheduler) = state.scheduler.take() else {
            tracing::debug!("Trigger already stopped");
            return Ok(());
        };
        state.job_id = None;
        state.job = None;

        scheduler.shutdown().await.map_err(scheduler_error)?;
        tracing::info!("Periodic trigger stopped");
        Ok(())
    }

    /// Swap the interval. A running trigger is rescheduled in place and its
    /// next run lands one new interval from now; a stopped one just
    /// remembers the interval for the next start.
    pub async fn reschedule(&self, interval: Duration) -> crate::Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.interval = interval;

        let (Some(scheduler), Some(job)) = (state.scheduler.as_mut(), state.job.clone()) else {
            return Ok(());
        };

        if let Some(old_id) = state.job_id.take() {
            scheduler.remove(&old_id).await.map_err(scheduler_error)?;
        }
        let job_id = scheduler
            .add(build_job(interval, job)?)
            .await
            .map_err(scheduler_error)?;
        state.job_id = Some(job_id);

        tracing::info!("Trigger rescheduled, next run in {:?}", interval);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.scheduler.is_some()
    }

    pub async fn interval(&self) -> Duration {
        self.state.lock().await.interval
    }

    /// When the next tick will land, if the trigger is running.
    pub async fn next_run_time(&self) -> Option<DateTime<Utc>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let scheduler = state.scheduler.as_mut()?;
        let job_id = state.job_id?;
        scheduler.next_tick_for_job(job_id).await.ok().flatten()
    }
}

fn build_job(interval: Duration, job: TriggerJob) -> crate::Result<Job> {
    Job::new_repeated_async(interval, move |_uuid, _lock| {
        let job = Arc::clone(&job);
        Box::pin(async move {
            job().await;
        })
    })
    .map_err(scheduler_error)
}

fn scheduler_error(err: tokio_cron_scheduler::JobSchedulerError) -> AppError {
    AppError::Scheduler(err.to_string())
}
