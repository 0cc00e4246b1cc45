//! Bounded worker pool over a shared job queue.
//!
//! A fixed number of lanes pull jobs front-first from one queue until it is
//! empty, so no job runs twice and none is dropped. Results land in a
//! pre-sized slot vector addressed by each job's range index, which makes
//! the output independent of completion order.
//!
//! The first lane error ends the run; lanes still in flight are dropped.

use std::collections::VecDeque;
use std::future::Future;

use futures_util::future::try_join_all;
use tokio::sync::Mutex;

use taxmate_core::ExtractionJob;

pub const DEFAULT_CONCURRENCY: usize = 2;

/// Run every job through `run` with at most `concurrency` in flight.
///
/// `on_complete` is called after each successful job, before that lane
/// pulls its next one.
pub async fn run_bounded<T, E, F, Fut, P>(
    jobs: Vec<ExtractionJob>,
    concurrency: usize,
    run: F,
    on_complete: P,
) -> Result<Vec<T>, E>
where
    F: Fn(ExtractionJob) -> Fut + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
    P: Fn(&ExtractionJob) + Sync,
    T: Send,
{
    let slot_count = jobs.iter().map(|j| j.range.index + 1).max().unwrap_or(0);
    let lane_count = concurrency.max(1).min(jobs.len());

    let queue = Mutex::new(VecDeque::from(jobs));
    let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..slot_count).map(|_| None).collect());

    let shared = (&queue, &slots, &run, &on_complete);
    let lanes = (0..lane_count).map(move |lane| {
        let (queue, slots, run, on_complete) = shared;
        async move {
            loop {
                let Some(job) = queue.lock().await.pop_front() else {
                    break;
                };
                tracing::debug!(lane, range = %job.range, "lane picked job");

                let value = run(job).await?;
                slots.lock().await[job.range.index] = Some(value);
                on_complete(&job);
            }
            Ok::<(), E>(())
        }
    });

    try_join_all(lanes).await?;

    Ok(slots.into_inner().into_iter().flatten().collect())
}
