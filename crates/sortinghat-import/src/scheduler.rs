//! Bounded fan-out over independent units of work.

use std::future::Future;

use tokio::task::JoinSet;

use crate::Result;

/// Run `task` for every item with at most `limit` tasks in flight.
///
/// Once `limit` tasks are running, the next one is spawned only after one of
/// them completes. Returns after every task has finished, or with the first
/// error; dropping the set then aborts the tasks still in flight.
pub async fn run_bounded<T, F, Fut>(
  items: impl IntoIterator<Item = T>,
  limit: usize,
  task: F,
) -> Result<()>
where
  F: Fn(T) -> Fut,
  Fut: Future<Output = Result<()>> + Send + 'static,
{
  let limit = limit.max(1);
  let mut in_flight = JoinSet::new();

  for item in items {
    if in_flight.len() >= limit
      && let Some(done) = in_flight.join_next().await
    {
      done??;
    }
    in_flight.spawn(task(item));
  }

  while let Some(done) = in_flight.join_next().await {
    done??;
  }
  Ok(())
}
