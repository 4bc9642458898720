//! Bounded-concurrency fan-out shared by document loading and embedding.

use futures::stream::{self, Stream, StreamExt};
use std::future::Future;

/// Runs async jobs with at most `limit` in flight, yielding results in input order.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: usize,
}

impl WorkerPool {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Stream job results in input order as they become available.
    pub fn stream<I, F, Fut>(&self, items: I, job: F) -> impl Stream<Item = Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        stream::iter(items).map(job).buffered(self.limit)
    }

    /// Run every job and collect all results in input order.
    pub async fn run<I, F, Fut>(&self, items: I, job: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        self.stream(items, job).collect().await
    }
}
