// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Reservoir of transform pipelines.
//!
//! A pipeline carries mutable scratch state, so each one is held by a single
//! caller at a time. `acquire` pops an idle pipeline or builds a new one; the
//! returned guard puts it back on drop, discarding it when the free list is
//! already at its idle cap.

use crate::images::transform::{Filter, TransformPipeline};
use parking_lot::Mutex;
use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Default number of idle pipelines kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 32;

pub struct PipelinePool {
    filters: Vec<Filter>,
    idle: Mutex<Vec<TransformPipeline>>,
    max_idle: usize,
    created: AtomicUsize,
}

impl PipelinePool {
    pub fn new(filters: Vec<Filter>, max_idle: usize) -> Arc<PipelinePool> {
        Arc::new(PipelinePool {
            filters,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            created: AtomicUsize::new(0),
        })
    }

    /// Takes exclusive ownership of a pipeline until the guard drops.
    pub fn acquire(self: &Arc<Self>) -> PooledPipeline {
        let pooled = self.idle.lock().pop();
        let pipeline = pooled.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            TransformPipeline::new(self.filters.clone())
        });

        PooledPipeline {
            pipeline: Some(pipeline),
            pool: self.clone(),
        }
    }

    fn release(&self, mut pipeline: TransformPipeline) {
        pipeline.reset();

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(pipeline);
        }
    }

    /// Number of pipelines waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of pipelines built since the pool was created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// Exclusive handle on a pooled pipeline.
pub struct PooledPipeline {
    pipeline: Option<TransformPipeline>,
    pool: Arc<PipelinePool>,
}

impl Deref for PooledPipeline {
    type Target = TransformPipeline;

    fn deref(&self) -> &TransformPipeline {
        self.pipeline
            .as_ref()
            .expect("pipeline is only taken when the guard drops")
    }
}

impl DerefMut for PooledPipeline {
    fn deref_mut(&mut self) -> &mut TransformPipeline {
        self.pipeline
            .as_mut()
            .expect("pipeline is only taken when the guard drops")
    }
}

impl Drop for PooledPipeline {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            self.pool.release(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::transform::standard_filters;

    #[test]
    fn released_pipelines_are_reused() {
        let pool = PipelinePool::new(standard_filters(), 4);

        let first = pool.acquire();
        drop(first);
        assert_eq!(pool.idle(), 1);

        let _second = pool.acquire();
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn concurrent_holders_get_distinct_pipelines() {
        let pool = PipelinePool::new(standard_filters(), 4);

        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.created(), 2);
        assert!(!std::ptr::eq(&*a, &*b));
    }

    #[test]
    fn idle_list_is_capped() {
        let pool = PipelinePool::new(standard_filters(), 2);

        let held: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        drop(held);

        assert_eq!(pool.created(), 5);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn released_buffer_is_cleared() {
        let pool = PipelinePool::new(standard_filters(), 1);

        let mut p = pool.acquire();
        p.scratch().extend_from_slice(b"stale");
        drop(p);

        let p = pool.acquire();
        assert!(p.buffer().is_empty());
    }
}
