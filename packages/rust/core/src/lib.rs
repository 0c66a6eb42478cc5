//! Job orchestration core: executor, pipelines, scheduler, and the
//! concurrency limiter.
//!
//! The [`Scheduler`] discovers due work and admits pending jobs under the
//! [`JobLimiter`] budget; each admitted job runs on its own task through
//! the [`JobExecutor`], which drives the job-type's pipeline stage by
//! stage, tracking progress and honoring cooperative cancellation. The
//! durable records in storage are the only state shared between workers.

pub mod executor;
pub mod limiter;
pub mod pipelines;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use executor::{JobExecutor, PipelineLimits};
pub use limiter::JobLimiter;
pub use scheduler::{Scheduler, WakeHandle};
