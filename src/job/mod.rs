//! Job subsystem: C9 Pipeline Runner, C10 Job Registry, C11 Worker Pool,
//! and the shared `Job`/`JobConfig` types (spec.md §3, §4.8-4.10).

pub mod pipeline;
pub mod registry;
pub mod types;
pub mod worker;

pub use pipeline::PipelineRunner;
pub use registry::{JobFilter, JobRegistry};
pub use types::{
    Job, JobConfig, JobErrorKind, JobErrorRecord, JobInput, JobResultSummary, JobState, LanguageTag,
};
pub use worker::{WorkerPool, WorkerPoolConfig};
