//! Actor-based probing pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────────┐   list_active   ┌──────────────────┐
//!   │  Scheduler   │ ◄────────────── │ MonitorRegistry  │
//!   └──────┬───────┘                 └──────────────────┘
//!          │ submit_batch (≤ 10 tasks)
//!   ┌──────▼───────┐
//!   │  TaskQueue   │  at-least-once, unordered
//!   └──────┬───────┘
//!          │ receive / ack / nack / dead_letter
//!   ┌──────▼───────────────────────┐      ┌──────────────┐
//!   │ Dispatch workers (N)         │ ───► │ HealthStore  │
//!   │ probe → lock → step → write  │      └──────────────┘
//!   └──────┬───────────────────────┘
//!          │ boundary crossings only
//!   ┌──────▼───────┐
//!   │ AlertManager │
//!   └──────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **SchedulerActor**: Fans out one task per active monitor per tick
//! - **Dispatch workers**: Apply delivered tasks through [`dispatcher::TaskHandler`]
//! - **RetentionActor**: Prunes check history
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channels with oneshot replies (scheduler, retention)
//! 2. **Shutdown**: a watch channel stops every dispatch worker at once

pub mod dispatcher;
pub mod locks;
pub mod messages;
pub mod retention;
pub mod scheduler;

pub use dispatcher::{DispatchHandle, TaskError, TaskHandler};
pub use locks::KeyedLocks;
pub use messages::{DispatchStats, FanOutReport, TaskOutcome};
pub use retention::RetentionHandle;
pub use scheduler::SchedulerHandle;
