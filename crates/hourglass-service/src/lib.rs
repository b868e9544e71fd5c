//! `hourglass-service` — managed front-end over a scheduling engine.
//!
//! A [`LifecycleController`] owns the engine and moves it through
//! created → running ⇄ paused → closed. A [`SchedulingFacade`] obtained from
//! the controller exposes job, trigger and calendar management. Both report
//! failures as [`ServiceError`].

pub mod error;
pub mod facade;
pub mod lifecycle;

pub use error::{Result, ServiceError, Transition};
pub use facade::SchedulingFacade;
pub use lifecycle::{LifecycleController, SchedulerLifecycleState};
