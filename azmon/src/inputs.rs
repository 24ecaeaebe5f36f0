//! Metric inputs
//!
//! An input polls one external system and hands what it observed to an
//! [`Accumulator`]. Inputs are built by name from the
//! [`Registry`](crate::registry::Registry) and driven by the host's
//! scheduler, which calls [`Input::gather`] once per tick.

use std::fmt;

use async_trait::async_trait;
use azmon_capture::Accumulator;

use crate::registry::{self, Registry};

pub mod azure_monitor;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Input`]
pub enum Error {
    /// See [`crate::inputs::azure_monitor::Error`] for details.
    #[error(transparent)]
    AzureMonitor(#[from] azure_monitor::Error),
}

/// A source of metrics.
#[async_trait]
pub trait Input: Send + Sync + fmt::Debug {
    /// The name this input is registered under.
    fn name(&self) -> &'static str;

    /// One line describing the input.
    fn description(&self) -> &'static str;

    /// Run one poll cycle, emitting into `acc`
    ///
    /// Returns the number of samples emitted.
    ///
    /// # Errors
    ///
    /// Function will return an error if the cycle failed. Nothing was emitted
    /// in that case and the caller should simply try again on its next tick.
    async fn gather(&self, acc: &mut dyn Accumulator) -> Result<usize, Error>;
}

/// Register every input this crate ships with.
///
/// # Errors
///
/// Function will return an error if an input of the same name is already
/// registered.
pub fn register_all(registry: &mut Registry) -> Result<(), registry::Error> {
    registry.register(azure_monitor::AzureMonitor::registration())
}
