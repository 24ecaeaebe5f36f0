//! Build inputs by name
//!
//! Each input contributes a [`Registration`]: its name, a description, a
//! commented sample configuration and a factory turning configuration options
//! into a running [`Input`]. The host populates a [`Registry`] explicitly with
//! [`crate::inputs::register_all`] and then builds the inputs its
//! configuration names.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use tracing::debug;

use crate::inputs::{self, Input};

/// Turn configuration options into an [`Input`].
pub type Factory = fn(serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Input>, Error>>;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Registry`]
pub enum Error {
    /// No input is registered under the requested name.
    #[error("No input named {0:?} is registered")]
    UnknownInput(String),
    /// An input of the same name was registered before.
    #[error("Input {0:?} is already registered")]
    DuplicateInput(&'static str),
    /// The options do not deserialize into the input's configuration.
    #[error("Failed to deserialize input options: {0}")]
    Options(#[from] serde_yaml::Error),
    /// The input failed to initialize.
    #[error("Input failed to initialize: {0}")]
    Input(#[from] inputs::Error),
}

/// Everything the [`Registry`] knows about one input.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    /// Name the input is configured by.
    pub name: &'static str,
    /// One line describing the input.
    pub description: &'static str,
    /// Commented YAML showing every option of the input.
    pub sample_config: &'static str,
    /// Builds the input from its options.
    pub factory: Factory,
}

/// The set of inputs available to the host.
#[derive(Debug, Default)]
pub struct Registry {
    inputs: BTreeMap<&'static str, Registration>,
}

impl Registry {
    /// Create an empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `registration`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateInput`] if the name is taken. The registry
    /// is left unchanged in that case.
    pub fn register(&mut self, registration: Registration) -> Result<(), Error> {
        if self.inputs.contains_key(registration.name) {
            return Err(Error::DuplicateInput(registration.name));
        }
        debug!("registered input {}", registration.name);
        self.inputs.insert(registration.name, registration);
        Ok(())
    }

    /// Build the input registered as `name` from `options`.
    ///
    /// Absent options (`null`) are treated as an empty mapping so that every
    /// option falls back to its default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInput`] for an unregistered name, otherwise
    /// whatever the input's factory returns.
    pub async fn build(
        &self,
        name: &str,
        options: serde_yaml::Value,
    ) -> Result<Box<dyn Input>, Error> {
        let registration = self
            .inputs
            .get(name)
            .ok_or_else(|| Error::UnknownInput(name.to_string()))?;
        let options = if options.is_null() {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        } else {
            options
        };
        (registration.factory)(options).await
    }

    /// Names of every registered input, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs.keys().copied()
    }

    /// The registration of `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.inputs.get(name)
    }

    /// The sample configuration of `name`, if registered.
    #[must_use]
    pub fn sample_config(&self, name: &str) -> Option<&'static str> {
        self.inputs.get(name).map(|r| r.sample_config)
    }
}
