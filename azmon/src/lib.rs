//! The azmon metrics collector.
//!
//! azmon polls cloud monitoring APIs on a fixed interval and republishes what
//! it finds as timestamped samples. Each supported API is an
//! [`inputs::Input`], built by name from a [`registry::Registry`] and handed
//! an [`azmon_capture::Accumulator`] to emit into. This library supports the
//! azmon binary found elsewhere in this project.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod credential;
pub mod inputs;
pub mod registry;
