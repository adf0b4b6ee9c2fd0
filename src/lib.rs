//! Tour engine — guided product tours over a pluggable UI.

pub mod analytics;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod locator;
pub mod navigation;
pub mod render;
pub mod runtime;
pub mod store;
