//! Builders that assemble the service from configuration.

pub mod service_builder;

pub use service_builder::ServiceBuilder;
