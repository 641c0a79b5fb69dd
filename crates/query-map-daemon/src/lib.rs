//! HTTP front end for the `query-map` converter: environment configuration,
//! telemetry setup and the conversion routes.

pub mod server;
pub mod telemetry;
