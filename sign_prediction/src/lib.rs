mod ort_detector;
mod ort_service;
mod routes;

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod extractor;
pub mod frame;
pub mod labels;
pub mod registry;
pub mod response;
pub mod server;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use dispatcher::PredictionDispatcher;
pub use response::{Prediction, PredictionResult};
pub use server::start_server;
