//! Pavement analysis request portal and job dispatch service.
//!
//! Clients file analysis requests (road-network geometry as GeoJSON);
//! each request's jobs are dispatched over Redis to an external ML
//! worker pool, and worker replies are correlated back onto the job
//! rows, including retrieval of result artifacts from object storage.

pub mod app_state;
pub mod config;
pub mod db;
pub mod messaging;
pub mod models;
pub mod routes;
pub mod services;
