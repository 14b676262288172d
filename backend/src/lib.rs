pub mod assessment;
pub mod config;
pub mod inference;
pub mod lambda;
pub mod logging;
pub mod routes;
