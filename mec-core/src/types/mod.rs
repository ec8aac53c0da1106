pub mod bid;
pub mod domain;
pub mod endpoint;
pub mod service;
pub mod service_id;
