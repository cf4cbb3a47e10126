pub mod compose;
pub mod filter;
pub mod mapper;
pub mod metrics;
