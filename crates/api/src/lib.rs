//! HTTP API: webhook intake and operational endpoints.

pub mod app;
pub mod signature;
