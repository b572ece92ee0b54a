pub mod accounts;
pub mod auth;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod seed;
pub mod sql;
pub mod tls;
pub mod wire;
