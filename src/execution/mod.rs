pub mod batch_submitter;
pub mod clob_auth;
pub mod clob_client;
pub mod executor;
pub mod live;
pub mod order_builder;
pub mod paper;
