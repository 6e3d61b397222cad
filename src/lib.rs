pub mod asset;
pub mod config;
pub mod error;
pub mod form;
pub mod generation;
pub mod ledger;
pub mod metadata;
pub mod pipeline;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod wallet;
