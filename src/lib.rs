pub mod balance;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod forest;
pub mod formation;
pub mod normalize;
pub mod pipeline;
pub mod report_export;
pub mod scaler;
pub mod schema;
pub mod source;
pub mod table;
pub mod tactical;
