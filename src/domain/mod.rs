pub mod archive;
pub mod contest;
pub mod models;
pub mod questions;
pub mod schedule;
pub mod voting;
