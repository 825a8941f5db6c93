pub mod db;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
pub mod time_utils;
pub mod web;
