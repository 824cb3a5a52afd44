pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod ledger;
pub mod media;
pub mod payment;
pub mod room;
pub mod sweeper;
