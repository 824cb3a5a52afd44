pub mod auth;
pub mod credits;
pub mod duet;
pub mod health;
pub mod rooms;
pub mod songs;
