//! Media-Token Minter (C3, spec §4.3).

pub mod token;

pub use token::{MediaToken, MediaTokenMinter, Role};
