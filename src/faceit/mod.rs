pub mod aliases;
pub mod client;
pub mod parse;

pub use client::{FaceitApi, HttpFaceitApi};
