pub mod composite;
pub mod normalizer;
pub mod team;
