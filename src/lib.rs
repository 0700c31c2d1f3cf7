//! seasonsplit - logical season reconstruction for merged provider seasons

pub mod cli;
pub mod config;
pub mod services;
pub mod split;
