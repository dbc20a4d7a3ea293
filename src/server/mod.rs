//! Server related code.

pub mod rest;
