#![forbid(unsafe_code)]

//! Scoreboard demo: a headless network driving the engine against an
//! in-memory backend.

pub mod cli;
pub mod logging;
pub mod scenario;
