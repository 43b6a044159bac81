// src/models/mod.rs

pub mod attendance;
pub mod class_session;
pub mod directory;
pub mod progress;
pub mod report;
pub mod user;
