// src/services/mod.rs

pub mod check_in;
pub mod class_session;
pub mod gamification;
pub mod reports;

#[cfg(test)]
pub(crate) mod test_support;
