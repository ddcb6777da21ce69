//! Chatbot onboarding: account setup, website training and widget detection.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod onboarding;
pub mod random;
