//! Argument handling for the fleet controller, kept separate from `main`
//! for testability.

pub mod args;
