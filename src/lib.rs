//! Squad Tactics - tick-driven battle units for a turn-based and real-time tactical game

pub mod battle;
pub mod core;
