// Core library for the scorecast live-score notifier.
//
// Holds the game state sources, the notification decision engine, chat
// dispatch, persistence and configuration. The server crate wires these
// together behind HTTP and a polling scheduler.

pub mod config;
pub mod db;
pub mod game;
pub mod notify;
