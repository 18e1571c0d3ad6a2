// Server library: the HTTP trigger surface and the polling scheduler. The
// binary in main.rs wires them to the core notifier.

pub mod scheduler;
pub mod server;
