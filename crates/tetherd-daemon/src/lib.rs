//! tetherd daemon internals: the connection monitor, its persistence and
//! relay stores, the Unix-socket control server, and the actuator harness.

pub mod actuator;
pub mod client;
pub mod debounce;
pub mod monitor;
pub mod poller;
pub mod preflight;
pub mod relay;
pub mod server;
pub mod status;
pub mod store;
pub mod wake;
