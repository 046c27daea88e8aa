//! bluetoothctl backend: subprocess runner, output parsers, and the live
//! connectivity probe.

pub mod error;
pub mod parser;
pub mod probe;
pub mod runner;

pub use error::BtError;
pub use probe::ConnectivityProbe;
pub use runner::{BluetoothctlRunner, BtCommandRunner};
