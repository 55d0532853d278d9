//! Process lifecycle of the daemon

mod shutdown;

pub use shutdown::ShutdownSignal;
