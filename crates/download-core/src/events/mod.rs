mod types;
pub use types::*;

mod channel;
pub use channel::*;

mod snapshot;
pub use snapshot::*;

mod bus;
pub use bus::*;

#[cfg(test)]
mod bus_tests;
