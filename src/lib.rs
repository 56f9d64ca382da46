//! Corsair Link cooling controller protocol implementation.

pub mod constants;
pub mod device;
pub mod driver;
pub mod error;
pub mod link;
pub mod protocol;
pub mod queue;
pub mod register;
pub mod transport;

pub use self::driver::{Driver, DriverConfig};
pub use self::error::{Error, Result, TransportError};
pub use self::link::LinkDevice;
pub use self::protocol::{Command, Opcode, Operation};
pub use self::queue::CommandQueue;
pub use self::register::Register;
pub use self::transport::Transport;
