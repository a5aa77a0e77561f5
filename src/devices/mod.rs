pub mod command;
pub mod error;
pub mod frame;
pub mod transport;
pub mod um25c;

pub use command::{encode_command, Command, CommandFamily};
pub use error::{Result, Um25cError};
pub use frame::{decode_frame, ChargingMode, DataGroup, MeasurementFrame, Model};
pub use transport::{Connector, LinkConnector, Transport};
pub use um25c::{ConnectPolicy, SessionState, UM25C};
