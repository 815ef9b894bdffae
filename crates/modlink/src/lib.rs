//! modlink: module identity descriptor and command channel.

mod channel;
mod command;
mod config;
mod descriptor;
mod error;
mod needs;
mod version;

pub mod bridge;
pub mod gatt;
pub mod log_sink;
pub mod server;

pub use channel::{ChannelState, ModuleDescriptorChannel};
pub use command::{
    CommandOutcome, CommandResult, EncodingFault, InboundCommand, MAX_COMMAND_LEN, ParsedCommand,
    STRUCTURED_PREFIX, StructuredCommand, Verb, parse_command,
};
pub use config::{ChannelLimits, ModuleConfig};
pub use descriptor::{
    CAPABILITY_SEPARATOR, Capabilities, EncodedDescriptor, FIELD_DELIMITER, KEY_VALUE_DELIMITER,
    ModuleDescriptor,
};
pub use error::{ConfigError, DescriptorError, EncodingOverflow, TransportError};
pub use gatt::{Characteristic, GattProfile};
pub use log_sink::{LogSink, MemorySink, TracingSink};
pub use needs::NeedsList;
pub use server::{ServeSummary, ServerConfig, serve};
pub use version::{MODLINK_VERSION, VersionInfo};
