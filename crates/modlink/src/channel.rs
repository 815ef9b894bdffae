//! The module descriptor channel.
//!
//! Owns the descriptor, serves encodings for peer reads and dispatches
//! peer writes. Each call to [`ModuleDescriptorChannel::handle_command`] runs
//! to completion and writes exactly one console line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Level;

use crate::command::{
    CommandResult, InboundCommand, ParsedCommand, StructuredCommand, Verb, parse_command,
};
use crate::config::ChannelLimits;
use crate::descriptor::{EncodedDescriptor, ModuleDescriptor};
use crate::error::DescriptorError;
use crate::log_sink::LogSink;
use crate::needs::NeedsList;
use crate::version::VersionInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No command in flight.
    Idle,
    /// Inside `handle_command`.
    Processing,
}

/// Holds the processing flag for the duration of one command.
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ModuleDescriptorChannel {
    descriptor: Mutex<ModuleDescriptor>,
    /// Descriptor as configured at start; target of `/reset`.
    initial: ModuleDescriptor,
    limits: ChannelLimits,
    needs: NeedsList,
    processing: AtomicBool,
    sink: Arc<dyn LogSink>,
}

impl ModuleDescriptorChannel {
    /// Fails if the descriptor cannot fit `limits.value_capacity` even with
    /// every capability dropped.
    pub fn new(
        descriptor: ModuleDescriptor,
        limits: ChannelLimits,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, DescriptorError> {
        let required = descriptor.base_len();
        if required > limits.value_capacity {
            return Err(DescriptorError::CapacityTooSmall {
                required,
                capacity: limits.value_capacity,
            });
        }

        Ok(Self {
            descriptor: Mutex::new(descriptor.clone()),
            initial: descriptor,
            limits,
            needs: NeedsList::default(),
            processing: AtomicBool::new(false),
            sink,
        })
    }

    /// Images reported by `/needs`. Empty unless set here.
    pub fn with_needs(mut self, needs: NeedsList) -> Self {
        self.needs = needs;
        self
    }

    pub fn limits(&self) -> ChannelLimits {
        self.limits
    }

    pub fn needs(&self) -> &NeedsList {
        &self.needs
    }

    pub fn state(&self) -> ChannelState {
        if self.processing.load(Ordering::Acquire) {
            ChannelState::Processing
        } else {
            ChannelState::Idle
        }
    }

    /// Snapshot of the current descriptor.
    pub fn descriptor(&self) -> ModuleDescriptor {
        self.lock_descriptor().clone()
    }

    /// Encode the current descriptor within the value capacity.
    ///
    /// A truncating call writes one warning line.
    pub fn encode_descriptor(&self) -> EncodedDescriptor {
        let encoded = self.lock_descriptor().encode(self.limits.value_capacity);

        if let Some(overflow) = encoded.overflow() {
            self.sink.line(
                Level::WARN,
                &format!(
                    "Descriptor truncated: {} (dropped: {})",
                    overflow,
                    overflow.dropped.join(", ")
                ),
            );
        }
        encoded
    }

    /// Validate and dispatch one inbound buffer.
    pub fn handle_command(&self, buffer: &[u8]) -> CommandResult {
        let Some(_guard) = ProcessingGuard::try_acquire(&self.processing) else {
            let result = CommandResult::ChannelBusy;
            self.report(&result);
            return result;
        };

        let result = self.dispatch(InboundCommand::new(buffer));
        // Still Processing here: a sink that calls back in gets ChannelBusy.
        self.report(&result);
        result
    }

    fn dispatch(&self, command: InboundCommand<'_>) -> CommandResult {
        if command.is_empty() {
            return CommandResult::Empty;
        }

        let text = match command.decode(self.limits.max_command_len) {
            Ok(text) => text,
            Err(fault) => return CommandResult::InvalidEncoding(fault),
        };

        match parse_command(text) {
            ParsedCommand::Diagnostic(text) => CommandResult::Acknowledged(text.to_string()),
            ParsedCommand::Unknown(verb) => CommandResult::UnknownCommand(verb.to_string()),
            ParsedCommand::Malformed { verb, reason } => CommandResult::Rejected { verb, reason },
            ParsedCommand::Structured(command) => self.apply(command),
        }
    }

    fn apply(&self, command: StructuredCommand) -> CommandResult {
        match command {
            StructuredCommand::SetCapabilities(capabilities) => {
                self.lock_descriptor().set_capabilities(capabilities);
                CommandResult::Applied(Verb::Caps)
            }
            StructuredCommand::Reset => {
                *self.lock_descriptor() = self.initial.clone();
                CommandResult::Applied(Verb::Reset)
            }
            StructuredCommand::Version => {
                let firmware = self.lock_descriptor().version().to_string();
                json_reply(Verb::Version, &VersionInfo::new().with_firmware(firmware))
            }
            StructuredCommand::Needs => json_reply(Verb::Needs, &self.needs),
        }
    }

    fn report(&self, result: &CommandResult) {
        let level = if result.is_rejection() {
            Level::WARN
        } else {
            Level::INFO
        };
        self.sink.line(level, &result.to_string());
    }

    fn lock_descriptor(&self) -> MutexGuard<'_, ModuleDescriptor> {
        self.descriptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn json_reply(verb: Verb, body: &impl serde::Serialize) -> CommandResult {
    match serde_json::to_string(body) {
        Ok(json) => CommandResult::Acknowledged(json),
        Err(e) => CommandResult::Rejected {
            verb,
            reason: e.to_string(),
        },
    }
}

impl std::fmt::Debug for ModuleDescriptorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptorChannel")
            .field("descriptor", &*self.lock_descriptor())
            .field("limits", &self.limits)
            .field("needs", &self.needs)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{OnceLock, Weak};

    use super::*;
    use crate::command::EncodingFault;
    use crate::descriptor::Capabilities;
    use crate::log_sink::MemorySink;
    use crate::version::MODLINK_VERSION;

    fn core_module() -> ModuleDescriptor {
        ModuleDescriptor::new(
            "ESP32-CORE-001",
            "COMPUTE",
            "1.0.0",
            Capabilities::try_from_tokens(["WiFi", "BLE", "GPIO", "UART"]).unwrap(),
        )
        .unwrap()
    }

    fn channel_with(limits: ChannelLimits) -> (ModuleDescriptorChannel, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let channel = ModuleDescriptorChannel::new(core_module(), limits, sink.clone()).unwrap();
        (channel, sink)
    }

    fn channel() -> (ModuleDescriptorChannel, Arc<MemorySink>) {
        channel_with(ChannelLimits::default())
    }

    #[test]
    fn encodes_current_descriptor() {
        let (channel, sink) = channel();
        let first = channel.encode_descriptor();
        let second = channel.encode_descriptor();

        assert_eq!(
            first.as_bytes(),
            b"id=ESP32-CORE-001;type=COMPUTE;version=1.0.0;capabilities=WiFi, BLE, GPIO, UART"
        );
        assert_eq!(first, second);
        assert!(sink.is_empty());
    }

    #[test]
    fn truncation_logs_once_per_call() {
        let full = core_module().to_string().len();
        let (channel, sink) = channel_with(ChannelLimits {
            value_capacity: full - 1,
            ..ChannelLimits::default()
        });

        let encoded = channel.encode_descriptor();
        assert!(encoded.is_truncated());
        assert!(encoded.as_bytes().len() <= full - 1);
        assert!(encoded.as_bytes().ends_with(b"capabilities=WiFi, BLE, GPIO"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, Level::WARN);
        assert!(entries[0].1.contains("dropped: UART"), "{}", entries[0].1);
    }

    #[test]
    fn rejects_capacity_below_base_record() {
        let module = core_module();
        let required = module.base_len();
        let err = ModuleDescriptorChannel::new(
            module,
            ChannelLimits {
                value_capacity: required - 1,
                ..ChannelLimits::default()
            },
            Arc::new(MemorySink::new()),
        )
        .unwrap_err();

        assert_eq!(
            err,
            DescriptorError::CapacityTooSmall {
                required,
                capacity: required - 1
            }
        );
    }

    #[test]
    fn empty_write_is_a_logged_noop() {
        let (channel, sink) = channel();
        assert_eq!(channel.handle_command(b""), CommandResult::Empty);
        assert_eq!(channel.descriptor(), core_module());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn invalid_utf8_leaves_descriptor_untouched() {
        let (channel, sink) = channel();
        for raw in [&[0xc3, 0x28][..], &[0xff][..], &[b'/', b'c', 0x80][..]] {
            assert!(matches!(
                channel.handle_command(raw),
                CommandResult::InvalidEncoding(EncodingFault::NotUtf8 { .. })
            ));
        }
        assert_eq!(channel.descriptor(), core_module());
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn oversized_write_is_invalid() {
        let (channel, _sink) = channel_with(ChannelLimits {
            max_command_len: 8,
            ..ChannelLimits::default()
        });
        assert_eq!(
            channel.handle_command(b"123456789"),
            CommandResult::InvalidEncoding(EncodingFault::TooLong { len: 9, max: 8 })
        );
    }

    #[test]
    fn ping_is_acknowledged_with_one_line() {
        let (channel, sink) = channel();
        assert_eq!(
            channel.handle_command(b"PING"),
            CommandResult::Acknowledged("PING".to_string())
        );

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("PING"));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn caps_replaces_capabilities() {
        let (channel, _sink) = channel();
        assert_eq!(
            channel.handle_command(b"/caps LoRa, CAN, LoRa"),
            CommandResult::Applied(Verb::Caps)
        );
        assert_eq!(
            channel.encode_descriptor().as_bytes(),
            b"id=ESP32-CORE-001;type=COMPUTE;version=1.0.0;capabilities=LoRa, CAN"
        );
    }

    #[test]
    fn reset_restores_configured_descriptor() {
        let (channel, _sink) = channel();
        channel.handle_command(b"/caps I2C");
        assert_ne!(channel.descriptor(), core_module());

        assert_eq!(
            channel.handle_command(b"/reset"),
            CommandResult::Applied(Verb::Reset)
        );
        assert_eq!(channel.descriptor(), core_module());
    }

    #[test]
    fn unknown_and_malformed_commands_do_not_mutate() {
        let (channel, sink) = channel();
        assert_eq!(
            channel.handle_command(b"/frobnicate now"),
            CommandResult::UnknownCommand("frobnicate".to_string())
        );
        assert!(matches!(
            channel.handle_command(b"/caps a;b"),
            CommandResult::Rejected {
                verb: Verb::Caps,
                ..
            }
        ));
        assert_eq!(channel.descriptor(), core_module());

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|(level, _)| *level == Level::WARN));
    }

    #[test]
    fn version_reports_runtime_and_firmware() {
        let (channel, _sink) = channel();
        let CommandResult::Acknowledged(json) = channel.handle_command(b"/version") else {
            panic!("expected acknowledgement");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["modlink"], MODLINK_VERSION);
        assert_eq!(value["firmware"], "1.0.0");
    }

    #[test]
    fn needs_reports_configured_images() {
        let (channel, sink) = channel();
        assert_eq!(
            channel.handle_command(b"/needs"),
            CommandResult::Acknowledged(r#"{"modules":[]}"#.to_string())
        );

        let needs = NeedsList::new(["sensor-pack-v1", "display-driver-st7789"]).unwrap();
        let channel = channel.with_needs(needs);
        assert_eq!(
            channel.handle_command(b"/needs"),
            CommandResult::Acknowledged(
                r#"{"modules":["sensor-pack-v1","display-driver-st7789"]}"#.to_string()
            )
        );
        assert_eq!(channel.descriptor(), core_module());
        assert_eq!(sink.len(), 2);
    }

    /// Calls back into the channel from inside `line`, once.
    #[derive(Default)]
    struct ReentrantSink {
        channel: OnceLock<Weak<ModuleDescriptorChannel>>,
        armed: AtomicBool,
        inner: Mutex<Vec<CommandResult>>,
        lines: MemorySink,
    }

    impl LogSink for ReentrantSink {
        fn line(&self, level: Level, text: &str) {
            self.lines.line(level, text);
            if self.armed.swap(false, Ordering::AcqRel)
                && let Some(channel) = self.channel.get().and_then(Weak::upgrade)
            {
                let result = channel.handle_command(b"NESTED");
                self.inner.lock().unwrap().push(result);
            }
        }
    }

    #[test]
    fn reentrant_call_gets_channel_busy() {
        let sink = Arc::new(ReentrantSink::default());
        let channel = Arc::new(
            ModuleDescriptorChannel::new(core_module(), ChannelLimits::default(), sink.clone())
                .unwrap(),
        );
        sink.channel.set(Arc::downgrade(&channel)).unwrap();
        sink.armed.store(true, Ordering::Release);

        assert_eq!(
            channel.handle_command(b"PING"),
            CommandResult::Acknowledged("PING".to_string())
        );
        assert_eq!(*sink.inner.lock().unwrap(), vec![CommandResult::ChannelBusy]);
        assert_eq!(
            sink.lines.lines(),
            vec!["New value: PING", "Rejected write: channel busy"]
        );
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn commands_apply_in_order() {
        let (channel, sink) = channel();
        channel.handle_command(b"/caps A");
        channel.handle_command(b"/caps B");
        channel.handle_command(b"hello");

        assert_eq!(
            channel.descriptor().capabilities().iter().collect::<Vec<_>>(),
            vec!["B"]
        );
        assert_eq!(
            sink.lines(),
            vec!["Applied /caps", "Applied /caps", "New value: hello"]
        );
    }
}
