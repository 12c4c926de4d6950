//! # Control commands delivered by the control authority.
//!
//! The authority calls the registered handler with a raw triple
//! `(control, event_type, event_data)`. [`ControlCommand::decode`] turns it into a
//! typed command; backends read the pointer payload into [`EventPayload`] first.
//!
//! ```text
//! (0x1, _, _)                  → Stop
//! (0x5, _, _)                  → Shutdown
//! (0x4, _, _)                  → Interrogate
//! (0xD, pbt, _)                → PowerEvent(PowerEvent::from_raw(pbt))
//! (0xE, reason, session)       → SessionChange { reason, session_id }
//! (0x10, _, old/new filetime)  → TimeChange { old, new }
//! (code, _, _)                 → Other(code)
//! ```

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Raw `SERVICE_CONTROL_*` codes.
pub mod codes {
    pub const STOP: u32 = 0x0000_0001;
    pub const PAUSE: u32 = 0x0000_0002;
    pub const CONTINUE: u32 = 0x0000_0003;
    pub const INTERROGATE: u32 = 0x0000_0004;
    pub const SHUTDOWN: u32 = 0x0000_0005;
    pub const PARAM_CHANGE: u32 = 0x0000_0006;
    pub const HARDWARE_PROFILE_CHANGE: u32 = 0x0000_000C;
    pub const POWER_EVENT: u32 = 0x0000_000D;
    pub const SESSION_CHANGE: u32 = 0x0000_000E;
    pub const PRESHUTDOWN: u32 = 0x0000_000F;
    pub const TIME_CHANGE: u32 = 0x0000_0010;
}

/// `FILETIME` value (100ns ticks since 1601-01-01) of the Unix epoch.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Power broadcast (`PBT_*`) carried by a power event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    QuerySuspend,
    QuerySuspendFailed,
    Suspend,
    ResumeCritical,
    ResumeSuspend,
    BatteryLow,
    PowerStatusChange,
    OemEvent,
    ResumeAutomatic,
    PowerSettingChange,
    Other(u32),
}

impl PowerEvent {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x0000 => PowerEvent::QuerySuspend,
            0x0002 => PowerEvent::QuerySuspendFailed,
            0x0004 => PowerEvent::Suspend,
            0x0006 => PowerEvent::ResumeCritical,
            0x0007 => PowerEvent::ResumeSuspend,
            0x0009 => PowerEvent::BatteryLow,
            0x000A => PowerEvent::PowerStatusChange,
            0x000B => PowerEvent::OemEvent,
            0x0012 => PowerEvent::ResumeAutomatic,
            0x8013 => PowerEvent::PowerSettingChange,
            other => PowerEvent::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            PowerEvent::QuerySuspend => 0x0000,
            PowerEvent::QuerySuspendFailed => 0x0002,
            PowerEvent::Suspend => 0x0004,
            PowerEvent::ResumeCritical => 0x0006,
            PowerEvent::ResumeSuspend => 0x0007,
            PowerEvent::BatteryLow => 0x0009,
            PowerEvent::PowerStatusChange => 0x000A,
            PowerEvent::OemEvent => 0x000B,
            PowerEvent::ResumeAutomatic => 0x0012,
            PowerEvent::PowerSettingChange => 0x8013,
            PowerEvent::Other(raw) => raw,
        }
    }
}

/// Reason (`WTS_*`) carried by a session-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChangeReason {
    ConsoleConnect,
    ConsoleDisconnect,
    RemoteConnect,
    RemoteDisconnect,
    SessionLogon,
    SessionLogoff,
    SessionLock,
    SessionUnlock,
    SessionRemoteControl,
    SessionCreate,
    SessionTerminate,
    Other(u32),
}

impl SessionChangeReason {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x1 => SessionChangeReason::ConsoleConnect,
            0x2 => SessionChangeReason::ConsoleDisconnect,
            0x3 => SessionChangeReason::RemoteConnect,
            0x4 => SessionChangeReason::RemoteDisconnect,
            0x5 => SessionChangeReason::SessionLogon,
            0x6 => SessionChangeReason::SessionLogoff,
            0x7 => SessionChangeReason::SessionLock,
            0x8 => SessionChangeReason::SessionUnlock,
            0x9 => SessionChangeReason::SessionRemoteControl,
            0xA => SessionChangeReason::SessionCreate,
            0xB => SessionChangeReason::SessionTerminate,
            other => SessionChangeReason::Other(other),
        }
    }
}

/// Payload read from the `event_data` pointer, when the control code has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventPayload {
    #[default]
    None,
    /// `WTSSESSION_NOTIFICATION.dwSessionId`.
    Session { session_id: u32 },
    /// `SERVICE_TIMECHANGE_INFO` as raw `FILETIME` ticks.
    TimeChange { old_filetime: i64, new_filetime: i64 },
}

/// Typed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
    Shutdown,
    Interrogate,
    PowerEvent(PowerEvent),
    SessionChange {
        reason: SessionChangeReason,
        session_id: u32,
    },
    TimeChange {
        old: SystemTime,
        new: SystemTime,
    },
    /// Any code without dedicated handling (including pause/continue and
    /// pre-shutdown).
    Other(u32),
}

impl ControlCommand {
    /// Decodes the raw handler arguments.
    ///
    /// A session change without payload reports session `0`; a time change
    /// without payload cannot be decoded and falls back to [`ControlCommand::Other`].
    pub fn decode(control: u32, event_type: u32, payload: EventPayload) -> Self {
        match control {
            codes::STOP => ControlCommand::Stop,
            codes::SHUTDOWN => ControlCommand::Shutdown,
            codes::INTERROGATE => ControlCommand::Interrogate,
            codes::POWER_EVENT => ControlCommand::PowerEvent(PowerEvent::from_raw(event_type)),
            codes::SESSION_CHANGE => {
                let session_id = match payload {
                    EventPayload::Session { session_id } => session_id,
                    _ => 0,
                };
                ControlCommand::SessionChange {
                    reason: SessionChangeReason::from_raw(event_type),
                    session_id,
                }
            }
            codes::TIME_CHANGE => match payload {
                EventPayload::TimeChange {
                    old_filetime,
                    new_filetime,
                } => ControlCommand::TimeChange {
                    old: filetime_to_system_time(old_filetime),
                    new: filetime_to_system_time(new_filetime),
                },
                _ => ControlCommand::Other(control),
            },
            other => ControlCommand::Other(other),
        }
    }

    /// Raw control code.
    pub fn code(&self) -> u32 {
        match self {
            ControlCommand::Stop => codes::STOP,
            ControlCommand::Shutdown => codes::SHUTDOWN,
            ControlCommand::Interrogate => codes::INTERROGATE,
            ControlCommand::PowerEvent(_) => codes::POWER_EVENT,
            ControlCommand::SessionChange { .. } => codes::SESSION_CHANGE,
            ControlCommand::TimeChange { .. } => codes::TIME_CHANGE,
            ControlCommand::Other(code) => *code,
        }
    }

    /// Short stable name for logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Stop => "stop",
            ControlCommand::Shutdown => "shutdown",
            ControlCommand::Interrogate => "interrogate",
            ControlCommand::PowerEvent(_) => "power_event",
            ControlCommand::SessionChange { .. } => "session_change",
            ControlCommand::TimeChange { .. } => "time_change",
            ControlCommand::Other(_) => "other",
        }
    }

    /// Commands the authority sends often enough to flood the log.
    pub fn is_noisy(&self) -> bool {
        matches!(
            self,
            ControlCommand::Interrogate
                | ControlCommand::PowerEvent(_)
                | ControlCommand::SessionChange { .. }
        )
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::PowerEvent(ev) => write!(f, "power_event({ev:?})"),
            ControlCommand::SessionChange { reason, session_id } => {
                write!(f, "session_change({reason:?}, session={session_id})")
            }
            ControlCommand::Other(code) => write!(f, "other({code:#x})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Converts `FILETIME` ticks into [`SystemTime`].
pub fn filetime_to_system_time(ticks: i64) -> SystemTime {
    let delta = i128::from(ticks) - i128::from(FILETIME_UNIX_EPOCH);
    let per_sec = i128::from(FILETIME_TICKS_PER_SEC);
    let magnitude = delta.unsigned_abs();
    let secs = (magnitude / per_sec as u128) as u64;
    let nanos = ((magnitude % per_sec as u128) * 100) as u32;
    let offset = Duration::new(secs, nanos);

    if delta >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}
