use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// SMTP reply codes produced by the directory hooks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug, Serialize, Deserialize)]
pub enum Status {
    AuthSucceeded,
    Ok,
    ActionUnavailable,
    AuthTemporaryFailure,
    AuthFailed,
    MailboxUnavailable,
    Unknown(u32),
}

impl Status {
    /// Checks if the status is a permanent rejection
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    #[must_use]
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            235 => Self::AuthSucceeded,
            250 => Self::Ok,
            451 => Self::ActionUnavailable,
            454 => Self::AuthTemporaryFailure,
            535 => Self::AuthFailed,
            550 => Self::MailboxUnavailable,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::AuthSucceeded => 235,
            Status::Ok => 250,
            Status::ActionUnavailable => 451,
            Status::AuthTemporaryFailure => 454,
            Status::AuthFailed => 535,
            Status::MailboxUnavailable => 550,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}
