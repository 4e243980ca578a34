//! Lifecycle statuses and scan outcome flags
//!
//! Stored as SCREAMING_SNAKE_CASE text in both databases and on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing a status or flag from its text form
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$doc:meta])* $name:ident, $kind:literal, { $($(#[$vdoc:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vdoc])* $variant,)+
        }

        impl $name {
            /// Text form used in the databases and on the wire
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

text_enum! {
    /// Lifecycle of one intended visit.
    ///
    /// Allocated PENDING at issuance, ENTERED at the first gate scan, then
    /// EXITED at the matching exit or EXPIRED via forced-entry displacement,
    /// expired-token presentation or the midnight closer.
    EntryStatus, "entry status", {
        Pending => "PENDING",
        Entered => "ENTERED",
        Exited => "EXITED",
        Expired => "EXPIRED",
    }
}

impl EntryStatus {
    /// True once the visit can no longer transition further at the gate
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Exited | Self::Expired)
    }
}

text_enum! {
    /// How an entry scan was classified at the gate.
    EntryFlag, "entry flag", {
        NormalEntry => "NORMAL_ENTRY",
        /// The scan displaced one or more still-open entries for the roll
        ForcedEntry => "FORCED_ENTRY",
        /// Reserved: re-scans are reported to the operator but never stored
        DuplicateEntry => "DUPLICATE_ENTRY",
    }
}

text_enum! {
    /// How an exit scan was classified at the gate.
    ExitFlag, "exit flag", {
        NormalExit => "NORMAL_EXIT",
        /// Exit via a short-lived emergency token
        EmergencyExit => "EMERGENCY_EXIT",
        /// No matching entry could be resolved; `entry_id` stays null
        OrphanExit => "ORPHAN_EXIT",
        /// Synthesised by the midnight closer for stale entries
        AutoExit => "AUTO_EXIT",
        /// The referenced entry already had an exit on record
        DuplicateExit => "DUPLICATE_EXIT",
    }
}

text_enum! {
    /// Replication event kinds carried by the outbox.
    EventType, "event type", {
        Entry => "ENTRY",
        Exit => "EXIT",
        /// Advisory: an entry token was presented after expiry
        EntryExpiredSeen => "ENTRY_EXPIRED_SEEN",
    }
}
