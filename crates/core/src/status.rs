//! Lifecycle vocabularies and the mapping from upstream spellings.
//!
//! Statuses are stored as lowercase text in the database; the `as_str`
//! spelling of each variant is the stored value.

use serde::{Deserialize, Serialize};

/// Duration (seconds) below which an answered call counts as low interaction.
pub const LOW_INTERACTION_THRESHOLD_SECS: i32 = 10;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// The stored (database) spelling.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Parse the stored spelling. Returns `None` for anything else.
            pub fn from_db(value: &str) -> Option<Self> {
                match value {
                    $( $text => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum! {
    /// Lifecycle of one outbound dialing job.
    CampaignStatus {
        Pending = "pending",
        Active = "active",
        Paused = "paused",
        InProgress = "in_progress",
        Completed = "completed",
        Failed = "failed",
        Cancelled = "cancelled",
        RetryScheduled = "retry_scheduled",
    }
}

text_enum! {
    /// Outcome of one attempted call.
    CallLineStatus {
        Pending = "pending",
        Completed = "completed",
        Failed = "failed",
        Busy = "busy",
        NoAnswer = "no-answer",
        Cancelled = "cancelled",
    }
}

text_enum! {
    /// How much the contact engaged with the call.
    Interaction {
        NoInteraction = "no_interaction",
        LowInteraction = "low_interaction",
        Completed = "completed",
        Transfer = "transfer",
    }
}

fn key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

impl CampaignStatus {
    /// Unify an upstream status spelling. Unknown spellings map to
    /// [`CampaignStatus::Pending`].
    pub fn unify(raw: &str) -> Self {
        match key(raw).as_str() {
            "active" | "running" | "ongoing" | "live" => Self::Active,
            "paused" | "on_hold" => Self::Paused,
            "in_progress" | "inprogress" | "processing" | "dispatching" | "executing" => {
                Self::InProgress
            }
            "completed" | "complete" | "finished" | "done" | "success" => Self::Completed,
            "failed" | "failure" | "error" | "errored" => Self::Failed,
            "cancelled" | "canceled" | "stopped" | "aborted" => Self::Cancelled,
            "retry_scheduled" | "rescheduled" | "retry" | "retrying" => Self::RetryScheduled,
            _ => Self::Pending,
        }
    }

    /// Terminal campaigns receive no further dialing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Whether a snapshot with status `incoming` may be written to the cache.
///
/// Active campaigns change on every poll, so they are not cached, except
/// when the cached record is paused: a resumed or retried campaign is
/// always persisted so the pause does not linger locally.
pub fn cache_eligible(incoming: CampaignStatus, previous: Option<CampaignStatus>) -> bool {
    incoming != CampaignStatus::Active || previous == Some(CampaignStatus::Paused)
}

impl CallLineStatus {
    /// Unify a call status spelling from the campaign platform or carrier.
    /// Unknown spellings (queued, ringing, initiated, ...) map to
    /// [`CallLineStatus::Pending`].
    pub fn unify(raw: &str) -> Self {
        match key(raw).as_str() {
            "completed" | "complete" | "answered" | "call_disconnected" | "finished"
            | "transferred" | "success" => Self::Completed,
            "failed" | "failure" | "error" | "errored" => Self::Failed,
            "busy" | "user_busy" => Self::Busy,
            "no_answer" | "noanswer" | "not_answered" | "unanswered" | "missed" => {
                Self::NoAnswer
            }
            "cancelled" | "canceled" | "stopped" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

impl Interaction {
    /// Parse an explicit interaction label from upstream, if recognizable.
    pub fn parse(raw: &str) -> Option<Self> {
        match key(raw).as_str() {
            "no_interaction" | "none" => Some(Self::NoInteraction),
            "low_interaction" | "low" => Some(Self::LowInteraction),
            "completed" | "complete" | "full" => Some(Self::Completed),
            "transfer" | "transferred" | "call_transfer" => Some(Self::Transfer),
            _ => None,
        }
    }

    /// Derive the interaction from the call outcome when upstream does not
    /// label it.
    pub fn derive(status: CallLineStatus, duration_secs: i32, transferred: bool) -> Self {
        if status != CallLineStatus::Completed {
            return Self::NoInteraction;
        }
        if transferred {
            return Self::Transfer;
        }
        if duration_secs < LOW_INTERACTION_THRESHOLD_SECS {
            Self::LowInteraction
        } else {
            Self::Completed
        }
    }
}
