//! Identifier newtypes shared across the runtime.
//!
//! Trace and conversation correlators are opaque non-empty strings, minted
//! as UUIDs at submission time and then carried verbatim on every envelope
//! of the conversation. Agent names double as the root of the
//! `agent_<name>_tasks` stream convention, so they are restricted to
//! characters that convention can round-trip.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A UUID-minted correlator that is inherited, never regenerated, once a
/// message enters the system.
macro_rules! correlator {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh correlator (submission time only).
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Adopt a correlator received on the wire.
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

correlator!(TraceId);
correlator!(ConversationId);

/// An agent's stable name, and the root of its stream identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentName(String);

impl AgentName {
    /// Validate a name. Restricted to `[A-Za-z0-9_-]` so the stream
    /// convention below stays reversible.
    pub fn from_string(s: String) -> Result<Self, &'static str> {
        if s.is_empty() {
            return Err("AgentName cannot be empty");
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err("AgentName may only contain [A-Za-z0-9_-]");
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Input stream for this agent, per the `agent_<name>_tasks` convention.
    ///
    /// This is the sole mapping between agent names and stream identifiers;
    /// producers and consumers both go through it.
    pub fn task_stream(&self) -> String {
        format!("agent_{}_tasks", self.0)
    }

    /// Recover an agent name from its task stream identifier.
    pub fn from_task_stream(stream: &str) -> Option<Self> {
        stream
            .strip_prefix("agent_")
            .and_then(|rest| rest.strip_suffix("_tasks"))
            .and_then(|name| Self::from_string(name.to_string()).ok())
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
