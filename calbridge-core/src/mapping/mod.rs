//! Translation between host items and remote event groups.
//!
//! Every sub-mapper is a set of free functions over a [`MappingContext`] and
//! the values it converts. Only the [`EventMapper`] touches collaborators.

pub mod attendees;
pub mod category;
pub mod event_mapper;
pub mod exceptions;
pub mod privacy;
pub mod recurrence;
pub mod reminder;

use chrono::{DateTime, Utc};

use crate::config::MappingConfiguration;
use crate::logging::MappingLogger;

pub use event_mapper::EventMapper;

/// Mailbox addresses that identify the local user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnIdentity {
    /// Address of the host mailbox
    pub host_email: Option<String>,
    /// Address the remote server knows the user by, if different
    pub server_email: Option<String>,
}

impl OwnIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            host_email: Some(email.into()),
            server_email: None,
        }
    }

    pub fn with_server_email(mut self, email: impl Into<String>) -> Self {
        self.server_email = Some(email.into());
        self
    }

    /// Case-insensitive match against any of the user's addresses.
    pub fn matches(&self, email: &str) -> bool {
        let email = email.trim();
        [&self.host_email, &self.server_email]
            .into_iter()
            .flatten()
            .any(|own| own.trim().eq_ignore_ascii_case(email))
    }

    /// Address used when the user has to be written out as a participant.
    pub fn preferred_email(&self) -> Option<&str> {
        self.server_email
            .as_deref()
            .or(self.host_email.as_deref())
    }
}

/// Everything a sub-mapper may consult during one mapping call.
#[derive(Clone, Copy)]
pub struct MappingContext<'a> {
    pub config: &'a MappingConfiguration,
    pub logger: &'a dyn MappingLogger,
    pub identity: &'a OwnIdentity,
    pub now: DateTime<Utc>,
}

impl<'a> MappingContext<'a> {
    pub fn warn(&self, message: &str) {
        crate::logging::warn(self.logger, message);
    }

    pub fn warn_with_cause(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        crate::logging::warn_with_cause(self.logger, message, cause);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_identity_matches_either_address() {
        let identity = OwnIdentity::new("Me@Example.com").with_server_email("me@server.org");
        assert!(identity.matches("me@example.com"));
        assert!(identity.matches(" ME@SERVER.ORG "));
        assert!(!identity.matches("you@example.com"));
        assert_eq!(identity.preferred_email(), Some("me@server.org"));
    }
}
