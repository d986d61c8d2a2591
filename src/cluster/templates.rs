//! Boot script and data-store templates.
//!
//! Templates are plain text carrying literal placeholder tokens. Rendering
//! is exact substitution: no escaping, no syntax, each token replaced
//! independently in a fixed order.

use thiserror::Error;

use crate::files::{expand_tilde, read_to_string};

/// Placeholder for the coordinator address.
pub const SERVER_IP: &str = "SERVER_IP";
/// Placeholder for the coordinator host name.
pub const SERVER_HOSTNAME: &str = "SERVER_HOSTNAME";
/// Placeholder for the coordinator alias.
pub const SERVER_ALIAS: &str = "SERVER_ALIAS";

/// Host name workers use for the coordinator.
pub const COORDINATOR_HOSTNAME: &str = "master";

/// Errors raised while loading templates.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TemplateError {
    /// Raised when a template path is empty or only whitespace.
    #[error("template path for {kind} must not be empty")]
    PathEmpty {
        /// Which template was being loaded.
        kind: &'static str,
    },
    /// Raised when reading the template fails.
    #[error("failed to read {kind} template `{path}`: {message}")]
    FileRead {
        /// Which template was being loaded.
        kind: &'static str,
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Reads the template at `path`, expanding a leading `~`.
///
/// # Errors
///
/// Returns [`TemplateError`] when the path is blank or unreadable.
pub fn load_template(kind: &'static str, path: &str) -> Result<String, TemplateError> {
    if path.trim().is_empty() {
        return Err(TemplateError::PathEmpty { kind });
    }
    let expanded = expand_tilde(path);
    read_to_string(&expanded).map_err(|message| TemplateError::FileRead {
        kind,
        path: expanded,
        message,
    })
}

/// Values substituted into a template.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Substitutions<'a> {
    /// Replaces [`SERVER_IP`].
    pub server_ip: &'a str,
    /// Replaces [`SERVER_HOSTNAME`].
    pub server_hostname: &'a str,
    /// Replaces [`SERVER_ALIAS`].
    pub server_alias: &'a str,
}

impl<'a> Substitutions<'a> {
    /// Substitutions pointing workers at the coordinator reachable on
    /// `address`.
    #[must_use]
    pub const fn coordinator(address: &'a str) -> Self {
        Self {
            server_ip: address,
            server_hostname: COORDINATOR_HOSTNAME,
            server_alias: "",
        }
    }

    /// Renders `template`, replacing `SERVER_IP`, then `SERVER_HOSTNAME`,
    /// then `SERVER_ALIAS`.
    ///
    /// # Examples
    ///
    /// ```
    /// use armada::cluster::Substitutions;
    ///
    /// let rendered = Substitutions::coordinator("10.0.0.1")
    ///     .apply("join SERVER_IP as SERVER_HOSTNAME[SERVER_ALIAS]");
    /// assert_eq!(rendered, "join 10.0.0.1 as master[]");
    /// ```
    #[must_use]
    pub fn apply(&self, template: &str) -> String {
        template
            .replace(SERVER_IP, self.server_ip)
            .replace(SERVER_HOSTNAME, self.server_hostname)
            .replace(SERVER_ALIAS, self.server_alias)
    }
}
