// ABOUTME: Remote execution error types with SNAFU pattern.
// ABOUTME: Every variant names the host; kind() gives callers something to match on.

use snafu::Snafu;

use super::ssh::SessionError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RemoteError {
    #[snafu(display("cannot reach {host}: {source}"))]
    Session { host: String, source: SessionError },

    #[snafu(display("`{command}` on {host} exited with {exit_code}: {stderr}"))]
    CommandFailed {
        host: String,
        command: String,
        exit_code: u32,
        stderr: String,
    },

    #[snafu(display("instance {name} not found on {host}"))]
    NotFound { host: String, name: String },

    #[snafu(display("unreadable agent output from {host}: {reason}"))]
    BadOutput { host: String, reason: String },

    #[snafu(display("cannot encode descriptor for {name} on {host}: {source}"))]
    Encode {
        host: String,
        name: String,
        source: serde_yaml::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Could not connect or authenticate.
    Unreachable,
    /// The remote command did not finish in time.
    Timeout,
    /// The host agent ran and reported failure.
    CommandFailed,
    /// The named instance does not exist on the host.
    NotFound,
    /// The host agent printed something we could not parse.
    BadOutput,
    /// The instance descriptor could not be serialized.
    Encode,
}

impl RemoteError {
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Session { source, .. } => match source {
                SessionError::CommandTimeout(_) => RemoteErrorKind::Timeout,
                _ => RemoteErrorKind::Unreachable,
            },
            RemoteError::CommandFailed { .. } => RemoteErrorKind::CommandFailed,
            RemoteError::NotFound { .. } => RemoteErrorKind::NotFound,
            RemoteError::BadOutput { .. } => RemoteErrorKind::BadOutput,
            RemoteError::Encode { .. } => RemoteErrorKind::Encode,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            RemoteError::Session { host, .. }
            | RemoteError::CommandFailed { host, .. }
            | RemoteError::NotFound { host, .. }
            | RemoteError::BadOutput { host, .. }
            | RemoteError::Encode { host, .. } => host,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == RemoteErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeouts_have_their_own_kind() {
        let err = RemoteError::Session {
            host: "web1".to_string(),
            source: SessionError::CommandTimeout(Duration::from_secs(5)),
        };
        assert_eq!(err.kind(), RemoteErrorKind::Timeout);
        assert_eq!(err.host(), "web1");
    }

    #[test]
    fn not_found_is_recognised() {
        let err = RemoteError::NotFound {
            host: "web1".to_string(),
            name: "billing-v3-abcd1234-web-5000".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("not found on web1"));
    }
}
