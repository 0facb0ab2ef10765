//! Error taxonomy for the container lifecycle and registry queries.

use std::fmt;

/// Result type alias for inspector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What was already taken when a launch collided with another container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The host port is bound by a different service.
    Port,
    /// A container with the derived name already exists.
    Name(String),
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port => f.write_str("already used by a different service"),
            Self::Name(name) => write!(f, "already used by container with name: {name}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Neither podman nor docker was found on `PATH`.
    #[error("docker or podman needs to be installed on the platform")]
    MissingContainerPlatform,

    /// Expected contention. Drives the port search, never retried in place.
    #[error("port {port} is {conflict}")]
    AddressAlreadyInUse { port: u16, conflict: Conflict },

    #[error("no free port has been found after {attempts} attempts")]
    NoFreePortFound { attempts: u16 },

    /// Engine failure or readiness timeout.
    #[error("{0}")]
    Launch(String),

    #[error("image is not running")]
    NotRunning,

    /// The session was cancelled and its container torn down.
    #[error("inspection was cancelled")]
    Cancelled,

    #[error("command `{command}` failed (exit {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to invoke `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("answer from the registry is empty")]
    EmptyResponse,

    #[error("answer from the registry is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Port or container-name collision; the caller should move to the next port.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AddressAlreadyInUse { .. })
    }

    /// Whether another launch at the same port may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Launch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_launch_errors_are_retryable() {
        assert!(Error::Launch("boom".into()).is_retryable());
        assert!(
            !Error::AddressAlreadyInUse {
                port: 50051,
                conflict: Conflict::Port
            }
            .is_retryable()
        );
        assert!(!Error::MissingContainerPlatform.is_retryable());
        assert!(!Error::NoFreePortFound { attempts: 100 }.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::Cancelled.is_conflict());
    }

    #[test]
    fn conflicts_are_classified() {
        let name = Error::AddressAlreadyInUse {
            port: 50052,
            conflict: Conflict::Name("c_50052".into()),
        };
        assert!(name.is_conflict());
        assert!(!Error::Launch("x".into()).is_conflict());
    }

    #[test]
    fn messages_name_the_port_and_count() {
        let err = Error::AddressAlreadyInUse {
            port: 50051,
            conflict: Conflict::Name("box_50051".into()),
        };
        assert_eq!(
            err.to_string(),
            "port 50051 is already used by container with name: box_50051"
        );
        assert_eq!(
            Error::NoFreePortFound { attempts: 100 }.to_string(),
            "no free port has been found after 100 attempts"
        );
    }
}
