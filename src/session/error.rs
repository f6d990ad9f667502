use crate::identity::UsernameError;

/// Failure raised by a capability during a session operation.
///
/// Every variant is recovered at the operation boundary: connect-flow
/// failures land in the single status message slot, username failures in the
/// field-level slot. Nothing here is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("wallet extension not detected")]
    DetectionFailed,
    #[error("connection request was declined by the user")]
    UserDeclined,
    #[error("wallet provider error: {0}")]
    Provider(String),
    #[error("identity backend error: {0}")]
    Backend(String),
    #[error("username is already taken")]
    UsernameTaken,
    #[error("session storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// The string shown in the login screen's status slot. Wording follows
    /// the web client.
    pub fn user_message(&self) -> String {
        match self {
            Self::DetectionFailed => {
                "Freighter wallet not detected. Please install it from freighter.app".to_string()
            }
            Self::UserDeclined => "Connection request was rejected. Please try again.".to_string(),
            Self::Provider(detail) => format!("Failed to connect wallet: {detail}"),
            Self::Backend(_) => "Failed to connect wallet. Please try again.".to_string(),
            Self::UsernameTaken => "That username is already taken.".to_string(),
            Self::Storage(_) => "Failed to save your session. Please try again.".to_string(),
        }
    }
}

/// Field-level state of the username editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameIssue {
    Invalid(UsernameError),
    Taken,
    SaveFailed,
}

impl UsernameIssue {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(err) => err.to_string(),
            Self::Taken => "That username is already taken.".to_string(),
            Self::SaveFailed => "Could not save username. Please try again.".to_string(),
        }
    }
}
