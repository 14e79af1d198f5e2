use serde::Serialize;

/// All errors that can occur while building previews or running shell commands.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Interpreter error: {0}")]
    Interpreter(String),

    #[error("{0}")]
    Custom(String),
}

// Events carry errors to the UI layer as plain strings.
impl Serialize for PreviewError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_display_string() {
        let err = PreviewError::Interpreter("boot failed".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Interpreter error: boot failed\"");
    }
}
