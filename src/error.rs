//! Setup-time errors. Runtime geometric degeneracies never surface here; they
//! resolve to safe defaults inside the algorithms.

#[derive(Debug, thiserror::Error)]
pub enum RdwError {
    #[error("Invalid gain bounds: {0}")]
    InvalidGainBounds(String),

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Degenerate polygon: {0}")]
    DegeneratePolygon(String),

    #[error("Unknown strategy name: {0}")]
    UnknownStrategy(String),

    #[error("Space index {index} out of range ({count} spaces)")]
    SpaceIndexOutOfRange { index: usize, count: usize },

    #[error("Trial requires at least one avatar")]
    NoAvatars,

    #[error("Expected {expected} poses, got {actual}")]
    PoseCountMismatch { expected: usize, actual: usize },

    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RdwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = RdwError::SpaceIndexOutOfRange { index: 3, count: 1 };
        assert_eq!(e.to_string(), "Space index 3 out of range (1 spaces)");
        let e = RdwError::InvalidParameter {
            name: "curvature_radius",
            value: -1.0,
        };
        assert_eq!(e.to_string(), "Invalid parameter curvature_radius: -1");
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: RdwError = parse.unwrap_err().into();
        assert!(matches!(err, RdwError::Config(_)));
    }
}
