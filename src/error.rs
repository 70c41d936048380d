use thiserror::Error;

/// Library error type for editor-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The decode engine could not produce a session for this project.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Why a decode session could not be opened. The three cases carry different
/// diagnostic messages but all leave the project non-renderable.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The engine library itself failed to load or is missing.
    #[error("decode engine unavailable: {0}")]
    Unavailable(String),

    /// The engine loaded but its interface does not match what we expect
    /// (e.g. a stale native build).
    #[error("decode engine interface mismatch: {0}")]
    InterfaceMismatch(String),

    /// The engine is present but rejected this input.
    #[error("failed to initialize decode session: {0}")]
    Init(String),
}
