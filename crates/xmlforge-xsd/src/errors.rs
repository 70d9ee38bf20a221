use thiserror::Error;

/// External schema download or parse failed. Only fatal when the
/// inference mode demands an external schema.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no schema location found on the document root")]
    NoLocation,

    #[error("resolver is disabled")]
    Disabled,

    #[error("schema download failed: {details}")]
    Download { details: String },

    #[error("schema endpoint returned status {status}")]
    Status { status: u16 },

    #[error("schema parse failed: {details}")]
    Parse { details: String },
}
