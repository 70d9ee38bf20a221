use thiserror::Error;

/// The input document cannot be read or is not well-formed XML up to the
/// point required to produce the next record.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: std::io::Error },

    #[error("malformed XML near byte {pos}: {details}")]
    Malformed { pos: u64, details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InputError {
    pub(crate) fn malformed(pos: u64, details: impl ToString) -> InputError {
        InputError::Malformed { pos, details: details.to_string() }
    }
}
