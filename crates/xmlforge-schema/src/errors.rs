use thiserror::Error;
use xmlforge_source::InputError;

/// Schema inference failed in a way the configured mode cannot absorb.
///
/// Inference otherwise always succeeds: unknown leaf types collapse to
/// `Str` and type conflicts widen to `Str`.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("document has no discernible root element")]
    NoRoot,

    #[error("external schema required but could not be resolved")]
    ExternalUnavailable,

    #[error(transparent)]
    Input(#[from] InputError),
}
