/// Crate-wide result alias.
pub type HwcResult<T> = Result<T, HwcError>;

/// Everything that can go wrong inside the composer.
///
/// Per-frame entry points never return these; they are absorbed into demotion decisions.
#[derive(thiserror::Error, Debug)]
pub enum HwcError {
    /// Hardware description is inconsistent.
    #[error("config error: {0}")]
    Config(String),

    /// Programming error, e.g. a window index outside the declared range.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Buffer allocator refused a request.
    #[error("buffer allocation failed: {0}")]
    OutOfMemory(String),

    /// A configure/run/program call failed.
    #[error("hardware error: {0}")]
    Hardware(String),

    /// No window, channel budget or scaler unit left.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HwcError {
    /// Build a [`HwcError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`HwcError::Invariant`].
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Build a [`HwcError::OutOfMemory`].
    pub fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::OutOfMemory(msg.into())
    }

    /// Build a [`HwcError::Hardware`].
    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }

    /// Build a [`HwcError::Resource`].
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Errors a frame can recover from by demoting the offending layer to GPU composition.
    pub fn is_recoverable_by_demotion(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory(_) | Self::Resource(_) | Self::Hardware(_)
        )
    }
}
