use thiserror::Error;

/// Observable progress of a cell's current computation attempt.
///
/// Exactly one attempt owns this state at any instant; a superseded
/// attempt's late completion never writes here.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellState<T: Clone> {
    Idle,
    Loading,
    Data(T),
    Error(ComputeError),
}

/// Why a computation did not produce a value.
///
/// `Cancelled` is only ever surfaced to direct awaiters of an attempt's
/// future; it is never published into [`CellState`].
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComputeError {
    #[error("{0}")]
    Failed(String),
    #[error("computation produced no value")]
    Empty,
    #[error("computation was cancelled")]
    Cancelled,
}

impl ComputeError {
    pub fn is_failed(&self) -> bool {
        matches!(self, ComputeError::Failed(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ComputeError::Empty)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ComputeError::Cancelled)
    }

    /// Stringifies a foreign error into `Failed`. Applied exactly once;
    /// an error that is already a `ComputeError` is passed through as is.
    pub fn failed(message: impl Into<String>) -> Self {
        ComputeError::Failed(message.into())
    }
}

impl<T: Clone> CellState<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, CellState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, CellState::Loading)
    }

    /// A settled state is `Data` or `Error`; `Idle` and `Loading` are not.
    pub fn is_settled(&self) -> bool {
        matches!(self, CellState::Data(_) | CellState::Error(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, CellState::Data(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellState::Error(_))
    }

    pub fn data_ref(&self) -> Option<&T> {
        match self {
            CellState::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_ref(&self) -> Option<&ComputeError> {
        match self {
            CellState::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            CellState::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn data(value: T) -> Self {
        CellState::Data(value)
    }

    pub fn error(error: ComputeError) -> Self {
        CellState::Error(error)
    }

    pub fn error_with_message(message: impl Into<String>) -> Self {
        CellState::Error(ComputeError::Failed(message.into()))
    }
}

impl<T: Clone> Default for CellState<T> {
    fn default() -> Self {
        CellState::Idle
    }
}

impl<T: Clone> From<Result<T, ComputeError>> for CellState<T> {
    fn from(outcome: Result<T, ComputeError>) -> Self {
        match outcome {
            Ok(value) => CellState::Data(value),
            Err(error) => CellState::Error(error),
        }
    }
}
