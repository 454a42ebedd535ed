use crate::ComputeError;

/// Conversion from a user function's return shape into a computation outcome.
///
/// Lets computations return a plain value, a `Result` with any displayable
/// error, or an `Option` without manual wrapping.
pub trait Computed<T: Clone> {
    fn into_outcome(self) -> Result<T, ComputeError>;
}

impl<T: Clone> Computed<T> for T {
    fn into_outcome(self) -> Result<T, ComputeError> {
        Ok(self)
    }
}

impl<T: Clone, E> Computed<T> for Result<T, E>
where
    E: ToString,
{
    fn into_outcome(self) -> Result<T, ComputeError> {
        self.map_err(|error| ComputeError::failed(error.to_string()))
    }
}

impl<T: Clone> Computed<T> for Option<T> {
    fn into_outcome(self) -> Result<T, ComputeError> {
        self.ok_or(ComputeError::Empty)
    }
}
