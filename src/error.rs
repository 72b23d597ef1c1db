/// Macro to generate the backend `From` conversions for service errors
///
/// Usage:
/// ```ignore
/// impl_service_error_conversions!(SessionServiceError, Backend);
/// ```
#[macro_export]
macro_rules! impl_service_error_conversions {
  ($error_type:ty, $backend_variant:ident) => {
    impl From<$crate::backend::BackendError> for $error_type {
      fn from(err: $crate::backend::BackendError) -> Self {
        <$error_type>::$backend_variant(err.to_string())
      }
    }

    impl From<reqwest::Error> for $error_type {
      fn from(err: reqwest::Error) -> Self {
        <$error_type>::from($crate::backend::BackendError::from(err))
      }
    }
  };
}
