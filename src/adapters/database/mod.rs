use std::sync::PoisonError;

use crate::ports::{catalog, ledger, member};

pub mod memory;
pub mod sqlite;

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for ErasedPoisonError {
    fn from(err: PoisonError<T>) -> Self {
        Self(err.to_string())
    }
}

/// We need to create custom `From` implementations here for errors that are specific to the
/// database adapters.
macro_rules! impl_adapter_errors {
    ($($error:path),+) => {
        $(
            impl<T> From<PoisonError<T>> for $error {
                fn from(err: PoisonError<T>) -> Self {
                    Self::Adapter(Box::new(ErasedPoisonError::from(err)))
                }
            }

            impl From<ErasedPoisonError> for $error {
                fn from(err: ErasedPoisonError) -> Self {
                    Self::Adapter(Box::new(err))
                }
            }

            impl From<rusqlite::Error> for $error {
                fn from(err: rusqlite::Error) -> Self {
                    Self::Adapter(Box::new(err))
                }
            }

            impl From<tokio::task::JoinError> for $error {
                fn from(err: tokio::task::JoinError) -> Self {
                    Self::Adapter(Box::new(err))
                }
            }
        )+
    };
}

impl_adapter_errors!(member::Error, catalog::Error, ledger::Error);
