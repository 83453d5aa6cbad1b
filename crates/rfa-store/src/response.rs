//! The `{ data, error }` envelope returned by every public operation

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::error::DbError;
use crate::record::Record;
use crate::DbResult;

/// Uniform result of a client call.
///
/// At most one of `data` and `error` is `Some`. Both are `None` for calls that
/// succeed without a payload (`sign_out`, `delete`, `upload`) and for lookups
/// that found nothing (`single`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    pub data: Option<T>,
    pub error: Option<DbError>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn err(error: DbError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> DbResult<Option<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl<T> From<DbResult<T>> for Response<T> {
    fn from(result: DbResult<T>) -> Self {
        match result {
            Ok(data) => Response::ok(data),
            Err(err) => Response::err(err),
        }
    }
}

impl From<DbResult<Option<Record>>> for Response<Record> {
    fn from(result: DbResult<Option<Record>>) -> Self {
        match result {
            Ok(Some(record)) => Response::ok(record),
            Ok(None) => Response::empty(),
            Err(err) => Response::err(err),
        }
    }
}

impl Response<()> {
    /// Envelope for payload-less operations: success leaves `data` empty.
    pub fn unit(result: DbResult<()>) -> Self {
        match result {
            Ok(()) => Response::empty(),
            Err(err) => Response::err(err),
        }
    }
}

impl Response<Record> {
    /// Decode the record into a typed row; decode failure lands in `error`.
    pub fn decode<T: DeserializeOwned>(self) -> Response<T> {
        match (self.data, self.error) {
            (_, Some(err)) => Response::err(err),
            (Some(record), None) => record.decode::<T>().into(),
            (None, None) => Response::empty(),
        }
    }
}

impl Response<Vec<Record>> {
    pub fn decode<T: DeserializeOwned>(self) -> Response<Vec<T>> {
        match (self.data, self.error) {
            (_, Some(err)) => Response::err(err),
            (Some(records), None) => records
                .iter()
                .map(Record::decode::<T>)
                .collect::<DbResult<Vec<T>>>()
                .into(),
            (None, None) => Response::empty(),
        }
    }
}

/// Run a backend future, turning a panic into [`DbError::Unknown`].
///
/// This is the only place the public boundary touches backend futures, so no
/// panic escapes to the caller.
pub(crate) async fn guarded<T, F>(operation: &'static str, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "operation panicked".to_string());
            error!(operation, %message, "panic caught at client boundary");
            Err(DbError::Unknown(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guarded_converts_panics() {
        let result: DbResult<()> = guarded("test", async {
            if true {
                panic!("boom");
            }
            Ok(())
        })
        .await;
        assert_eq!(result, Err(DbError::Unknown("boom".to_string())));
    }

    #[test]
    fn never_both_data_and_error() {
        let res: Response<u8> = Err(DbError::InvalidCredentials).into();
        assert!(res.data.is_none());
        assert!(res.error.is_some());

        let unit = Response::unit(Ok(()));
        assert!(unit.data.is_none() && unit.error.is_none());
    }
}
