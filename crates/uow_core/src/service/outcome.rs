//! Uniform result envelope returned by every service operation.
//!
//! # Responsibility
//! - Carry success flag, status, message, optional fault and optional payload.
//! - Flatten a fault's `source()` chain into one readable message.
//!
//! # Invariants
//! - `succeeded` is false exactly when a fault is present or the caller
//!   passed an explicit error flag.
//! - Fields are set once by a constructor and read through accessors.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::error::Error;
use std::fmt::{self, Debug, Formatter};

/// Boxed failure captured by an envelope.
pub type Fault = Box<dyn Error + Send + Sync + 'static>;

/// Outcome classification with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalError,
    ExistingItem,
    Warning,
    Info,
}

impl StatusCode {
    /// Numeric code; HTTP-aligned below 600, application-defined above.
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InternalError => 500,
            Self::ExistingItem => 600,
            Self::Warning => 700,
            Self::Info => 800,
        }
    }
}

/// Envelope wrapping one service call.
pub struct Outcome<T> {
    succeeded: bool,
    status: StatusCode,
    message: String,
    fault: Option<Fault>,
    payload: Option<T>,
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self {
            succeeded: true,
            status: StatusCode::Ok,
            message: "Ok".to_string(),
            fault: None,
            payload: None,
        }
    }
}

impl<T> Outcome<T> {
    /// Success carrying `payload`.
    pub fn ok(payload: T) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    /// Success whose payload may be absent.
    pub fn optional(payload: Option<T>) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Message-only envelope with status `InternalError`.
    pub fn from_message(message: impl Into<String>, has_error: bool) -> Self {
        Self::with_status(StatusCode::InternalError, message, has_error)
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>, has_error: bool) -> Self {
        Self {
            succeeded: !has_error,
            status,
            message: message.into(),
            fault: None,
            payload: None,
        }
    }

    /// Message envelope that also carries a payload.
    pub fn message_with_payload(payload: T, message: impl Into<String>, has_error: bool) -> Self {
        Self {
            payload: Some(payload),
            ..Self::from_message(message, has_error)
        }
    }

    /// Failure capturing `fault`; the message lists its whole source chain.
    pub fn from_fault(fault: impl Into<Fault>) -> Self {
        let fault = fault.into();
        Self {
            succeeded: false,
            status: StatusCode::InternalError,
            message: chain_message(&*fault),
            fault: Some(fault),
            payload: None,
        }
    }

    /// Failure capturing `fault` alongside the payload that was being processed.
    pub fn fault_with_payload(payload: T, fault: impl Into<Fault>) -> Self {
        Self {
            payload: Some(payload),
            ..Self::from_fault(fault)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn has_error(&self) -> bool {
        !self.succeeded
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fault(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.fault.as_deref()
    }

    /// Downcasts the captured fault to a concrete error type.
    pub fn fault_as<E: Error + 'static>(&self) -> Option<&E> {
        self.fault.as_deref().and_then(|fault| fault.downcast_ref::<E>())
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    /// Converts into a plain `Result`.
    ///
    /// A failed envelope without a fault yields its message as the error.
    pub fn into_result(self) -> Result<Option<T>, Fault> {
        if self.succeeded {
            return Ok(self.payload);
        }
        Err(self.fault.unwrap_or_else(|| self.message.into()))
    }

    /// Maps the payload, keeping every other field.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            succeeded: self.succeeded,
            status: self.status,
            message: self.message,
            fault: self.fault,
            payload: self.payload.map(f),
        }
    }
}

impl<T: Debug> Debug for Outcome<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("succeeded", &self.succeeded)
            .field("status", &self.status)
            .field("message", &self.message)
            .field("fault", &self.fault)
            .field("payload", &self.payload)
            .finish()
    }
}

// The fault is written as its display text.
impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Outcome", 6)?;
        state.serialize_field("succeeded", &self.succeeded)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("code", &self.status.code())?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("fault", &self.fault.as_ref().map(ToString::to_string))?;
        state.serialize_field("payload", &self.payload)?;
        state.end()
    }
}

fn chain_message(fault: &(dyn Error + 'static)) -> String {
    let mut parts = vec![fault.to_string()];
    let mut source = fault.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(" - ")
}

#[cfg(test)]
mod tests {
    use super::{Outcome, StatusCode};
    use std::error::Error;
    use std::fmt::{Display, Formatter};

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl Display for Outer {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "save failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    impl Display for Inner {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "disk full")
        }
    }

    impl Error for Inner {}

    #[test]
    fn default_is_success_without_payload() {
        let outcome = Outcome::<i32>::default();
        assert!(outcome.succeeded());
        assert_eq!(outcome.status(), StatusCode::Ok);
        assert_eq!(outcome.message(), "Ok");
        assert!(outcome.payload().is_none());
        assert!(outcome.fault().is_none());
    }

    #[test]
    fn message_flag_drives_success() {
        let failed = Outcome::<()>::from_message("quota exceeded", true);
        assert!(failed.has_error());
        assert_eq!(failed.status(), StatusCode::InternalError);

        let informational = Outcome::<()>::with_status(StatusCode::Info, "queued", false);
        assert!(informational.succeeded());
        assert_eq!(informational.status().code(), 800);
    }

    #[test]
    fn fault_flattens_source_chain() {
        let outcome = Outcome::<()>::from_fault(Outer(Inner));
        assert!(outcome.has_error());
        assert_eq!(outcome.status(), StatusCode::InternalError);
        assert_eq!(outcome.message(), "save failed - disk full");
        assert!(outcome.fault_as::<Outer>().is_some());
        assert!(outcome.fault_as::<Inner>().is_none());
    }

    #[test]
    fn fault_with_payload_keeps_payload() {
        let outcome = Outcome::fault_with_payload(7, Outer(Inner));
        assert!(outcome.has_error());
        assert_eq!(outcome.payload(), Some(&7));
    }

    #[test]
    fn into_result_reports_message_when_no_fault() {
        let err = Outcome::<()>::from_message("nope", true).into_result().unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(Outcome::ok(3).into_result().unwrap(), Some(3));
    }

    #[test]
    fn map_preserves_status_and_message() {
        let outcome = Outcome::message_with_payload(2, "partial", false).map(|value| value * 10);
        assert!(outcome.succeeded());
        assert_eq!(outcome.message(), "partial");
        assert_eq!(outcome.into_payload(), Some(20));
    }

    #[test]
    fn status_codes_and_names_are_stable() {
        let expected = [
            (StatusCode::Ok, 200, "\"ok\""),
            (StatusCode::Unauthorized, 401, "\"unauthorized\""),
            (StatusCode::Forbidden, 403, "\"forbidden\""),
            (StatusCode::NotFound, 404, "\"not_found\""),
            (StatusCode::InternalError, 500, "\"internal_error\""),
            (StatusCode::ExistingItem, 600, "\"existing_item\""),
            (StatusCode::Warning, 700, "\"warning\""),
            (StatusCode::Info, 800, "\"info\""),
        ];
        for (status, code, name) in expected {
            assert_eq!(status.code(), code);
            assert_eq!(serde_json::to_string(&status).unwrap(), name);
        }
    }

    #[test]
    fn serializes_fault_as_text() {
        let value = serde_json::to_value(Outcome::<u8>::from_fault(Outer(Inner))).unwrap();
        assert_eq!(value["succeeded"], false);
        assert_eq!(value["status"], "internal_error");
        assert_eq!(value["code"], 500);
        assert_eq!(value["fault"], "save failed");
        assert!(value["payload"].is_null());
    }
}
