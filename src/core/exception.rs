//! Failures raised while handling a request and their translation into responses.
//!
//! Callers describe their own error types by implementing [`Exception`]. A reply may return one
//! as a [`Failure`], or abort from anywhere with [`raise`]. Anything else that goes wrong (an
//! `eyre::Report`, a plain panic) is reported as a generic `500` carrying a freshly generated
//! incident id so the client and the logs can be correlated.
use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    fmt,
    panic::{self, PanicHookInfo},
    sync::Once,
};

use axum::body::Body as AxumBody;
use hyper::{HeaderMap, Response, StatusCode, header::HeaderValue};
use thiserror::Error;
use uuid::Uuid;

use crate::ports::static_files::StaticFileError;

/// Response header carrying the incident id.
pub const ERROR_ID: &str = "error-id";
/// Response header carrying an exception's stable code.
pub const ERROR_CODE: &str = "error-code";

/// The capability set a caller's failure type may implement to control its own response.
pub trait Exception: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Status code to answer with.
    fn status(&self) -> StatusCode;

    /// Add any extra headers to the error response.
    fn set_headers(&self, _headers: &mut HeaderMap) {}

    /// Stable machine readable code, sent as `Error-Code`.
    fn code(&self) -> Option<String> {
        None
    }

    /// Incident id, sent as `Error-ID`. A fresh one is generated when absent.
    fn id(&self) -> Option<String> {
        None
    }

    /// Human readable message for the logs.
    fn message(&self) -> Option<String> {
        None
    }

    /// Stack or cause chain for the logs.
    fn stack(&self) -> Option<String> {
        None
    }
}

/// Error type of a reply.
#[derive(Debug, Error)]
pub enum Failure {
    /// A caller defined failure that knows how to answer.
    #[error("{0}")]
    Exception(Box<dyn Exception>),

    /// Anything else.
    #[error("{0}")]
    Unexpected(eyre::Report),
}

impl Failure {
    pub fn exception(exception: impl Exception) -> Self {
        Self::Exception(Box::new(exception))
    }
}

impl From<eyre::Report> for Failure {
    fn from(report: eyre::Report) -> Self {
        Self::Unexpected(report)
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Self::Unexpected(e.into())
    }
}

impl From<StaticFileError> for Failure {
    fn from(e: StaticFileError) -> Self {
        Self::Unexpected(e.into())
    }
}

impl From<hyper::http::Error> for Failure {
    fn from(e: hyper::http::Error) -> Self {
        Self::Unexpected(e.into())
    }
}

/// Ready-made [`Exception`] for callers that do not need their own type.
#[derive(Debug, Clone)]
pub struct HttpException {
    pub status: StatusCode,
    pub code: Option<String>,
    pub id: Option<String>,
    pub message: Option<String>,
    pub headers: HeaderMap,
}

impl HttpException {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            code: None,
            id: None,
            message: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl From<HttpException> for Failure {
    fn from(exception: HttpException) -> Self {
        Self::exception(exception)
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.status, message),
            None => write!(f, "{}", self.status),
        }
    }
}

impl Exception for HttpException {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_headers(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
    }

    fn code(&self) -> Option<String> {
        self.code.clone()
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn message(&self) -> Option<String> {
        self.message.clone()
    }
}

/// Panic payload used by [`raise`].
struct Raised(Box<dyn Exception>);

/// Abort the current request with `exception`.
///
/// The dispatcher's boundary recovers it and answers with the exception's status and headers.
/// Unlike `panic!`, this does not run the panic hook.
pub fn raise(exception: impl Exception) -> ! {
    panic::resume_unwind(Box::new(Raised(Box::new(exception))))
}

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Record a backtrace for every panic so the boundary can log where it happened.
///
/// Chains to the previously installed hook. Safe to call more than once.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let trace = format!("at {location}\n{}", Backtrace::force_capture());
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> String {
    LAST_PANIC
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Generate an opaque incident id. UUIDv7 is time ordered with random low bits.
pub fn incident_id() -> String {
    Uuid::now_v7().to_string()
}

/// A failure recovered at the request boundary.
#[derive(Debug)]
pub enum Caught {
    Exception(Box<dyn Exception>),
    Unexpected { detail: String, stack: String },
}

impl Caught {
    /// Classify a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Raised>() {
            Ok(raised) => return Self::Exception(raised.0),
            Err(payload) => payload,
        };
        let detail = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Unexpected {
            detail,
            stack: take_panic_trace(),
        }
    }

    pub fn from_failure(failure: Failure) -> Self {
        match failure {
            Failure::Exception(exception) => Self::Exception(exception),
            Failure::Unexpected(report) => Self::Unexpected {
                detail: report.to_string(),
                stack: format!("{report:?}"),
            },
        }
    }

    /// Log the failure and build the response the client gets.
    pub fn into_response(self, method: &str, path: &str) -> Response<AxumBody> {
        let mut response = Response::new(AxumBody::empty());
        match self {
            Caught::Exception(exception) => {
                let id = exception.id().unwrap_or_else(incident_id);
                let code = exception.code();
                tracing::error!(
                    error.id = %id,
                    error.code = code.as_deref().unwrap_or(""),
                    status = %exception.status(),
                    message = exception.message().as_deref().unwrap_or(""),
                    stack = exception.stack().as_deref().unwrap_or(""),
                    "{} {} failed: {}",
                    method,
                    path,
                    exception
                );
                *response.status_mut() = exception.status();
                exception.set_headers(response.headers_mut());
                insert_encoded(response.headers_mut(), ERROR_ID, &id);
                if let Some(code) = code {
                    insert_encoded(response.headers_mut(), ERROR_CODE, &code);
                }
            }
            Caught::Unexpected { detail, stack } => {
                let id = incident_id();
                tracing::error!(
                    error.id = %id,
                    "{} {} failed: {}\n{}",
                    method,
                    path,
                    detail,
                    stack
                );
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                insert_encoded(response.headers_mut(), ERROR_ID, &id);
            }
        }
        response
    }
}

/// Insert a header value, percent-encoding it so non-ASCII text survives.
fn insert_encoded(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(&urlencoding::encode(value)) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_response_uses_status_and_headers() {
        let exception = HttpException::new(StatusCode::CONFLICT)
            .with_code("E_TAKEN")
            .with_id("abc-123")
            .with_header("retry-after", HeaderValue::from_static("5"));
        let response = Caught::from_failure(Failure::exception(exception)).into_response("PUT", "/a");

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()[ERROR_ID], "abc-123");
        assert_eq!(response.headers()[ERROR_CODE], "E_TAKEN");
        assert_eq!(response.headers()["retry-after"], "5");
    }

    #[test]
    fn test_non_ascii_code_is_encoded() {
        let exception = HttpException::new(StatusCode::BAD_REQUEST).with_code("参数错误");
        let response = Caught::from_failure(Failure::exception(exception)).into_response("GET", "/");
        let code = response.headers()[ERROR_CODE].to_str().unwrap();
        assert_eq!(urlencoding::decode(code).unwrap(), "参数错误");
        assert!(response.headers().contains_key(ERROR_ID));
    }

    #[test]
    fn test_unexpected_failure_gets_generated_id() {
        let response = Caught::from_failure(Failure::Unexpected(eyre::eyre!("disk on fire")))
            .into_response("GET", "/");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let id = response.headers()[ERROR_ID].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(!response.headers().contains_key(ERROR_CODE));
    }

    #[test]
    fn test_raised_exception_is_recovered_from_panic_payload() {
        let payload = panic::catch_unwind(|| {
            raise(HttpException::new(StatusCode::FORBIDDEN).with_code("NOPE"));
        })
        .unwrap_err();
        match Caught::from_panic(payload) {
            Caught::Exception(e) => {
                assert_eq!(e.status(), StatusCode::FORBIDDEN);
                assert_eq!(e.code().as_deref(), Some("NOPE"));
            }
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_panic_is_unexpected() {
        install_panic_hook();
        let payload = panic::catch_unwind(|| {
            panic!("boom");
        })
        .unwrap_err();
        match Caught::from_panic(payload) {
            Caught::Unexpected { detail, stack } => {
                assert_eq!(detail, "boom");
                assert!(!stack.is_empty());
            }
            other => panic!("expected unexpected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_incident_ids_are_unique() {
        assert_ne!(incident_id(), incident_id());
    }
}
