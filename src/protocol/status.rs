//! Reply status codes

use std::borrow::Cow;
use std::fmt;

use crate::extraction::explain_exit_code;

/// Status carried by a reply: a numeric code and a human-readable phrase
///
/// Codes are HTTP-inspired for protocol-level outcomes. A failed extraction
/// reports the extraction tool's own exit status as the code, with the phrase
/// taken from the exit-status table (see [`Status::for_exit_code`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Status {
    /// Numeric status code
    pub code: u16,
    /// Human-readable status text
    pub phrase: Cow<'static, str>,
}

impl Status {
    /// Request completed successfully
    pub const OK: Status = Status::new(200, "OK");
    /// Streaming operation started; progress replies follow
    pub const ACCEPTED: Status = Status::new(202, "Accepted");
    /// One progress update of a streaming operation
    pub const PARTIAL_CONTENT: Status = Status::new(206, "Partial Content");
    /// Requested path does not exist or cannot be read
    pub const NOT_FOUND: Status = Status::new(404, "Not Found");
    /// Generic failure inside the server or the extraction tool
    pub const INTERNAL_ERROR: Status = Status::new(500, "Internal Server Error");
    /// Requested method has no handler
    pub const NOT_IMPLEMENTED: Status = Status::new(501, "Not Implemented");
    /// Request declared a protocol version the server does not speak
    pub const PROTOCOL_NOT_SUPPORTED: Status = Status::new(506, "Protocol Not Supported");

    /// Create a status from a code and a static phrase
    pub const fn new(code: u16, phrase: &'static str) -> Self {
        Self {
            code,
            phrase: Cow::Borrowed(phrase),
        }
    }

    /// Status for an extraction tool exit code
    ///
    /// Exit code 0 is [`Status::OK`]. Any other code in `0..=u16::MAX` keeps
    /// the exit code as the status code and uses the tool's explanation as
    /// the phrase (`"Unknown error"` for codes outside the table). Codes that
    /// do not fit map to [`Status::INTERNAL_ERROR`].
    pub fn for_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            return Self::OK;
        }
        match u16::try_from(exit_code) {
            Ok(code) => Self::new(code, explain_exit_code(exit_code).unwrap_or("Unknown error")),
            Err(_) => Self::INTERNAL_ERROR,
        }
    }

    /// Status code as sent on the wire
    pub fn code_string(&self) -> String {
        self.code.to_string()
    }

    /// Whether a reply with this code ends the reply sequence of a request
    pub fn is_final(&self) -> bool {
        is_final_code(self.code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.phrase)
    }
}

/// `202` and `206` announce or continue a stream; every other code is final.
pub(crate) fn is_final_code(code: u16) -> bool {
    !matches!(code, 202 | 206)
}
