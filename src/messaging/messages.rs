use bytes::Bytes;

use crate::messaging::codes::{ErrorCode, MessageCode};

/// An inbound operation request. Parameters are opaque at this level - their encoding is a
///  matter between the handler and its counterpart on the other side of the link.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationRequest<C: MessageCode> {
    pub code: C,
    pub parameters: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventData<C: MessageCode> {
    pub code: C,
    pub parameters: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationResponse<C: MessageCode> {
    pub code: C,
    pub return_code: i16,
    pub debug_message: Option<String>,
    pub parameters: Bytes,
}

impl<C: MessageCode> OperationResponse<C> {
    /// the return code as a well-known [ErrorCode], or `None` for application specific codes
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::try_from(self.return_code).ok()
    }

    pub fn is_ok(&self) -> bool {
        self.return_code == i16::from(ErrorCode::Ok)
    }
}
