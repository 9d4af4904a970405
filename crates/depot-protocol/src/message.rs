use std::collections::HashMap;

/// Magic constant opening every frame. A mismatch means the peer is not
/// speaking this protocol (or framing was lost) and the connection drops.
pub const MAGIC: u32 = 0xABCD_1234;

/// Hard cap on a message body at the framing layer. Bodies larger than
/// this are refused before allocation; the per-server configured maximum
/// file size (a validation concern) is always at or below this.
pub const MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Header keys recognized by the protocol. Keys are literal strings on
/// the wire; unknown keys are carried but ignored.
pub mod header {
    pub const FILE_NAME: &str = "File-Name";
    pub const ID: &str = "ID";
    pub const MESSAGE: &str = "Message";
}

/// Whether a message is a request or a response. One byte on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    pub fn wire_tag(self) -> u8 {
        match self {
            MessageKind::Request => 0,
            MessageKind::Response => 1,
        }
    }

    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Request),
            1 => Some(MessageKind::Response),
            _ => None,
        }
    }
}

/// Operation codes carried by requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Put,
    Get,
    Delete,
}

impl OpCode {
    pub fn code(self) -> u32 {
        match self {
            OpCode::Put => 1,
            OpCode::Get => 2,
            OpCode::Delete => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(OpCode::Put),
            2 => Some(OpCode::Get),
            3 => Some(OpCode::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpCode::Put => "PUT",
            OpCode::Get => "GET",
            OpCode::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Result codes carried by responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    BadRequest,
    Forbidden,
    NotFound,
    ServerError,
}

impl ResultCode {
    pub fn code(self) -> u32 {
        match self {
            ResultCode::Success => 200,
            ResultCode::BadRequest => 400,
            ResultCode::Forbidden => 403,
            ResultCode::NotFound => 404,
            ResultCode::ServerError => 500,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            200 => Some(ResultCode::Success),
            400 => Some(ResultCode::BadRequest),
            403 => Some(ResultCode::Forbidden),
            404 => Some(ResultCode::NotFound),
            500 => Some(ResultCode::ServerError),
            _ => None,
        }
    }
}

/// One unit of wire exchange: a request or a response.
///
/// The `code` field is kept raw so that a decoded message with an unknown
/// operation or result code can still be represented; validation, not
/// decoding, rejects it. Header insertion order is irrelevant and keys are
/// unique.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub code: u32,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageKind, code: u32) -> Self {
        Self {
            kind,
            code,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Build a PUT request for `name` carrying the file content.
    pub fn put_request(name: impl Into<String>, body: Vec<u8>) -> Self {
        let mut msg = Self::new(MessageKind::Request, OpCode::Put.code());
        msg.headers.insert(header::FILE_NAME.into(), name.into());
        msg.body = body;
        msg
    }

    /// Build a GET request addressing a file by name.
    pub fn get_request(name: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Request, OpCode::Get.code());
        msg.headers.insert(header::FILE_NAME.into(), name.into());
        msg
    }

    /// Build a GET request addressing a file by its index id.
    pub fn get_request_by_id(id: u64) -> Self {
        let mut msg = Self::new(MessageKind::Request, OpCode::Get.code());
        msg.headers.insert(header::ID.into(), id.to_string());
        msg
    }

    /// Build a DELETE request addressing a file by name.
    pub fn delete_request(name: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Request, OpCode::Delete.code());
        msg.headers.insert(header::FILE_NAME.into(), name.into());
        msg
    }

    /// Build a DELETE request addressing a file by its index id.
    pub fn delete_request_by_id(id: u64) -> Self {
        let mut msg = Self::new(MessageKind::Request, OpCode::Delete.code());
        msg.headers.insert(header::ID.into(), id.to_string());
        msg
    }

    /// Build a SUCCESS response identifying the affected file.
    pub fn ok_response(id: u64, name: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Response, ResultCode::Success.code());
        msg.headers.insert(header::ID.into(), id.to_string());
        msg.headers.insert(header::FILE_NAME.into(), name.into());
        msg
    }

    /// Build a SUCCESS response for GET carrying the file content.
    pub fn ok_get_response(id: u64, name: impl Into<String>, body: Vec<u8>) -> Self {
        let mut msg = Self::ok_response(id, name);
        msg.body = body;
        msg
    }

    /// Build an error response with a human-readable reason.
    pub fn error_response(code: ResultCode, reason: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageKind::Response, code.code());
        msg.headers.insert(header::MESSAGE.into(), reason.into());
        msg
    }

    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    /// The operation code, if this is a request with a known code.
    pub fn op_code(&self) -> Option<OpCode> {
        if self.is_request() {
            OpCode::from_code(self.code)
        } else {
            None
        }
    }

    /// The result code, if this is a response with a known code.
    pub fn result_code(&self) -> Option<ResultCode> {
        if self.is_response() {
            ResultCode::from_code(self.code)
        } else {
            None
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.header(header::FILE_NAME)
    }

    pub fn id_header(&self) -> Option<&str> {
        self.header(header::ID)
    }
}
