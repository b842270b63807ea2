//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Socket bytes
//!     → codec.rs (parse request line, headers, cookies, query)
//!     → request.rs (immutable Request handed to the dispatcher)
//!     → [server dispatches to an application]
//!     → response.rs (components fill status, headers, body)
//!     → codec.rs (render status line + headers)
//!     → Socket bytes
//! ```

pub mod codec;
pub mod cookie;
pub mod headers;
pub mod request;
pub mod response;

pub use codec::{ProtocolError, SERVER_IDENTIFIER};
pub use cookie::Cookie;
pub use headers::MultiMap;
pub use request::Request;
pub use response::Response;
