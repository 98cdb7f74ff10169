//! Wire protocol
//!
//! ## Wire Format
//!
//! Every message is a length-prefixed UTF-8 JSON object:
//! ```text
//! [len:u32-BE][json payload...]
//! ```
//!
//! ## Requests
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `method` | `get` or `unpack` (case-insensitive) |
//! | `path` | directory to list, or archive to unpack |
//! | `protocol` | must equal the server's version, e.g. `RU/0.4` |
//!
//! ## Replies
//!
//! | Code | Phrase | Meaning |
//! |------|--------|---------|
//! | 200 | OK | request completed |
//! | 202 | Accepted | extraction started, progress follows |
//! | 206 | Partial Content | one progress update (`data` = `"<n>%"`) |
//! | 404 | Not Found | path missing or unreadable |
//! | 500 | Internal Server Error | unexpected failure |
//! | 501 | Not Implemented | unknown method |
//! | 506 | Protocol Not Supported | version mismatch |
//! | 1-255 | unrar exit explanation | extraction failed with that exit status |

pub mod frame;
mod message;
mod status;
mod version;

pub use frame::{DEFAULT_MAX_FRAME_LEN, read_frame, write_frame};
pub use message::{Data, Message};
pub use status::Status;
pub use version::{DEFAULT_PROTOCOL_VERSION, ProtocolVersion};
