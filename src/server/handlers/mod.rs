//! Method handlers
//!
//! - [`ListHandler`] serves `get`: one reply with the directory listing
//! - [`UnpackHandler`] serves `unpack`: `202`, progress as `206`, then the
//!   final status of the extraction

use async_trait::async_trait;

use super::context::ReplyContext;
use crate::error::Result;
use crate::protocol::Message;

mod list;
mod unpack;

pub use list::ListHandler;
pub use unpack::UnpackHandler;

/// Trait for request method handlers
///
/// A handler answers one request through `ctx`, ending with exactly one final
/// reply. Returning an error (or panicking) instead makes the dispatcher send
/// an error reply and close the connection.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Serve `request`
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be served at all, or if a reply
    /// could not be delivered.
    async fn handle(&self, request: &Message, ctx: &mut ReplyContext<'_>) -> Result<()>;
}
