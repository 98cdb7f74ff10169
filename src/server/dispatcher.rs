//! Request dispatcher
//!
//! Maps method names to handlers and acts as the fault barrier: whatever a
//! handler does (return an error, panic, forget its final reply), the client
//! receives a well-formed final reply unless the connection itself is gone.

use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::context::ReplyContext;
use super::handlers::MethodHandler;
use crate::error::{Error, ToReplyStatus};
use crate::protocol::{Message, ProtocolVersion, Status};

/// What became of a dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler completed with a final reply
    Completed,
    /// No handler for the method; `501` was sent
    Rejected,
    /// The handler failed; an error reply was sent if possible
    Failed,
    /// The client went away; nothing more can be sent
    Disconnected,
}

/// Case-insensitive method name to handler map
pub struct Dispatcher {
    version: ProtocolVersion,
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl Dispatcher {
    /// Create a dispatcher with no handlers
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `method`, replacing any previous registration
    pub fn register(&mut self, method: &str, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(method.to_ascii_lowercase(), handler);
    }

    /// Handler registered for `method`, ignoring case
    pub fn resolve(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(&method.to_ascii_lowercase()).cloned()
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// The protocol version replies are stamped with
    pub fn version(&self) -> &ProtocolVersion {
        &self.version
    }

    /// Run the handler for `request`
    pub async fn dispatch(&self, request: &Message, ctx: &mut ReplyContext<'_>) -> DispatchOutcome {
        let Some(handler) = self.resolve(&request.method) else {
            warn!(peer = ctx.peer(), method = %request.method, "method not implemented");
            return match ctx.send(&Status::NOT_IMPLEMENTED, "").await {
                Ok(()) => DispatchOutcome::Rejected,
                Err(e) => Self::reply_failed(ctx, &e),
            };
        };

        let result = AssertUnwindSafe(handler.handle(request, ctx))
            .catch_unwind()
            .await;
        let err = match result {
            Ok(Ok(())) if ctx.final_sent() => return DispatchOutcome::Completed,
            Ok(Ok(())) => Error::Other(format!(
                "{} handler finished without a final reply",
                request.method
            )),
            Ok(Err(e)) => e,
            Err(panic) => Error::Other(format!("handler panicked: {}", panic_message(&*panic))),
        };

        if err.is_disconnect() {
            info!(
                peer = ctx.peer(),
                method = %request.method,
                "client disconnected during request"
            );
            return DispatchOutcome::Disconnected;
        }

        error!(
            peer = ctx.peer(),
            method = %request.method,
            path = %request.path,
            error = %err,
            error_code = err.error_code(),
            "request failed"
        );
        if ctx.final_sent() {
            return DispatchOutcome::Failed;
        }
        match ctx.send(&err.reply_status(), err.to_string()).await {
            Ok(()) => DispatchOutcome::Failed,
            Err(e) => Self::reply_failed(ctx, &e),
        }
    }

    fn reply_failed(ctx: &ReplyContext<'_>, err: &Error) -> DispatchOutcome {
        if err.is_disconnect() {
            info!(peer = ctx.peer(), "client disconnected before reply");
            DispatchOutcome::Disconnected
        } else {
            warn!(peer = ctx.peer(), error = %err, "failed to send reply");
            DispatchOutcome::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
