//! Inbound method table.
//!
//! Maps each hub method name the server may invoke to a handler that binds
//! the positional arguments and emits the matching local event. The table
//! is written out by hand and checked against [`HubMethod::INBOUND`] when
//! it is built.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use hubwire_protocol::{HubMethod, Invocation};

use crate::error::HubError;
use crate::events::{HubEvents, MessageReceived, UserStateChange};

/// Handler for one inbound method. Receives arguments already checked
/// against the method's arity.
pub(crate) type Handler = fn(&HubEvents, &[String]);

/// Why an inbound invocation was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler for target {0:?}")]
    UnknownTarget(String),

    #[error("{target}: expected {expected} argument(s), got {actual}")]
    Arity {
        target: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{target}: argument {index} is not a string")]
    NotAString { target: &'static str, index: usize },
}

/// Name-to-handler table for inbound invocations.
pub struct DispatchTable {
    events: Arc<HubEvents>,
    handlers: HashMap<HubMethod, Handler>,
}

impl DispatchTable {
    /// Builds the table with every inbound method registered.
    pub fn new(events: Arc<HubEvents>) -> Result<Self, HubError> {
        Self::with_handlers(events, builtin_handlers())
    }

    pub(crate) fn with_handlers(
        events: Arc<HubEvents>,
        entries: Vec<(HubMethod, Handler)>,
    ) -> Result<Self, HubError> {
        let handlers: HashMap<_, _> = entries.into_iter().collect();

        for method in HubMethod::INBOUND {
            if !handlers.contains_key(&method) {
                return Err(HubError::MissingHandler(method.as_str()));
            }
        }

        Ok(Self { events, handlers })
    }

    /// Events this table emits into.
    pub fn events(&self) -> &Arc<HubEvents> {
        &self.events
    }

    /// Binds the invocation's arguments and runs its handler.
    ///
    /// Subscribers run on the calling task before this returns.
    pub fn dispatch(&self, invocation: &Invocation) -> Result<(), DispatchError> {
        let unknown = || DispatchError::UnknownTarget(invocation.target.clone());
        let method = HubMethod::from_name(&invocation.target).ok_or_else(unknown)?;
        let handler = self.handlers.get(&method).ok_or_else(unknown)?;

        let args = bind_strings(method, &invocation.arguments)?;
        trace!(method = method.as_str(), "dispatching invocation");
        handler(&self.events, &args);
        Ok(())
    }
}

/// Checks arity and converts every argument to a string. JSON `null` binds
/// to the empty string.
fn bind_strings(method: HubMethod, arguments: &[Value]) -> Result<Vec<String>, DispatchError> {
    let expected = method.inbound_arity();
    if arguments.len() != expected {
        return Err(DispatchError::Arity {
            target: method.as_str(),
            expected,
            actual: arguments.len(),
        });
    }

    arguments
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            _ => Err(DispatchError::NotAString {
                target: method.as_str(),
                index,
            }),
        })
        .collect()
}

fn builtin_handlers() -> Vec<(HubMethod, Handler)> {
    vec![
        (HubMethod::Connect, on_connect as Handler),
        (HubMethod::Disconnect, on_disconnect as Handler),
        (HubMethod::Start, on_job_started as Handler),
        (HubMethod::Completed, on_job_completed as Handler),
        (HubMethod::SendNotification, on_notification as Handler),
        (HubMethod::SendMessage, on_message as Handler),
        (HubMethod::SendPrivateMessage, on_private_message as Handler),
    ]
}

fn user_state(args: &[String]) -> UserStateChange {
    UserStateChange {
        connection_id: args[0].clone(),
        user_name: args[1].clone(),
    }
}

fn on_connect(events: &HubEvents, args: &[String]) {
    events.login.emit(&user_state(args));
}

fn on_disconnect(events: &HubEvents, args: &[String]) {
    events.logout.emit(&user_state(args));
}

fn on_job_started(events: &HubEvents, args: &[String]) {
    events.job_started.emit(&args[0]);
}

fn on_job_completed(events: &HubEvents, args: &[String]) {
    events.job_completed.emit(&args[0]);
}

fn on_notification(events: &HubEvents, args: &[String]) {
    events.notification_received.emit(&args[0]);
}

fn on_message(events: &HubEvents, args: &[String]) {
    events.message_received.emit(&MessageReceived {
        sender_id: args[0].clone(),
        message: args[1].clone(),
    });
}

// (from, to, message): the recipient is dropped.
fn on_private_message(events: &HubEvents, args: &[String]) {
    events.message_received.emit(&MessageReceived {
        sender_id: args[0].clone(),
        message: args[2].clone(),
    });
}
