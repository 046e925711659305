// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;

/// A message type carried over one bidirectional stream.
///
/// `kind` names the active variant and is what broker handlers are keyed on.
/// Message types without request correlation (the event stream) keep the
/// default id accessors.
pub trait Envelope: Sized + Send + Sync + fmt::Debug + 'static {
    fn kind(&self) -> &'static str;

    fn request_id(&self) -> &str {
        ""
    }

    fn set_request_id(&mut self, _request_id: &str) {}

    /// Error text carried by a response, if the peer reported a failure.
    fn error_message(&self) -> Option<String> {
        None
    }

    /// Build a response reporting `message` for `request_id`.
    fn error_response(_request_id: &str, _message: &str) -> Option<Self> {
        None
    }

    fn progress_text(&self) -> Option<&str> {
        None
    }

    fn progress(_request_id: &str, _message: &str) -> Option<Self> {
        None
    }
}
