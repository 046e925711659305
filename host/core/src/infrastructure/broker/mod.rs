// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Broker
//!
//! Turns one bidirectional stream of [`Envelope`]s into a table of typed
//! handlers plus a receive loop, and lets the owning side issue its own
//! requests over the same stream and await the correlated reply.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Request/response multiplexing shared by the host's provider
//!   streams and the extension SDK
//!
//! ## Semantics
//!
//! - Inbound messages are processed strictly in receive order. A handler that
//!   blocks delays the next message on the same stream.
//! - A message whose request id matches an outstanding [`MessageBroker::send_and_wait`]
//!   is delivered to that waiter (progress updates included); anything else is
//!   dispatched to the handler registered for its kind. When the waiter's
//!   buffer is full the receive loop waits for room, so replies are never
//!   dropped for a live waiter.
//! - Every outbound write goes through one `mpsc` sender, which is the single
//!   writer for the stream.
//! - A handler error or panic becomes an error response for that request id.

mod envelope;

pub use envelope::Envelope;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::provider::ProgressReporter;
use crate::infrastructure::pending::{Delivery, PendingCallError, PendingCalls};

/// Default number of replies buffered per outstanding request.
pub const DEFAULT_RESPONSE_BUFFER: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("a handler for '{0}' is already registered")]
    DuplicateHandler(&'static str),

    #[error("broker is already running")]
    AlreadyRunning,

    #[error("broker cancelled")]
    Cancelled,

    #[error("stream failed: {0}")]
    Stream(Status),

    #[error("stream closed")]
    Closed,

    #[error("request '{0}' is already in flight")]
    DuplicateRequest(String),

    #[error("peer returned an error: {0}")]
    Remote(String),
}

type Handler<M> = Arc<dyn Fn(HandlerContext<M>, M) -> BoxFuture<'static, anyhow::Result<Option<M>>> + Send + Sync>;

/// Per-request context handed to a handler.
pub struct HandlerContext<M: Envelope> {
    request_id: String,
    cancel: CancellationToken,
    outbound: mpsc::Sender<Result<M, Status>>,
}

impl<M: Envelope> HandlerContext<M> {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Cancelled when the broker stops.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn report_progress(&self, message: &str) {
        if let Some(progress) = M::progress(&self.request_id, message) {
            let _ = self.outbound.send(Ok(progress)).await;
        }
    }

    /// Synchronous progress callback for code that cannot await. Updates are
    /// dropped when the outbound buffer is full.
    pub fn progress_reporter(&self) -> ProgressReporter {
        let outbound = self.outbound.clone();
        let request_id = self.request_id.clone();
        Arc::new(move |message: &str| {
            if let Some(progress) = M::progress(&request_id, message) {
                let _ = outbound.try_send(Ok(progress));
            }
        })
    }
}

pub struct MessageBroker<M: Envelope> {
    name: String,
    outbound: RwLock<Option<mpsc::Sender<Result<M, Status>>>>,
    handlers: RwLock<HashMap<&'static str, Handler<M>>>,
    pending: PendingCalls<String, M>,
    running: AtomicBool,
    closed: CancellationToken,
}

impl<M: Envelope> MessageBroker<M> {
    pub fn new(name: impl Into<String>, outbound: mpsc::Sender<Result<M, Status>>) -> Self {
        Self::with_response_buffer(name, outbound, DEFAULT_RESPONSE_BUFFER)
    }

    pub fn with_response_buffer(
        name: impl Into<String>,
        outbound: mpsc::Sender<Result<M, Status>>,
        response_buffer: usize,
    ) -> Self {
        Self {
            name: name.into(),
            outbound: RwLock::new(Some(outbound)),
            handlers: RwLock::new(HashMap::new()),
            pending: PendingCalls::new(response_buffer),
            running: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the handler for one envelope kind.
    pub fn on<F, Fut>(&self, kind: &'static str, handler: F) -> Result<(), BrokerError>
    where
        F: Fn(HandlerContext<M>, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<M>>> + Send + 'static,
    {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(kind) {
            return Err(BrokerError::DuplicateHandler(kind));
        }
        handlers.insert(kind, Arc::new(move |ctx, msg| handler(ctx, msg).boxed()));
        Ok(())
    }

    fn sender(&self) -> Option<mpsc::Sender<Result<M, Status>>> {
        self.outbound.read().clone()
    }

    /// Fire-and-forget write through the stream's single writer.
    pub async fn send(&self, msg: M) -> Result<(), BrokerError> {
        let outbound = self.sender().ok_or(BrokerError::Closed)?;
        outbound
            .send(Ok(msg))
            .await
            .map_err(|_| BrokerError::Closed)
    }

    /// Send a request and wait for the reply carrying the same request id.
    ///
    /// An id is generated when the message has none. Progress updates for the
    /// request go to `progress`; an error payload becomes [`BrokerError::Remote`].
    pub async fn send_and_wait(
        &self,
        mut msg: M,
        progress: Option<ProgressReporter>,
    ) -> Result<M, BrokerError> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        if msg.request_id().is_empty() {
            msg.set_request_id(&Uuid::new_v4().to_string());
        }
        let request_id = msg.request_id().to_string();

        let mut call = self.pending.register(request_id.clone()).map_err(|e| match e {
            PendingCallError::AlreadyPending(id) => BrokerError::DuplicateRequest(id),
            _ => BrokerError::Closed,
        })?;

        debug!(broker = %self.name, request_id = %request_id, kind = msg.kind(), "Sending request");
        self.send(msg).await?;

        loop {
            let reply = call.recv(&self.closed).await.map_err(|_| BrokerError::Closed)?;

            if let Some(text) = reply.progress_text() {
                if let Some(progress) = &progress {
                    progress(text);
                }
                continue;
            }

            if let Some(message) = reply.error_message() {
                return Err(BrokerError::Remote(message));
            }

            return Ok(reply);
        }
    }

    /// Receive loop. Returns `Ok(())` when the peer closes the stream and
    /// [`BrokerError::Cancelled`] when `cancel` fires. Only one run is allowed
    /// per broker; when it exits, outstanding and future requests fail with
    /// [`BrokerError::Closed`], handlers are released and the outbound half
    /// is dropped so the stream can finish.
    pub async fn run<S>(&self, mut inbound: S, cancel: CancellationToken) -> Result<(), BrokerError>
    where
        S: Stream<Item = Result<M, Status>> + Unpin + Send,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyRunning);
        }

        let Some(outbound) = self.sender() else {
            return Err(BrokerError::Closed);
        };

        debug!(broker = %self.name, "Broker started");
        let result = self.receive_loop(&mut inbound, &outbound, &cancel).await;

        drop(outbound);
        self.outbound.write().take();
        self.handlers.write().clear();
        self.pending.close();
        self.closed.cancel();
        debug!(broker = %self.name, ?result, "Broker stopped");
        result
    }

    async fn receive_loop<S>(
        &self,
        inbound: &mut S,
        outbound: &mpsc::Sender<Result<M, Status>>,
        cancel: &CancellationToken,
    ) -> Result<(), BrokerError>
    where
        S: Stream<Item = Result<M, Status>> + Unpin + Send,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BrokerError::Cancelled),
                _ = outbound.closed() => return Ok(()),
                next = inbound.next() => next,
            };

            let msg = match next {
                None => return Ok(()),
                Some(Err(status)) if status.code() == Code::Cancelled => return Ok(()),
                Some(Err(status)) => return Err(BrokerError::Stream(status)),
                Some(Ok(msg)) => msg,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BrokerError::Cancelled),
                _ = self.dispatch(msg, outbound, cancel) => {}
            }
        }
    }

    async fn dispatch(&self, msg: M, outbound: &mpsc::Sender<Result<M, Status>>, cancel: &CancellationToken) {
        let request_id = msg.request_id().to_string();

        if !request_id.is_empty() && self.pending.contains(&request_id) {
            match self.pending.deliver(&request_id, msg).await {
                Delivery::Delivered => {}
                outcome => warn!(
                    broker = %self.name,
                    request_id = %request_id,
                    ?outcome,
                    "Dropping reply for request"
                ),
            }
            return;
        }

        let kind = msg.kind();
        let handler = self.handlers.read().get(kind).cloned();
        let Some(handler) = handler else {
            warn!(broker = %self.name, kind, request_id = %request_id, "No handler registered, dropping message");
            return;
        };

        debug!(broker = %self.name, kind, request_id = %request_id, "Dispatching message");
        let ctx = HandlerContext {
            request_id: request_id.clone(),
            cancel: cancel.child_token(),
            outbound: outbound.clone(),
        };

        let outcome = AssertUnwindSafe(async move { handler(ctx, msg).await })
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(Some(mut response))) => {
                if response.request_id().is_empty() {
                    response.set_request_id(&request_id);
                }
                Some(response)
            }
            Ok(Ok(None)) => None,
            Ok(Err(err)) => {
                warn!(broker = %self.name, kind, request_id = %request_id, error = %err, "Handler failed");
                M::error_response(&request_id, &err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(broker = %self.name, kind, request_id = %request_id, panic = %message, "Handler panicked");
                M::error_response(&request_id, &format!("handler panicked: {message}"))
            }
        };

        if let Some(response) = response {
            if outbound.send(Ok(response)).await.is_err() {
                debug!(broker = %self.name, request_id = %request_id, "Outbound closed before response was written");
            }
        }
    }

    /// True once `run` has exited.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves when `run` has exited.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio_stream::wrappers::ReceiverStream;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct TestMsg {
        request_id: String,
        kind: &'static str,
        body: String,
        error: Option<String>,
        progress: Option<String>,
    }

    impl TestMsg {
        fn new(kind: &'static str, body: &str) -> Self {
            Self {
                kind,
                body: body.to_string(),
                ..Default::default()
            }
        }

        fn with_id(mut self, id: &str) -> Self {
            self.request_id = id.to_string();
            self
        }
    }

    impl Envelope for TestMsg {
        fn kind(&self) -> &'static str {
            self.kind
        }

        fn request_id(&self) -> &str {
            &self.request_id
        }

        fn set_request_id(&mut self, request_id: &str) {
            self.request_id = request_id.to_string();
        }

        fn error_message(&self) -> Option<String> {
            self.error.clone()
        }

        fn error_response(request_id: &str, message: &str) -> Option<Self> {
            Some(Self {
                request_id: request_id.to_string(),
                kind: "error",
                error: Some(message.to_string()),
                ..Default::default()
            })
        }

        fn progress_text(&self) -> Option<&str> {
            self.progress.as_deref()
        }

        fn progress(request_id: &str, message: &str) -> Option<Self> {
            Some(Self {
                request_id: request_id.to_string(),
                kind: "progress",
                progress: Some(message.to_string()),
                ..Default::default()
            })
        }
    }

    struct Harness {
        broker: Arc<MessageBroker<TestMsg>>,
        inbound: mpsc::Sender<Result<TestMsg, Status>>,
        inbound_rx: Option<ReceiverStream<Result<TestMsg, Status>>>,
        outbound: mpsc::Receiver<Result<TestMsg, Status>>,
    }

    fn harness() -> Harness {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        Harness {
            broker: Arc::new(MessageBroker::new("test", out_tx)),
            inbound: in_tx,
            inbound_rx: Some(ReceiverStream::new(in_rx)),
            outbound: out_rx,
        }
    }

    #[tokio::test]
    async fn test_handler_reply_echoes_request_id() {
        let mut h = harness();
        h.broker
            .on("echo", |_ctx, msg: TestMsg| async move {
                Ok(Some(TestMsg::new("echo_response", &msg.body.to_uppercase())))
            })
            .unwrap();

        let inbound = h.inbound_rx.take().unwrap();
        let broker = h.broker.clone();
        let run = tokio::spawn(async move { broker.run(inbound, CancellationToken::new()).await });

        h.inbound.send(Ok(TestMsg::new("echo", "hi").with_id("r1"))).await.unwrap();
        let reply = h.outbound.recv().await.unwrap().unwrap();
        assert_eq!(reply.request_id, "r1");
        assert_eq!(reply.body, "HI");

        drop(h.inbound);
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_handler_rejected() {
        let h = harness();
        h.broker.on("a", |_c, _m: TestMsg| async { Ok(None) }).unwrap();
        assert!(matches!(
            h.broker.on("a", |_c, _m: TestMsg| async { Ok(None) }),
            Err(BrokerError::DuplicateHandler("a"))
        ));
    }

    #[tokio::test]
    async fn test_only_one_run() {
        let mut h = harness();
        let inbound = h.inbound_rx.take().unwrap();
        drop(h.inbound);
        h.broker.run(inbound, CancellationToken::new()).await.unwrap();

        let (_tx, rx) = mpsc::channel::<Result<TestMsg, Status>>(1);
        assert!(matches!(
            h.broker.run(ReceiverStream::new(rx), CancellationToken::new()).await,
            Err(BrokerError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_run_and_releases_waiters() {
        let mut h = harness();
        let inbound = h.inbound_rx.take().unwrap();
        let cancel = CancellationToken::new();
        let broker = h.broker.clone();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { broker.run(inbound, cancel).await })
        };

        let broker = h.broker.clone();
        let waiter = tokio::spawn(async move { broker.send_and_wait(TestMsg::new("ask", ""), None).await });
        let _request = h.outbound.recv().await.unwrap();

        cancel.cancel();
        assert!(matches!(run.await.unwrap(), Err(BrokerError::Cancelled)));
        assert!(matches!(waiter.await.unwrap(), Err(BrokerError::Closed)));
        assert!(matches!(
            h.broker.send_and_wait(TestMsg::new("ask", ""), None).await,
            Err(BrokerError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_send_and_wait_forwards_progress() {
        let mut h = harness();
        let inbound = h.inbound_rx.take().unwrap();
        let broker = h.broker.clone();
        tokio::spawn(async move { broker.run(inbound, CancellationToken::new()).await });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter: ProgressReporter = {
            let seen = seen.clone();
            Arc::new(move |text: &str| seen.lock().push(text.to_string()))
        };

        let broker = h.broker.clone();
        let call = tokio::spawn(async move {
            broker.send_and_wait(TestMsg::new("deploy", "svc"), Some(reporter)).await
        });

        let request = h.outbound.recv().await.unwrap().unwrap();
        assert!(!request.request_id.is_empty());

        let id = request.request_id.clone();
        h.inbound.send(Ok(TestMsg::progress(&id, "uploading").unwrap())).await.unwrap();
        h.inbound.send(Ok(TestMsg::new("deploy_response", "done").with_id(&id))).await.unwrap();

        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.body, "done");
        assert_eq!(*seen.lock(), vec!["uploading".to_string()]);
        assert_eq!(h.broker.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_final_reply_survives_progress_burst_larger_than_buffer() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(128);
        let broker = Arc::new(MessageBroker::with_response_buffer("test", out_tx, 4));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter: ProgressReporter = {
            let seen = seen.clone();
            Arc::new(move |text: &str| seen.lock().push(text.to_string()))
        };
        let call = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker.send_and_wait(TestMsg::new("deploy", "svc"), Some(reporter)).await
            })
        };
        let id = out_rx.recv().await.unwrap().unwrap().request_id;

        for n in 0..60 {
            let update = TestMsg::progress(&id, &format!("step {n}")).unwrap();
            in_tx.send(Ok(update)).await.unwrap();
        }
        in_tx.send(Ok(TestMsg::new("deploy_response", "done").with_id(&id))).await.unwrap();

        {
            let broker = broker.clone();
            let inbound = ReceiverStream::new(in_rx);
            tokio::spawn(async move { broker.run(inbound, CancellationToken::new()).await });
        }

        let reply = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("final reply was dropped")
            .unwrap()
            .unwrap();
        assert_eq!(reply.body, "done");
        assert_eq!(seen.lock().len(), 60);
        assert_eq!(seen.lock().last().map(String::as_str), Some("step 59"));
    }

    #[tokio::test]
    async fn test_remote_error_surfaces() {
        let mut h = harness();
        let inbound = h.inbound_rx.take().unwrap();
        let broker = h.broker.clone();
        tokio::spawn(async move { broker.run(inbound, CancellationToken::new()).await });

        let broker = h.broker.clone();
        let call = tokio::spawn(async move { broker.send_and_wait(TestMsg::new("deploy", ""), None).await });

        let request = h.outbound.recv().await.unwrap().unwrap();
        let failure = TestMsg::error_response(&request.request_id, "quota exceeded").unwrap();
        h.inbound.send(Ok(failure)).await.unwrap();

        match call.await.unwrap() {
            Err(BrokerError::Remote(message)) => assert_eq!(message, "quota exceeded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_error_response() {
        let mut h = harness();
        h.broker
            .on("boom", |_c, _m: TestMsg| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(None)
            })
            .unwrap();
        let inbound = h.inbound_rx.take().unwrap();
        let broker = h.broker.clone();
        tokio::spawn(async move { broker.run(inbound, CancellationToken::new()).await });

        h.inbound.send(Ok(TestMsg::new("boom", "").with_id("r9"))).await.unwrap();
        let reply = h.outbound.recv().await.unwrap().unwrap();

        assert_eq!(reply.request_id, "r9");
        assert!(reply.error.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_messages_processed_in_order() {
        let mut h = harness();
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let order = order.clone();
            h.broker
                .on("step", move |_c, msg: TestMsg| {
                    let order = order.clone();
                    async move {
                        if msg.body == "slow" {
                            tokio::time::sleep(Duration::from_millis(30)).await;
                        }
                        order.lock().push(msg.body);
                        Ok(None)
                    }
                })
                .unwrap();
        }
        let inbound = h.inbound_rx.take().unwrap();
        let broker = h.broker.clone();
        let run = tokio::spawn(async move { broker.run(inbound, CancellationToken::new()).await });

        h.inbound.send(Ok(TestMsg::new("step", "slow"))).await.unwrap();
        h.inbound.send(Ok(TestMsg::new("step", "fast"))).await.unwrap();
        drop(h.inbound);
        run.await.unwrap().unwrap();

        assert_eq!(*order.lock(), vec!["slow".to_string(), "fast".to_string()]);
    }
}
