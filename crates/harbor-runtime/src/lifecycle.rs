//! Per-request application lifecycle
//!
//! Every request gets a fresh [`ApplicationInstance`] built from the shared
//! bootstrap template and walks it through
//! `INIT -> BEFORE_REQUEST -> HANDLING_REQUEST -> AFTER_REQUEST -> SENDING_RESPONSE -> END`.
//! Early exits jump straight to sending, failures go to the error handler,
//! and teardown runs on every path.

use crate::adapter::{RequestAdapter, ResponseAdapter};
use crate::connection::{ConnectionProvider, NoDriver};
use crate::context::RequestContext;
use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::instance::{ApplicationInstance, ExitRequest, InstanceServices};
use crate::log::LogLevel;
use crate::state::LifecycleState;
use crate::tasks::TaskDispatcher;
use async_trait::async_trait;
use futures::FutureExt;
use harbor_config::Bootstrap;
use harbor_core::{Error, ResponsePayload, ResponseSink};
use http::StatusCode;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Default number of buffered log records before an automatic flush
pub const DEFAULT_LOG_FLUSH_INTERVAL: usize = 1000;

/// Why request handling stopped before the normal end
#[derive(Debug)]
pub enum Interrupt {
    /// Intentional early termination
    Exit(ExitRequest),
    /// Uncaught failure
    Failure(Error),
}

impl Interrupt {
    /// Exit early with a status and no body
    pub fn exit(status: StatusCode) -> Self {
        Self::Exit(ExitRequest::new(status))
    }
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Self::Failure(error)
    }
}

impl From<ExitRequest> for Interrupt {
    fn from(exit: ExitRequest) -> Self {
        Self::Exit(exit)
    }
}

/// Result type for application and hook code
pub type DispatchResult<T> = std::result::Result<T, Interrupt>;

/// The user application run for every request
#[async_trait]
pub trait Application: Send + Sync + fmt::Debug {
    /// Produce the response for the request held by `app`
    async fn handle_request(&self, app: &mut ApplicationInstance)
        -> DispatchResult<ResponsePayload>;
}

/// Code run around the application handler
#[async_trait]
pub trait LifecycleHook: Send + Sync + fmt::Debug {
    /// Runs in `BEFORE_REQUEST`
    async fn before_request(&self, _app: &mut ApplicationInstance) -> DispatchResult<()> {
        Ok(())
    }

    /// Runs in `AFTER_REQUEST` with the response about to be sent
    async fn after_request(
        &self,
        _app: &mut ApplicationInstance,
        _response: &mut ResponsePayload,
    ) -> DispatchResult<()> {
        Ok(())
    }
}

/// Fallback application answering every request with 404
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFound;

#[async_trait]
impl Application for NotFound {
    async fn handle_request(
        &self,
        app: &mut ApplicationInstance,
    ) -> DispatchResult<ResponsePayload> {
        let path = app.request().path().to_string();
        app.log(LogLevel::Info, "harbor.app", format!("no route for {path}"));
        Ok(ResponsePayload::new(StatusCode::NOT_FOUND).text("404 Not Found"))
    }
}

/// How a request finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Ran every state in order
    Completed,
    /// Terminated early on purpose
    Exited,
    /// An uncaught failure was handed to the error handler
    Failed,
}

struct EngineInner {
    bootstrap: Arc<Bootstrap>,
    application: Arc<dyn Application>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    error_handler: Arc<dyn ErrorHandler>,
    services: InstanceServices,
}

/// Drives one isolated application instance per request
#[derive(Clone)]
pub struct LifecycleEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("application", &self.inner.application)
            .field("hooks", &self.inner.hooks.len())
            .field("error_handler", &self.inner.error_handler)
            .finish()
    }
}

impl LifecycleEngine {
    /// Create an engine builder
    pub fn builder(bootstrap: Arc<Bootstrap>) -> LifecycleEngineBuilder {
        LifecycleEngineBuilder::new(bootstrap)
    }

    /// Shared bootstrap configuration
    pub fn bootstrap(&self) -> &Bootstrap {
        &self.inner.bootstrap
    }

    /// Handle one request from start to teardown
    ///
    /// Never fails: every failure is turned into a response by the error
    /// handler, and request-scoped resources are always released.
    pub async fn handle(&self, request: RequestAdapter, response: ResponseAdapter) -> RequestOutcome {
        let context = RequestContext::new(request, response, &self.inner.bootstrap.app);
        let span = tracing::info_span!(
            "request",
            request_id = %context.request_id,
            method = %context.request.method(),
            path = %context.request.path(),
        );

        self.run(context).instrument(span).await
    }

    async fn run(&self, mut context: RequestContext) -> RequestOutcome {
        if let Err(e) = context.prepare() {
            let mut response = context.into_response();
            self.report_failure(&e, &mut response);
            return RequestOutcome::Failed;
        }

        let mut app = ApplicationInstance::new(context, self.inner.services.clone());

        let outcome = match AssertUnwindSafe(self.drive(&mut app)).catch_unwind().await {
            Ok(Ok(())) => RequestOutcome::Completed,
            Ok(Err(Interrupt::Exit(exit))) => {
                tracing::debug!(status = %exit.status, state = %app.state(), "Request exited early");
                match app.end(exit) {
                    Ok(()) => RequestOutcome::Exited,
                    Err(e) => self.fail(&mut app, e),
                }
            }
            Ok(Err(Interrupt::Failure(e))) => self.fail(&mut app, e),
            Err(panic) => self.fail(&mut app, Error::Internal(panic_message(&*panic))),
        };

        let elapsed = app.elapsed();
        let report = app.teardown();
        if report.failed > 0 {
            tracing::warn!(
                released = report.released,
                failed = report.failed,
                "Some request resources failed to release"
            );
        }

        tracing::debug!(
            outcome = ?outcome,
            elapsed_ms = elapsed.as_millis(),
            released = report.released,
            "Request finished"
        );

        outcome
    }

    async fn drive(&self, app: &mut ApplicationInstance) -> DispatchResult<()> {
        app.transition(LifecycleState::BeforeRequest)?;
        for hook in &self.inner.hooks {
            hook.before_request(app).await?;
        }

        app.transition(LifecycleState::HandlingRequest)?;
        let mut payload = self.inner.application.handle_request(app).await?;

        app.transition(LifecycleState::AfterRequest)?;
        for hook in &self.inner.hooks {
            match hook.after_request(app, &mut payload).await {
                Ok(()) => {}
                Err(Interrupt::Exit(mut exit)) => {
                    if exit.response.is_none() {
                        exit.response = Some(payload);
                    }
                    return Err(Interrupt::Exit(exit));
                }
                Err(failure) => return Err(failure),
            }
        }

        app.transition(LifecycleState::SendingResponse)?;
        payload.send(app.response_mut())?;
        app.transition(LifecycleState::End)?;
        Ok(())
    }

    fn fail(&self, app: &mut ApplicationInstance, error: Error) -> RequestOutcome {
        app.log(LogLevel::Error, "harbor.lifecycle", error.to_string());
        self.report_failure(&error, app.response_mut());
        app.abandon();
        RequestOutcome::Failed
    }

    fn report_failure(&self, error: &Error, response: &mut ResponseAdapter) {
        let env = self.inner.bootstrap.env;
        let handler = &self.inner.error_handler;
        let handled = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle_exception(error, response, &env)
        }));

        if handled.is_err() {
            tracing::error!(error = %error, "Error handler panicked");
            if !response.is_sent() {
                let fallback = ResponsePayload::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .text("500 Internal Server Error");
                if let Err(e) = fallback.send(response) {
                    tracing::error!(error = %e, "Failed to send fallback error response");
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("request handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("request handler panicked: {message}")
    } else {
        "request handler panicked".to_string()
    }
}

/// Builder for [`LifecycleEngine`]
pub struct LifecycleEngineBuilder {
    bootstrap: Arc<Bootstrap>,
    application: Arc<dyn Application>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    error_handler: Arc<dyn ErrorHandler>,
    connections: Arc<dyn ConnectionProvider>,
    tasks: Option<TaskDispatcher>,
    log_flush_interval: usize,
}

impl fmt::Debug for LifecycleEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEngineBuilder")
            .field("application", &self.application)
            .field("hooks", &self.hooks.len())
            .field("tasks", &self.tasks.is_some())
            .field("log_flush_interval", &self.log_flush_interval)
            .finish()
    }
}

impl LifecycleEngineBuilder {
    /// Create a builder with the 404 application and default collaborators
    pub fn new(bootstrap: Arc<Bootstrap>) -> Self {
        Self {
            bootstrap,
            application: Arc::new(NotFound),
            hooks: Vec::new(),
            error_handler: Arc::new(DefaultErrorHandler),
            connections: Arc::new(NoDriver),
            tasks: None,
            log_flush_interval: DEFAULT_LOG_FLUSH_INTERVAL,
        }
    }

    /// Set the application
    pub fn application(mut self, application: Arc<dyn Application>) -> Self {
        self.application = application;
        self
    }

    /// Add a lifecycle hook; hooks run in insertion order
    pub fn hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set the process-wide error handler
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Set the database connection provider
    pub fn connections(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.connections = provider;
        self
    }

    /// Enable task dispatch from request code
    pub fn tasks(mut self, dispatcher: TaskDispatcher) -> Self {
        self.tasks = Some(dispatcher);
        self
    }

    /// Records buffered per request before an automatic flush (0 disables)
    pub fn log_flush_interval(mut self, interval: usize) -> Self {
        self.log_flush_interval = interval;
        self
    }

    /// Build the engine
    pub fn build(self) -> LifecycleEngine {
        let services = InstanceServices {
            connections: self.connections,
            tasks: self.tasks,
            env: self.bootstrap.env,
            log_flush_interval: self.log_flush_interval,
        };

        LifecycleEngine {
            inner: Arc::new(EngineInner {
                bootstrap: self.bootstrap,
                application: self.application,
                hooks: self.hooks,
                error_handler: self.error_handler,
                services,
            }),
        }
    }
}
