//! The isolated application object for one request

use crate::adapter::{RequestAdapter, ResponseAdapter};
use crate::connection::{Connection, ConnectionProvider};
use crate::context::RequestContext;
use crate::log::{LogBuffer, LogLevel};
use crate::registry::{ReleaseReport, ResourceHandle, ResourceId, ResourceRegistry, UploadedFile};
use crate::state::LifecycleState;
use crate::tasks::{Task, TaskDispatcher};
use harbor_config::{resolve_alias, AppConfig, ComponentDefinition, RuntimeEnv};
use harbor_core::{Error, ResponsePayload, ResponseSink, Result};
use http::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Intentional early termination of request handling
#[derive(Debug, Clone)]
pub struct ExitRequest {
    /// Status code to answer with
    pub status: StatusCode,
    /// Response to send, if one was already built
    pub response: Option<ResponsePayload>,
}

impl ExitRequest {
    /// Exit with a status and no body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            response: None,
        }
    }

    /// Exit with a prepared response
    pub fn with_response(mut self, response: ResponsePayload) -> Self {
        self.response = Some(response);
        self
    }
}

/// Shared services an instance draws on
#[derive(Debug, Clone)]
pub(crate) struct InstanceServices {
    pub(crate) connections: Arc<dyn ConnectionProvider>,
    pub(crate) tasks: Option<TaskDispatcher>,
    pub(crate) env: RuntimeEnv,
    pub(crate) log_flush_interval: usize,
}

/// Application instance owned by exactly one request
#[derive(Debug)]
pub struct ApplicationInstance {
    id: String,
    state: LifecycleState,
    request: RequestAdapter,
    response: ResponseAdapter,
    config: AppConfig,
    aliases: BTreeMap<String, String>,
    registry: ResourceRegistry,
    log: LogBuffer,
    connections: HashMap<String, ResourceId>,
    pending_response: Option<ResponsePayload>,
    services: InstanceServices,
    started: Instant,
}

impl ApplicationInstance {
    pub(crate) fn new(context: RequestContext, services: InstanceServices) -> Self {
        let RequestContext {
            request_id,
            request,
            response,
            config,
            aliases,
        } = context;

        let log = LogBuffer::new(request_id.as_str(), services.log_flush_interval);
        let mut registry = ResourceRegistry::new();
        registry.register(ResourceHandle::LogBuffer(log.clone()));

        Self {
            id: request_id,
            state: LifecycleState::Init,
            request,
            response,
            config,
            aliases,
            registry,
            log,
            connections: HashMap::new(),
            pending_response: None,
            services,
            started: Instant::now(),
        }
    }

    /// Request ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to the next lifecycle state
    pub fn transition(&mut self, to: LifecycleState) -> Result<()> {
        self.state = self.state.transition(to)?;
        tracing::trace!(request_id = %self.id, state = %self.state, "Lifecycle state changed");
        Ok(())
    }

    /// The native request
    pub fn request(&self) -> &RequestAdapter {
        &self.request
    }

    /// The native response
    pub fn response_mut(&mut self) -> &mut ResponseAdapter {
        &mut self.response
    }

    /// This request's configuration clone
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Mutable access to this request's configuration clone
    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// A component definition
    pub fn component(&self, name: &str) -> Option<&ComponentDefinition> {
        self.config.component(name)
    }

    /// Process-wide debug/environment constants
    pub fn env(&self) -> &RuntimeEnv {
        &self.services.env
    }

    /// Look up an alias
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Define or replace an alias for this request only
    pub fn set_alias(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.aliases.insert(name.into(), path.into());
    }

    /// Resolve `@alias/rest`
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        resolve_alias(&self.aliases, path)
    }

    /// Named connection, opened on first use and closed at request end
    pub fn connection(&mut self, name: &str) -> Result<&mut dyn Connection> {
        let id = match self.connections.get(name) {
            Some(id) => *id,
            None => {
                let definition = self
                    .config
                    .connections
                    .get(name)
                    .ok_or_else(|| Error::connection(name, "connection is not configured"))?;
                let connection = self.services.connections.open(name, definition)?;
                let id = self
                    .registry
                    .register(ResourceHandle::DatabaseConnection(connection));
                self.connections.insert(name.to_string(), id);
                id
            }
        };

        match self.registry.get_mut(id) {
            Some(ResourceHandle::DatabaseConnection(connection)) => Ok(connection.as_mut()),
            _ => Err(Error::Internal(format!(
                "connection '{name}' missing from registry"
            ))),
        }
    }

    /// Track an uploaded temp file for removal at request end
    pub fn register_upload(&mut self, file: UploadedFile) -> ResourceId {
        self.registry.register(ResourceHandle::UploadedFile(file))
    }

    /// Track any other request-scoped resource
    pub fn register_resource(&mut self, handle: ResourceHandle) -> ResourceId {
        self.registry.register(handle)
    }

    /// Resources currently held
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Buffer an application log record
    pub fn log(&self, level: LogLevel, category: &str, message: impl Into<String>) {
        self.log.log(level, category, message);
    }

    /// Queue a background task
    pub fn dispatch_task(&self, task: Task) -> Result<()> {
        match &self.services.tasks {
            Some(tasks) => tasks.dispatch(task),
            None => Err(Error::TaskQueue("task workers are not enabled".to_string())),
        }
    }

    /// Elapsed time since the instance was built
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stage the response built so far, used if the request exits early
    pub fn stage_response(&mut self, payload: ResponsePayload) {
        self.pending_response = Some(payload);
    }

    /// Finish through the early-exit path
    ///
    /// Sends the exit's response, or the response built so far, or an empty
    /// body, with the exit status. Nothing is sent twice.
    pub fn end(&mut self, exit: ExitRequest) -> Result<()> {
        if self.state == LifecycleState::End {
            return Ok(());
        }
        if self.state != LifecycleState::SendingResponse {
            self.transition(LifecycleState::SendingResponse)?;
        }

        if !self.response.is_sent() {
            let mut payload = exit
                .response
                .or_else(|| self.pending_response.take())
                .unwrap_or_default();
            payload.set_status(exit.status);
            payload.send(&mut self.response)?;
        }

        self.transition(LifecycleState::End)
    }

    /// Mark the instance finished after the error handler ran
    pub(crate) fn abandon(&mut self) {
        self.state = LifecycleState::End;
    }

    /// Release every request-scoped resource and drop the instance
    pub fn teardown(mut self) -> ReleaseReport {
        self.log.log(
            LogLevel::Trace,
            "harbor.lifecycle",
            format!(
                "request finished in state {} after {}ms",
                self.state,
                self.started.elapsed().as_millis()
            ),
        );
        self.registry.release_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::NoDriver;
    use bytes::Bytes;
    use harbor_config::ConnectionDefinition;
    use http_body_util::BodyExt;

    fn instance() -> (ApplicationInstance, crate::adapter::ResponseReceiver) {
        let request = RequestAdapter::new(
            http::Request::builder().uri("/").body(Bytes::new()).unwrap(),
            None,
        );
        let (response, receiver) = ResponseAdapter::channel();
        let mut config = AppConfig::default();
        config.connections.insert(
            "db".to_string(),
            ConnectionDefinition {
                dsn: "sqlite::memory:".to_string(),
                ..Default::default()
            },
        );
        let context = RequestContext::new(request, response, &config);
        let services = InstanceServices {
            connections: Arc::new(NoDriver),
            tasks: None,
            env: RuntimeEnv::default(),
            log_flush_interval: 0,
        };
        (ApplicationInstance::new(context, services), receiver)
    }

    #[tokio::test]
    async fn test_end_uses_pending_response() {
        let (mut instance, receiver) = instance();
        instance.transition(LifecycleState::BeforeRequest).unwrap();
        instance.transition(LifecycleState::HandlingRequest).unwrap();
        instance.stage_response(ResponsePayload::default().text("partial"));

        instance.end(ExitRequest::new(StatusCode::ACCEPTED)).unwrap();
        assert_eq!(instance.state(), LifecycleState::End);

        let response = receiver.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"partial");
    }

    #[tokio::test]
    async fn test_end_twice_is_noop() {
        let (mut instance, receiver) = instance();
        instance.end(ExitRequest::new(StatusCode::NO_CONTENT)).unwrap();
        instance.end(ExitRequest::new(StatusCode::OK)).unwrap();
        assert_eq!(receiver.await.unwrap().status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_connection_errors() {
        let (mut instance, _receiver) = instance();
        assert!(instance.connection("missing").is_err());
        assert!(matches!(
            instance.connection("db"),
            Err(Error::Connection { .. })
        ));
    }

    #[test]
    fn test_aliases_and_tasks_disabled() {
        let (mut instance, _receiver) = instance();
        instance.set_alias("@uploads", "/data/uploads");
        assert_eq!(
            instance.resolve("@uploads/a.png"),
            Some(PathBuf::from("/data/uploads/a.png"))
        );
        assert!(instance
            .dispatch_task(Task::new("noop", serde_json::Value::Null))
            .is_err());
    }

    #[test]
    fn test_teardown_releases_log_buffer() {
        let (instance, _receiver) = instance();
        assert_eq!(instance.registry().len(), 1);
        let report = instance.teardown();
        assert_eq!(report.released, 1);
        assert_eq!(report.failed, 0);
    }
}
