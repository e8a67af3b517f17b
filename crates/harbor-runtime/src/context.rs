//! Per-request context

use crate::adapter::{RequestAdapter, ResponseAdapter};
use harbor_config::{AppConfig, ComponentDefinition};
use harbor_core::{Error, Result};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Component name of the request binding
pub const REQUEST_COMPONENT: &str = "request";
/// Component name of the response binding
pub const RESPONSE_COMPONENT: &str = "response";
/// Component name of the error handler binding
pub const ERROR_HANDLER_COMPONENT: &str = "errorHandler";

const REQUEST_CLASS: &str = "harbor_runtime::RequestAdapter";
const RESPONSE_CLASS: &str = "harbor_runtime::ResponseAdapter";
const ERROR_HANDLER_CLASS: &str = "harbor_runtime::ErrorHandler";

/// Everything one request owns, built fresh at request start
#[derive(Debug)]
pub struct RequestContext {
    /// Unique request ID for tracing
    pub request_id: String,
    /// Native request adapter
    pub request: RequestAdapter,
    /// Native response adapter
    pub response: ResponseAdapter,
    /// Private clone of the application template
    pub config: AppConfig,
    /// Alias map for this request
    pub aliases: BTreeMap<String, String>,
}

impl RequestContext {
    /// Build a context with its own deep copy of `template`
    pub fn new(request: RequestAdapter, response: ResponseAdapter, template: &AppConfig) -> Self {
        let config = template.clone();
        let aliases = config.aliases.clone();
        Self {
            request_id: Uuid::new_v4().to_string(),
            request,
            response,
            config,
            aliases,
        }
    }

    /// Inject the adapter and error handler bindings and validate the clone
    pub fn prepare(&mut self) -> Result<()> {
        self.config.override_component(
            REQUEST_COMPONENT,
            ComponentDefinition::with_class(REQUEST_CLASS),
        );
        self.config.override_component(
            RESPONSE_COMPONENT,
            ComponentDefinition::with_class(RESPONSE_CLASS),
        );
        self.config.override_component(
            ERROR_HANDLER_COMPONENT,
            ComponentDefinition::with_class(ERROR_HANDLER_CLASS),
        );

        for name in self.aliases.keys() {
            if !name.starts_with('@') {
                return Err(Error::Config(format!(
                    "alias '{name}' must start with '@'"
                )));
            }
        }

        for name in self.config.components.keys() {
            if name.is_empty() {
                return Err(Error::Config("component name cannot be empty".to_string()));
            }
        }

        Ok(())
    }

    /// Take back the response adapter when the instance cannot be built
    pub fn into_response(self) -> ResponseAdapter {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn context(template: &AppConfig) -> RequestContext {
        let request = RequestAdapter::new(
            http::Request::builder().uri("/").body(Bytes::new()).unwrap(),
            None,
        );
        let (response, _receiver) = ResponseAdapter::channel();
        RequestContext::new(request, response, template)
    }

    #[test]
    fn test_injected_class_wins_and_properties_kept() {
        let mut template = AppConfig::default();
        template.components.insert(
            REQUEST_COMPONENT.to_string(),
            ComponentDefinition::with_class("Custom").property("cookieValidationKey", json!("k")),
        );

        let mut ctx = context(&template);
        ctx.prepare().unwrap();

        let request = ctx.config.component(REQUEST_COMPONENT).unwrap();
        assert_eq!(request.class.as_deref(), Some(REQUEST_CLASS));
        assert_eq!(request.properties["cookieValidationKey"], json!("k"));
        assert!(ctx.config.component(ERROR_HANDLER_COMPONENT).is_some());

        // template untouched
        assert_eq!(
            template.component(REQUEST_COMPONENT).unwrap().class.as_deref(),
            Some("Custom")
        );
    }

    #[test]
    fn test_malformed_alias_rejected() {
        let mut template = AppConfig::default();
        template.aliases.insert("webroot".to_string(), "/srv".to_string());

        let mut ctx = context(&template);
        assert!(matches!(ctx.prepare(), Err(Error::Config(_))));
    }

    #[test]
    fn test_request_ids_unique() {
        let template = AppConfig::default();
        assert_ne!(context(&template).request_id, context(&template).request_id);
    }
}
