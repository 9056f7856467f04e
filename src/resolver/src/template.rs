//! Statement templates for data connectors
//!
//! Connectors register a query template under a name and render it per
//! request. Templates are Handlebars templates rendered in strict mode, so a
//! reference to data the request does not carry fails rendering.
//!
//! # Template data
//!
//! - `{{requestContext.principalName}}` and the other request fields listed
//!   in [`SimpleTemplateEngine`]
//! - `{{mail.[0]}}`: first value of the `mail` dependency attribute
//! - `{{#each mail}}(mail={{this}}){{/each}}`: every value
//! - `{{[urn:oid:0.9.2342.19200300.100.1.3].[0]}}`: ids that are not plain
//!   identifiers use segment literals
//!
//! Every substituted value passes through the connector's escaping strategy
//! before rendering; Handlebars' own HTML escaping is disabled.

use handlebars::Handlebars;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use attrflow_core::AttributeRequestContext;

use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};

/// Escapes values substituted into a statement
pub trait CharacterEscapingStrategy: Send + Sync {
    fn escape(&self, value: &str) -> String;
}

/// Leaves values untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscaping;

impl CharacterEscapingStrategy for NoEscaping {
    fn escape(&self, value: &str) -> String {
        value.to_string()
    }
}

/// Renders named statement templates
pub trait TemplateEngine: Send + Sync {
    /// Register (or replace) a template
    fn register_template(&self, name: &str, template: &str) -> Result<()>;

    /// Render a registered template against the request and the given dependencies
    fn create_statement(
        &self,
        name: &str,
        ctx: &ResolutionContext,
        dependency_ids: &[String],
        escaping: &dyn CharacterEscapingStrategy,
    ) -> Result<String>;
}

/// Handlebars statement template engine
///
/// Request fields available under `requestContext`: `principalName`,
/// `principalAuthenticationMethod`, `inboundMessageIssuer`,
/// `outboundMessageIssuer`, `localEntityId`. Unset fields are absent.
pub struct SimpleTemplateEngine {
    handlebars: RwLock<Handlebars<'static>>,
}

impl SimpleTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self {
            handlebars: RwLock::new(handlebars),
        }
    }

    fn request_data(request: &AttributeRequestContext, escaping: &dyn CharacterEscapingStrategy) -> Value {
        let fields = [
            ("principalName", request.principal_name.as_deref()),
            ("principalAuthenticationMethod", request.principal_authentication_method.as_deref()),
            ("inboundMessageIssuer", request.inbound_message_issuer.as_deref()),
            ("outboundMessageIssuer", request.outbound_message_issuer.as_deref()),
            ("localEntityId", request.local_entity_id.as_deref()),
        ];

        let data: Map<String, Value> = fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name.to_string(), Value::String(escaping.escape(value)))))
            .collect();
        Value::Object(data)
    }

    fn template_data(
        ctx: &ResolutionContext,
        dependency_ids: &[String],
        escaping: &dyn CharacterEscapingStrategy,
    ) -> Value {
        let mut data = Map::new();
        for (id, attribute) in ctx.dependency_attributes(dependency_ids) {
            let values = attribute
                .values()
                .iter()
                .map(|value| Value::String(escaping.escape(&value.text())))
                .collect();
            data.insert(id, Value::Array(values));
        }
        data.insert(
            "requestContext".to_string(),
            Self::request_data(ctx.request(), escaping),
        );
        Value::Object(data)
    }
}

impl Default for SimpleTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for SimpleTemplateEngine {
    fn register_template(&self, name: &str, template: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ResolutionError::Template("template name must not be empty".to_string()));
        }
        self.handlebars
            .write()
            .register_template_string(name, template)
            .map_err(|e| ResolutionError::Template(format!("template '{}' is invalid: {}", name, e)))
    }

    fn create_statement(
        &self,
        name: &str,
        ctx: &ResolutionContext,
        dependency_ids: &[String],
        escaping: &dyn CharacterEscapingStrategy,
    ) -> Result<String> {
        let handlebars = self.handlebars.read();
        if !handlebars.has_template(name) {
            return Err(ResolutionError::Template(format!("no template registered as '{}'", name)));
        }

        let data = Self::template_data(ctx, dependency_ids, escaping);
        handlebars
            .render(name, &data)
            .map_err(|e| ResolutionError::Template(format!("template '{}': {}", name, e)))
    }
}
