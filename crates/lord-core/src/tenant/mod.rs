//! Request-to-tenant resolution.
//!
//! An ordered list of rules is evaluated against a [`RequestView`]; the
//! first rule that yields a non-empty value names the tenant.
use lord_model::TenantConfig;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{CoreError, CoreResult};

pub mod path;

mod rule;
pub use rule::{RequestSource, TenantRule};

mod dispatch;
pub use dispatch::{Dispatched, Rejection, TenantDispatcher};

/// The parts of an inbound request tenant rules can read.
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone)]
pub struct RequestView {
    header: Value,
    cookie: Value,
    get: Value,
    post: Value,
}

fn insert(target: &mut Value, key: String, value: Value) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        map.insert(key, value);
    }
}

impl RequestView {
    pub fn new() -> Self {
        Self {
            header: Value::Object(Map::new()),
            cookie: Value::Object(Map::new()),
            get: Value::Object(Map::new()),
            post: Value::Object(Map::new()),
        }
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        insert(
            &mut self.header,
            name.as_ref().to_ascii_lowercase(),
            Value::String(value.into()),
        );
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert(&mut self.cookie, name.into(), Value::String(value.into()));
        self
    }

    /// One query-string parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert(&mut self.get, name.into(), Value::String(value.into()));
        self
    }

    /// Decoded request body (form fields or a JSON document).
    pub fn body(mut self, body: Value) -> Self {
        self.post = body;
        self
    }

    pub fn source(&self, source: RequestSource) -> &Value {
        match source {
            RequestSource::Header => &self.header,
            RequestSource::Cookie => &self.cookie,
            RequestSource::Get => &self.get,
            RequestSource::Post => &self.post,
        }
    }
}

impl Default for RequestView {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered tenant rules plus an optional fallback tenant.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    rules: Vec<TenantRule>,
    fallback: Option<String>,
}

impl TenantResolver {
    /// Parse a comma-separated rule list such as
    /// `header.TENANT-ID, jwt.header.Authorization.tenant_id`.
    ///
    /// Rules are tried in order; an empty list or an unknown source is an error.
    ///
    /// # Examples
    /// ```
    /// use lord_core::{RequestView, TenantResolver};
    ///
    /// let resolver = TenantResolver::parse("header.TENANT-ID, get.tenant").unwrap();
    /// assert_eq!(resolver.rules().len(), 2);
    ///
    /// let req = RequestView::new().header("Tenant-Id", "acme");
    /// assert_eq!(resolver.resolve(&req).as_deref(), Some("acme"));
    /// assert!(resolver.resolve(&RequestView::new()).is_none());
    ///
    /// assert!(TenantResolver::parse(" , ").is_err());
    /// assert!(TenantResolver::parse("body.tenant").is_err());
    /// ```
    pub fn parse(spec: &str) -> CoreResult<Self> {
        let rules = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<TenantRule>)
            .collect::<CoreResult<Vec<TenantRule>>>()?;
        if rules.is_empty() {
            return Err(CoreError::TenantResolver("no tenant resolvers configured".into()));
        }
        Ok(Self {
            rules,
            fallback: None,
        })
    }

    pub fn from_config(cfg: &TenantConfig) -> CoreResult<Self> {
        let resolver = Self::parse(&cfg.resolvers)?.with_fallback(cfg.fallback.clone());
        info!(
            rules = %resolver.rules.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            fallback = ?resolver.fallback,
            "tenant resolvers"
        );
        Ok(resolver)
    }

    pub fn with_fallback(mut self, fallback: Option<String>) -> Self {
        self.fallback = fallback.filter(|f| !f.is_empty());
        self
    }

    pub fn rules(&self) -> &[TenantRule] {
        &self.rules
    }

    pub fn resolve(&self, req: &RequestView) -> Option<String> {
        for rule in &self.rules {
            if let Some(tenant) = rule.resolve(req) {
                debug!(tenant = %tenant, rule = %rule, "tenant resolved");
                return Some(tenant);
            }
        }
        if let Some(fallback) = &self.fallback {
            debug!(tenant = %fallback, "no rule matched, using fallback tenant");
        }
        self.fallback.clone()
    }
}
