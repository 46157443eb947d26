use std::fmt;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{ModelError, ModelResult, TENANT_ID_VAR, TenantKey, Vars};

/// Resolved configuration bundle of one tenant.
///
/// Identity is `(key, version, created_at)`: two environments with the same
/// identity are considered equal even if their variables differ. Resolvers
/// rely on this to classify a reloaded secret as unchanged or updated
/// without comparing payloads.
#[derive(Debug, Clone)]
pub struct Environment {
    key: TenantKey,
    vars: Vars,
    version: u64,
    created_at: OffsetDateTime,
    id: usize,
}

impl Environment {
    pub fn new(key: impl Into<TenantKey>, vars: Vars, version: u64, created_at: OffsetDateTime) -> Self {
        Self {
            key: key.into(),
            vars,
            version,
            created_at,
            id: 0,
        }
    }

    /// Environment with no variables, version 0 and `created_at = now`.
    pub fn empty(key: impl Into<TenantKey>) -> Self {
        Self::new(key, Vars::new(), 0, OffsetDateTime::now_utc())
    }

    /// Set the ordinal id (position in the backend listing).
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Inject `TENANT_ID=<key>` into the variables.
    pub fn with_tenant_id(mut self) -> Self {
        self.vars.set(TENANT_ID_VAR, self.key.clone());
        self
    }

    /// Overlay the variables on `common`, then drop `exclude` keys.
    pub fn filtered(mut self, common: &Vars, exclude: &[String]) -> Self {
        self.vars = common.merged(&self.vars).without(exclude);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether `other` describes a different revision of the tenant.
    pub fn is_diff(&self, other: &Environment) -> bool {
        self != other
    }

    /// Parse an RFC3339 timestamp as produced by secret backends.
    pub fn parse_created_at(value: &str) -> ModelResult<OffsetDateTime> {
        OffsetDateTime::parse(value, &Rfc3339).map_err(|e| ModelError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.version == other.version
            && self.created_at == other.created_at
    }
}

impl Eq for Environment {}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self
            .created_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "<invalid-time>".to_string());
        write!(
            f,
            "Environment(key='{}', version={}, created_at={}, vars={})",
            self.key,
            self.version,
            ts,
            self.vars.len()
        )
    }
}
