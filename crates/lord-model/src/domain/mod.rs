mod vars;
pub use vars::Vars;

mod environment;
pub use environment::Environment;

/// Unique tenant identifier.
///
/// For directory sources this is the `<name>` part of `.env.<name>`,
/// for Vault the secret name under the configured prefix.
pub type TenantKey = String;

/// Numeric identifier of a worker inside one supervisor pool.
pub type WorkerId = u32;

/// Duration value in milliseconds, used across configuration structs.
pub type Millis = u64;

/// Variable injected into every multi-tenant environment.
pub const TENANT_ID_VAR: &str = "TENANT_ID";

/// Variable carrying the worker id into tenant processes.
pub const WORKER_ID_VAR: &str = "WORKER_ID";
