use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info};

use lord_model::VaultAuth;

use crate::{EnvError, EnvResult};

/// Leased tokens are renewed once less than this remains.
const RENEW_BEFORE: Duration = Duration::from_secs(600);

pub(crate) struct Lease {
    token: String,
    /// `None` for tokens without a lease.
    expires_at: Option<Instant>,
}

impl Lease {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at
            .is_none_or(|at| at.saturating_duration_since(now) > RENEW_BEFORE)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    jwt: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

/// Produces the `X-Vault-Token` value for each request.
pub(crate) enum TokenSource {
    Static(String),
    Kubernetes {
        role: String,
        endpoint: String,
        jwt_path: PathBuf,
        lease: Mutex<Option<Lease>>,
    },
}

impl TokenSource {
    pub(crate) fn from_config(auth: &VaultAuth) -> Self {
        match auth {
            VaultAuth::Token { token } => TokenSource::Static(token.clone()),
            VaultAuth::Kubernetes {
                role,
                endpoint,
                jwt_path,
            } => TokenSource::Kubernetes {
                role: role.clone(),
                endpoint: endpoint.trim_matches('/').to_string(),
                jwt_path: jwt_path.clone(),
                lease: Mutex::new(None),
            },
        }
    }

    pub(crate) async fn token(&self, http: &reqwest::Client, addr: &str) -> EnvResult<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Kubernetes {
                role,
                endpoint,
                jwt_path,
                lease,
            } => {
                let mut lease = lease.lock().await;
                if let Some(current) = lease.as_ref().filter(|l| l.is_fresh(Instant::now())) {
                    return Ok(current.token.clone());
                }
                let fresh = login(http, addr, endpoint, role, jwt_path).await?;
                let token = fresh.token.clone();
                *lease = Some(fresh);
                Ok(token)
            }
        }
    }
}

/// Exchange the service-account JWT for a Vault token.
async fn login(
    http: &reqwest::Client,
    addr: &str,
    endpoint: &str,
    role: &str,
    jwt_path: &Path,
) -> EnvResult<Lease> {
    let jwt = tokio::fs::read_to_string(jwt_path).await?;
    let url = format!("{addr}/v1/auth/{endpoint}/login");
    let login_err = |reason: String| EnvError::Backend {
        key: format!("auth/{endpoint}"),
        reason,
    };

    debug!(%url, %role, "logging in to vault");
    let resp = http
        .post(&url)
        .header("X-Vault-Request", "true")
        .json(&LoginRequest {
            jwt: jwt.trim(),
            role,
        })
        .send()
        .await
        .map_err(|e| login_err(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(login_err(format!("login returned {}", resp.status())));
    }
    let body: LoginResponse = resp.json().await.map_err(|e| login_err(e.to_string()))?;

    info!(lease_secs = body.auth.lease_duration, "vault token obtained");
    Ok(Lease {
        token: body.auth.client_token,
        expires_at: (body.auth.lease_duration > 0)
            .then(|| Instant::now() + Duration::from_secs(body.auth.lease_duration)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_renewal_window() {
        let now = Instant::now();
        let lease = |secs: u64| Lease {
            token: "t".into(),
            expires_at: Some(now + Duration::from_secs(secs)),
        };

        assert!(lease(3600).is_fresh(now));
        assert!(!lease(599).is_fresh(now));
        assert!(!lease(0).is_fresh(now));
        assert!(
            Lease {
                token: "t".into(),
                expires_at: None
            }
            .is_fresh(now)
        );
    }
}
