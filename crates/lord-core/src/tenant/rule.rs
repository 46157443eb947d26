use std::{fmt, str::FromStr};

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use serde_json::Value;
use tracing::debug;

use crate::{CoreError, tenant::{RequestView, path::find_by_path}};

const DEFAULT_JWT_KEY: &str = "Authorization";
const DEFAULT_OIDC_HEADER: &str = "x-userinfo";

/// Part of the request a rule reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    Header,
    Cookie,
    Get,
    Post,
}

impl RequestSource {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "header" => Some(RequestSource::Header),
            "cookie" => Some(RequestSource::Cookie),
            "get" => Some(RequestSource::Get),
            "post" => Some(RequestSource::Post),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSource::Header => "header",
            RequestSource::Cookie => "cookie",
            RequestSource::Get => "get",
            RequestSource::Post => "post",
        }
    }
}

/// One `source.path` entry of the tenant resolver list.
///
/// - `header.TENANT-ID`, `cookie.tenant`, `get.tenant`, `post.org.id`
/// - `jwt[.<source>.<key>].<claim path>`: token defaults to `header.Authorization`
/// - `oidc[.<header>].<path>`: base64 JSON header, defaults to `x-userinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantRule {
    Direct {
        source: RequestSource,
        path: Vec<String>,
    },
    Jwt {
        source: RequestSource,
        key: String,
        claim: Vec<String>,
    },
    Oidc {
        header: String,
        path: Vec<String>,
    },
}

impl TenantRule {
    pub fn resolve(&self, req: &RequestView) -> Option<String> {
        match self {
            TenantRule::Direct { source, path } => find_by_path(req.source(*source), path),
            TenantRule::Jwt { source, key, claim } => {
                let token = find_by_path(req.source(*source), &[key])?;
                let Some(payload) = jwt_payload(&token) else {
                    debug!(rule = %self, "failed to parse jwt token");
                    return None;
                };
                find_by_path(&payload, claim)
            }
            TenantRule::Oidc { header, path } => {
                let blob = find_by_path(req.source(RequestSource::Header), &[header])?;
                let Some(info) = userinfo(&blob) else {
                    debug!(rule = %self, "failed to parse userinfo header");
                    return None;
                };
                find_by_path(&info, path)
            }
        }
    }
}

fn json_document(bytes: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// Claims of a JWT. The signature is not checked.
fn jwt_payload(token: &str) -> Option<Value> {
    let segment = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim().trim_end_matches('='))
        .ok()?;
    json_document(&bytes)
}

fn userinfo(blob: &str) -> Option<Value> {
    let trimmed = blob.trim().trim_end_matches('=');
    let bytes = STANDARD_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
        .ok()?;
    json_document(&bytes)
}

impl FromStr for TenantRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').map(str::trim).collect();
        let owned = |from: usize| -> Vec<String> {
            parts.iter().skip(from).map(|p| p.to_string()).collect()
        };
        let invalid = |reason: &str| CoreError::TenantResolver(format!("{s}: {reason}"));

        match parts[0] {
            "jwt" => {
                let source = match parts.get(1) {
                    None => RequestSource::Header,
                    Some(p) => RequestSource::parse(p)
                        .ok_or_else(|| invalid("token source must be header, cookie, get or post"))?,
                };
                let key = parts
                    .get(2)
                    .filter(|k| !k.is_empty())
                    .map_or(DEFAULT_JWT_KEY, |k| *k)
                    .to_string();
                Ok(TenantRule::Jwt {
                    source,
                    key,
                    claim: owned(3),
                })
            }
            "oidc" => {
                let header = parts
                    .get(1)
                    .filter(|h| !h.is_empty())
                    .map_or(DEFAULT_OIDC_HEADER, |h| *h)
                    .to_string();
                Ok(TenantRule::Oidc {
                    header,
                    path: owned(2),
                })
            }
            other => {
                let source = RequestSource::parse(other)
                    .ok_or_else(|| invalid(&format!("resolver '{other}' is not supported")))?;
                let path = owned(1);
                if path.iter().all(|p| p.is_empty()) {
                    return Err(invalid("missing key"));
                }
                Ok(TenantRule::Direct { source, path })
            }
        }
    }
}

impl fmt::Display for TenantRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantRule::Direct { source, path } => write!(f, "{}.{}", source.as_str(), path.join(".")),
            TenantRule::Jwt { source, key, claim } => {
                write!(f, "jwt.{}.{key}.{}", source.as_str(), claim.join("."))
            }
            TenantRule::Oidc { header, path } => write!(f, "oidc.{header}.{}", path.join(".")),
        }
    }
}
