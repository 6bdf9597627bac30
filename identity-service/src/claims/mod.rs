//! Claim mapping for verified provider tokens.
//!
//! [`ClaimMapper::map`] turns the claims of an already verified access token
//! into an [`AuthorizationContext`]: the principal name plus the set of
//! authorities used for access checks on a single request.
//!
//! Claims are untyped JSON. Every nesting level is inspected through
//! [`ClaimShape`], so a missing or oddly shaped claim degrades to "no roles"
//! instead of failing the request.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::config::ClaimsConfig;

/// Claim holding per-client role assignments.
pub const RESOURCE_ACCESS_CLAIM: &str = "resource_access";

/// Key of the role list inside a `resource_access` entry.
pub const ROLES_KEY: &str = "roles";

/// Verified token payload plus the authorities the verifier derived itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims {
    claims: Map<String, Value>,
    default_authorities: BTreeSet<String>,
}

impl TokenClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self {
            claims,
            default_authorities: BTreeSet::new(),
        }
    }

    /// Attach authorities computed by the verification layer (e.g. scopes).
    #[must_use]
    pub fn with_default_authorities<I>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.default_authorities.extend(authorities);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn default_authorities(&self) -> &BTreeSet<String> {
        &self.default_authorities
    }
}

impl From<Map<String, Value>> for TokenClaims {
    fn from(claims: Map<String, Value>) -> Self {
        Self::new(claims)
    }
}

/// Shape of a single claim value, with absence as its own case.
#[derive(Debug, Clone, Copy)]
pub enum ClaimShape<'a> {
    Absent,
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Text(&'a str),
    Other,
}

impl<'a> ClaimShape<'a> {
    pub fn of(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => ClaimShape::Absent,
            Some(Value::Object(map)) => ClaimShape::Object(map),
            Some(Value::Array(items)) => ClaimShape::Array(items.as_slice()),
            Some(Value::String(text)) => ClaimShape::Text(text.as_str()),
            Some(_) => ClaimShape::Other,
        }
    }
}

/// Authorities derived from the `scope` (space separated) or `scp` claim.
pub fn scope_authorities(claims: &Map<String, Value>, prefix: &str) -> BTreeSet<String> {
    let scopes: Vec<&str> = ["scope", "scp"]
        .iter()
        .map(|name| ClaimShape::of(claims.get(*name)))
        .find_map(|shape| match shape {
            ClaimShape::Text(text) => Some(text.split_whitespace().collect()),
            ClaimShape::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
            _ => None,
        })
        .unwrap_or_default();

    scopes
        .into_iter()
        .filter(|scope| !scope.is_empty())
        .map(|scope| format!("{}{}", prefix, scope))
        .collect()
}

/// Resolved identity for one authenticated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    principal: String,
    authorities: BTreeSet<String>,
    role_prefix: String,
}

impl AuthorizationContext {
    pub fn new(principal: String, authorities: BTreeSet<String>, role_prefix: String) -> Self {
        Self {
            principal,
            authorities,
            role_prefix,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }

    /// An empty principal means the configured claim was missing.
    pub fn is_valid(&self) -> bool {
        !self.principal.is_empty()
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// Role check by bare name, e.g. `has_role("admin")`.
    pub fn has_role(&self, role: &str) -> bool {
        self.authorities
            .contains(&format!("{}{}", self.role_prefix, role))
    }
}

/// Maps verified claims to an [`AuthorizationContext`]. Pure and total.
#[derive(Debug, Clone)]
pub struct ClaimMapper {
    principal_attribute: String,
    resource_id: String,
    role_prefix: String,
}

impl ClaimMapper {
    pub fn new(config: &ClaimsConfig) -> Self {
        Self {
            principal_attribute: config.principal_attribute.clone(),
            resource_id: config.resource_id.clone(),
            role_prefix: config.role_prefix.clone(),
        }
    }

    pub fn map(&self, claims: &TokenClaims) -> AuthorizationContext {
        let principal = match ClaimShape::of(claims.get(&self.principal_attribute)) {
            ClaimShape::Text(name) => name.to_string(),
            _ => String::new(),
        };

        let mut authorities = self.resource_roles(claims);
        authorities.extend(claims.default_authorities().iter().cloned());

        AuthorizationContext::new(principal, authorities, self.role_prefix.clone())
    }

    fn resource_roles(&self, claims: &TokenClaims) -> BTreeSet<String> {
        let resources = match ClaimShape::of(claims.get(RESOURCE_ACCESS_CLAIM)) {
            ClaimShape::Object(resources) => resources,
            ClaimShape::Absent => return BTreeSet::new(),
            _ => {
                tracing::debug!("resource_access claim is not an object, ignoring");
                return BTreeSet::new();
            }
        };

        let resource = match ClaimShape::of(resources.get(&self.resource_id)) {
            ClaimShape::Object(resource) => resource,
            _ => return BTreeSet::new(),
        };

        let roles = match ClaimShape::of(resource.get(ROLES_KEY)) {
            ClaimShape::Array(roles) => roles,
            _ => return BTreeSet::new(),
        };

        roles
            .iter()
            .filter_map(|role| match role.as_str() {
                Some(role) => Some(format!("{}{}", self.role_prefix, role)),
                None => {
                    tracing::warn!(
                        resource_id = %self.resource_id,
                        "Skipping non-string role entry in verified claims"
                    );
                    None
                }
            })
            .collect()
    }
}
