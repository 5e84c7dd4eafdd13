//! Capability policy.
//!
//! One ordered rule list, evaluated top to bottom; the first rule that
//! grants the capability wins, and a capability no rule grants is denied.
//!
//! | Rule | Anonymous | Authenticated | Admin |
//! |------|-----------|---------------|-------|
//! | `AnyCaller(caps)` | caps | caps | caps |
//! | `Authenticated(caps)` | - | caps | caps |
//! | `AdminAll` | - | - | everything |

use super::Session;
use crate::config::GateConfig;

/// Capability required by `POST /messages`.
pub const ACCESS_MESSAGES: &str = "access messages";

/// Capability required by `GET /stats`.
pub const ADMIN: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityRule {
    /// Granted to every caller, with or without a session.
    AnyCaller(Vec<String>),
    /// Granted to any authenticated session.
    Authenticated(Vec<String>),
    /// Admin sessions hold every capability.
    AdminAll,
}

impl CapabilityRule {
    fn grants(&self, session: Option<&Session>, capability: &str) -> bool {
        match self {
            Self::AnyCaller(caps) => caps.iter().any(|c| c == capability),
            Self::Authenticated(caps) => {
                session.is_some_and(|s| s.is_authenticated) && caps.iter().any(|c| c == capability)
            }
            Self::AdminAll => session.is_some_and(|s| s.is_authenticated && s.is_admin),
        }
    }
}

/// Why a capability check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub capability: String,
    /// Whether the caller had no session at all.
    pub anonymous: bool,
}

impl Denial {
    /// `Access Denied - You don't have permission to: <capability>`
    pub fn message(&self) -> String {
        format!(
            "Access Denied - You don't have permission to: {}",
            self.capability
        )
    }

    /// Short reason used in `{code, msg}` bodies.
    pub fn reason(&self) -> &'static str {
        if self.anonymous {
            "No Auth"
        } else {
            "No permission"
        }
    }
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Denial {}

/// Ordered capability rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityPolicy {
    rules: Vec<CapabilityRule>,
}

impl CapabilityPolicy {
    pub fn new(rules: Vec<CapabilityRule>) -> Self {
        Self { rules }
    }

    /// Config grants first, then the admin rule.
    pub fn from_config(config: &GateConfig) -> Self {
        let mut rules = Vec::with_capacity(3);
        if !config.anyone.is_empty() {
            rules.push(CapabilityRule::AnyCaller(config.anyone.clone()));
        }
        if !config.authenticated.is_empty() {
            rules.push(CapabilityRule::Authenticated(config.authenticated.clone()));
        }
        rules.push(CapabilityRule::AdminAll);
        Self::new(rules)
    }

    pub fn rules(&self) -> &[CapabilityRule] {
        &self.rules
    }

    /// Decide whether the caller holds `capability`.
    pub fn check(&self, session: Option<&Session>, capability: &str) -> Result<(), Denial> {
        if self.rules.iter().any(|rule| rule.grants(session, capability)) {
            return Ok(());
        }

        let anonymous = !session.is_some_and(|s| s.is_authenticated);
        tracing::debug!(
            capability,
            anonymous,
            username = ?session.and_then(|s| s.username.as_deref()),
            "Capability denied"
        );
        Err(Denial {
            capability: capability.to_owned(),
            anonymous,
        })
    }
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(is_admin: bool) -> Session {
        Session {
            is_authenticated: true,
            username: Some("alice".into()),
            is_admin,
            display_name: Some("Alice".into()),
            issued_at: 0,
            expires_at: u64::MAX,
        }
    }

    #[test]
    fn default_policy_allows_anyone_to_access_messages() {
        let policy = CapabilityPolicy::default();
        assert!(policy.check(None, ACCESS_MESSAGES).is_ok());
        assert!(policy.check(Some(&session(false)), ACCESS_MESSAGES).is_ok());
        assert!(policy.check(Some(&session(true)), ACCESS_MESSAGES).is_ok());
    }

    #[test]
    fn admin_holds_every_capability() {
        let policy = CapabilityPolicy::default();
        assert!(policy.check(Some(&session(true)), ADMIN).is_ok());
        assert!(policy.check(Some(&session(true)), "launch rockets").is_ok());
    }

    #[test]
    fn non_admin_is_denied_admin_with_capability_name() {
        let policy = CapabilityPolicy::default();
        let denial = policy.check(Some(&session(false)), ADMIN).unwrap_err();
        assert_eq!(denial.capability, "admin");
        assert!(!denial.anonymous);
        assert_eq!(denial.reason(), "No permission");
        assert_eq!(
            denial.message(),
            "Access Denied - You don't have permission to: admin"
        );
    }

    #[test]
    fn anonymous_is_denied_admin() {
        let denial = CapabilityPolicy::default().check(None, ADMIN).unwrap_err();
        assert!(denial.anonymous);
        assert_eq!(denial.reason(), "No Auth");
    }

    #[test]
    fn authenticated_rule_requires_session() {
        let policy = CapabilityPolicy::from_config(&GateConfig {
            anyone: Vec::new(),
            authenticated: vec![ACCESS_MESSAGES.into()],
        });
        assert!(policy.check(None, ACCESS_MESSAGES).is_err());
        assert!(policy.check(Some(&session(false)), ACCESS_MESSAGES).is_ok());
        assert!(policy.check(Some(&session(false)), ADMIN).is_err());
    }

    #[test]
    fn unauthenticated_admin_flag_grants_nothing() {
        let mut forged = session(true);
        forged.is_authenticated = false;
        let policy = CapabilityPolicy::new(vec![CapabilityRule::AdminAll]);
        let denial = policy.check(Some(&forged), ADMIN).unwrap_err();
        assert!(denial.anonymous);
    }

    #[test]
    fn from_config_orders_rules() {
        let policy = CapabilityPolicy::default();
        assert_eq!(
            policy.rules(),
            &[
                CapabilityRule::AnyCaller(vec![ACCESS_MESSAGES.into()]),
                CapabilityRule::AdminAll,
            ]
        );
    }
}
