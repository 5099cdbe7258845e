use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Principal, RoleName, RoleNameError};

/// Outcome of an authorization check.
///
/// `Unauthenticated` and `Forbidden` are ordinary outcomes, not errors: the
/// caller maps them to its own transport (e.g. 401 vs 403).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Unauthenticated,
    Forbidden,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid resource pattern '{0}': {1}")]
    InvalidPattern(String, &'static str),

    #[error("invalid role in policy for '{pattern}': {source}")]
    InvalidRole {
        pattern: String,
        #[source]
        source: RoleNameError,
    },

    #[error("policy rule for '{0}' lists roles and is also marked authenticated-only")]
    ConflictingRequirement(String),
}

/// Which resources a policy entry applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePattern {
    /// The resource must equal the pattern exactly (`/admin`).
    Exact(String),
    /// `/admin/**`: the base path itself and everything below it.
    Prefix(String),
    /// `/**` or `*`: every resource.
    Any,
}

impl ResourcePattern {
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        if raw == "*" || raw == "/**" {
            return Ok(Self::Any);
        }
        if !raw.starts_with('/') {
            return Err(PolicyError::InvalidPattern(raw.to_string(), "must start with '/'"));
        }
        if let Some(base) = raw.strip_suffix("/**") {
            if base.contains('*') {
                return Err(PolicyError::InvalidPattern(
                    raw.to_string(),
                    "wildcards are only supported as a trailing '/**'",
                ));
            }
            return Ok(Self::Prefix(base.to_string()));
        }
        if raw.contains('*') {
            return Err(PolicyError::InvalidPattern(
                raw.to_string(),
                "wildcards are only supported as a trailing '/**'",
            ));
        }
        Ok(Self::Exact(raw.to_string()))
    }

    pub fn matches(&self, resource: &str) -> bool {
        match self {
            Self::Exact(path) => resource == path,
            Self::Prefix(base) => {
                resource == base
                    || resource
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Any => true,
        }
    }
}

impl core::fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exact(path) => f.write_str(path),
            Self::Prefix(base) => write!(f, "{base}/**"),
            Self::Any => f.write_str("/**"),
        }
    }
}

/// What a caller must present to access a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Public resource (empty required role set).
    PermitAll,
    /// Any authenticated principal, whatever its roles.
    Authenticated,
    /// Principal must hold at least one of these roles (ANY-of).
    AnyRole(BTreeSet<RoleName>),
}

impl Requirement {
    /// Role set constructor; an empty set means public.
    pub fn any_role(roles: impl IntoIterator<Item = RoleName>) -> Self {
        let roles: BTreeSet<RoleName> = roles.into_iter().collect();
        if roles.is_empty() {
            Self::PermitAll
        } else {
            Self::AnyRole(roles)
        }
    }

    fn evaluate(&self, principal: Option<&Principal>) -> Verdict {
        match (self, principal) {
            (Self::PermitAll, _) => Verdict::Allow,
            (_, None) => Verdict::Unauthenticated,
            (Self::Authenticated, Some(_)) => Verdict::Allow,
            (Self::AnyRole(required), Some(p)) => {
                if p.has_any_role(required) {
                    Verdict::Allow
                } else {
                    Verdict::Forbidden
                }
            }
        }
    }

    fn required_roles(&self) -> Vec<String> {
        match self {
            Self::AnyRole(roles) => roles.iter().map(|r| r.as_str().to_string()).collect(),
            Self::PermitAll | Self::Authenticated => Vec::new(),
        }
    }
}

/// Declarative form of one policy entry, as found in configuration.
///
/// ```json
/// { "pattern": "/user", "roles": ["ROLE_USER", "ROLE_ADMIN"] }
/// { "pattern": "/me", "authenticated": true }
/// { "pattern": "/" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub pattern: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub authenticated: bool,
}

impl PolicyRule {
    pub fn permit_all(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            roles: Vec::new(),
            authenticated: false,
        }
    }

    pub fn authenticated(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            roles: Vec::new(),
            authenticated: true,
        }
    }

    pub fn any_role<I, S>(pattern: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            authenticated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PolicyEntry {
    pattern: ResourcePattern,
    requirement: Requirement,
}

/// Ordered, immutable resource policy.
///
/// Entries are evaluated first-match-wins in declaration order. A resource no
/// entry matches requires an authenticated principal with any roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    entries: Vec<PolicyEntry>,
}

impl PolicyTable {
    /// Build a table from declarative rules.
    ///
    /// Every role name is validated here: a table referencing `ADMIN` instead
    /// of `ROLE_ADMIN` is rejected rather than silently never matching.
    pub fn from_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Result<Self, PolicyError> {
        let mut entries = Vec::new();
        for rule in rules {
            let pattern = ResourcePattern::parse(&rule.pattern)?;
            if rule.authenticated && !rule.roles.is_empty() {
                return Err(PolicyError::ConflictingRequirement(rule.pattern));
            }

            let requirement = if rule.authenticated {
                Requirement::Authenticated
            } else {
                let roles = rule
                    .roles
                    .into_iter()
                    .map(RoleName::parse)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| PolicyError::InvalidRole {
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                Requirement::any_role(roles)
            };

            entries.push(PolicyEntry { pattern, requirement });
        }
        Ok(Self { entries })
    }

    /// The site policy: `/` public, `/user` for users and admins, `/admin`
    /// for admins only, everything else for any authenticated user.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                PolicyEntry {
                    pattern: ResourcePattern::Exact("/".to_string()),
                    requirement: Requirement::PermitAll,
                },
                PolicyEntry {
                    pattern: ResourcePattern::Exact("/user".to_string()),
                    requirement: Requirement::any_role([RoleName::user(), RoleName::admin()]),
                },
                PolicyEntry {
                    pattern: ResourcePattern::Exact("/admin".to_string()),
                    requirement: Requirement::any_role([RoleName::admin()]),
                },
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, resource: &str) -> (Option<&ResourcePattern>, &Requirement) {
        static FALLBACK: Requirement = Requirement::Authenticated;

        self.entries
            .iter()
            .find(|e| e.pattern.matches(resource))
            .map(|e| (Some(&e.pattern), &e.requirement))
            .unwrap_or((None, &FALLBACK))
    }

    /// Decide access to `resource`.
    ///
    /// - No IO
    /// - No panics
    /// - Pure function of (principal, resource, table)
    #[must_use]
    pub fn decide(&self, principal: Option<&Principal>, resource: &str) -> Verdict {
        let (_, requirement) = self.lookup(resource);
        requirement.evaluate(principal)
    }

    /// Explain why [`PolicyTable::decide`] returns what it does.
    pub fn explain(&self, principal: Option<&Principal>, resource: &str) -> DecisionExplanation {
        let (pattern, requirement) = self.lookup(resource);
        let verdict = requirement.evaluate(principal);

        let reason = match (requirement, verdict) {
            (Requirement::PermitAll, _) => "resource is public".to_string(),
            (_, Verdict::Unauthenticated) => "resource requires an authenticated principal".to_string(),
            (Requirement::Authenticated, _) => "any authenticated principal may access the resource".to_string(),
            (Requirement::AnyRole(_), Verdict::Allow) => "principal holds one of the required roles".to_string(),
            (Requirement::AnyRole(required), _) => format!(
                "principal holds none of the required roles: {}",
                required.iter().map(RoleName::as_str).collect::<Vec<_>>().join(", ")
            ),
        };

        DecisionExplanation {
            resource: resource.to_string(),
            matched_pattern: pattern.map(ToString::to_string),
            required_roles: requirement.required_roles(),
            principal: principal.map(|p| p.username().to_string()),
            principal_roles: principal
                .map(|p| p.roles().iter().map(|r| r.as_str().to_string()).collect())
                .unwrap_or_default(),
            verdict,
            reason,
        }
    }
}

/// Auditable record of one authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionExplanation {
    pub resource: String,

    /// Pattern of the entry that matched; `None` when the fallback applied.
    pub matched_pattern: Option<String>,

    pub required_roles: Vec<String>,
    pub principal: Option<String>,
    pub principal_roles: Vec<String>,
    pub verdict: Verdict,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Username;
    use proptest::prelude::*;

    fn principal(name: &str, roles: &[RoleName]) -> Principal {
        Principal::new(Username::parse(name).unwrap(), roles.iter().cloned())
    }

    fn user() -> Principal {
        principal("user", &[RoleName::user()])
    }

    fn admin() -> Principal {
        principal("admin", &[RoleName::user(), RoleName::admin()])
    }

    fn configured_table() -> PolicyTable {
        PolicyTable::from_rules([
            PolicyRule::permit_all("/"),
            PolicyRule::any_role("/user", ["ROLE_USER", "ROLE_ADMIN"]),
            PolicyRule::any_role("/admin", ["ROLE_ADMIN"]),
        ])
        .unwrap()
    }

    #[test]
    fn reference_decision_table() {
        let user = user();
        let admin = admin();

        let cases: [(Option<&Principal>, &str, Verdict); 6] = [
            (None, "/", Verdict::Allow),
            (None, "/user", Verdict::Unauthenticated),
            (Some(&user), "/user", Verdict::Allow),
            (Some(&user), "/admin", Verdict::Forbidden),
            (Some(&admin), "/admin", Verdict::Allow),
            (Some(&admin), "/user", Verdict::Allow),
        ];

        for table in [configured_table(), PolicyTable::standard()] {
            for (who, resource, expected) in &cases {
                assert_eq!(
                    table.decide(*who, resource),
                    *expected,
                    "principal={:?} resource={resource}",
                    who.map(|p| p.username().as_str())
                );
            }
        }
    }

    #[test]
    fn configured_and_standard_tables_agree() {
        assert_eq!(configured_table(), PolicyTable::standard());
    }

    #[test]
    fn unmatched_resource_requires_authentication_only() {
        let table = PolicyTable::standard();
        let nobody = principal("nobody", &[]);

        assert_eq!(table.decide(None, "/reports"), Verdict::Unauthenticated);
        assert_eq!(table.decide(Some(&nobody), "/reports"), Verdict::Allow);
    }

    #[test]
    fn first_match_wins() {
        let table = PolicyTable::from_rules([
            PolicyRule::any_role("/admin/**", ["ROLE_ADMIN"]),
            PolicyRule::permit_all("/admin/health"),
        ])
        .unwrap();

        assert_eq!(table.decide(None, "/admin/health"), Verdict::Unauthenticated);
        assert_eq!(table.decide(Some(&user()), "/admin/health"), Verdict::Forbidden);
    }

    #[test]
    fn prefix_patterns_cover_base_and_children_only() {
        let pattern = ResourcePattern::parse("/admin/**").unwrap();
        assert!(pattern.matches("/admin"));
        assert!(pattern.matches("/admin/users"));
        assert!(pattern.matches("/admin/users/42"));
        assert!(!pattern.matches("/administrator"));
        assert!(!pattern.matches("/"));
    }

    #[test]
    fn exact_patterns_do_not_match_children() {
        let pattern = ResourcePattern::parse("/user").unwrap();
        assert!(pattern.matches("/user"));
        assert!(!pattern.matches("/user/"));
        assert!(!pattern.matches("/users"));
    }

    #[test]
    fn catch_all_rule_overrides_fallback() {
        let table = PolicyTable::from_rules([PolicyRule::permit_all("/**")]).unwrap();
        assert_eq!(table.decide(None, "/anything/at/all"), Verdict::Allow);
    }

    #[test]
    fn authenticated_rule_ignores_roles() {
        let table = PolicyTable::from_rules([PolicyRule::authenticated("/me")]).unwrap();
        assert_eq!(table.decide(None, "/me"), Verdict::Unauthenticated);
        assert_eq!(table.decide(Some(&principal("x", &[])), "/me"), Verdict::Allow);
    }

    #[test]
    fn empty_role_list_means_public() {
        let table = PolicyTable::from_rules([PolicyRule::any_role("/open", Vec::<String>::new())]).unwrap();
        assert_eq!(table.decide(None, "/open"), Verdict::Allow);
    }

    #[test]
    fn unprefixed_policy_role_is_a_configuration_error() {
        let err = PolicyTable::from_rules([PolicyRule::any_role("/admin", ["ADMIN"])]).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidRole { ref pattern, source: RoleNameError::MissingPrefix(_) } if pattern == "/admin"
        ));
    }

    #[test]
    fn no_role_hierarchy_is_assumed() {
        let table = PolicyTable::from_rules([PolicyRule::any_role("/user", ["ROLE_USER"])]).unwrap();
        let admin_only = principal("root", &[RoleName::admin()]);
        assert_eq!(table.decide(Some(&admin_only), "/user"), Verdict::Forbidden);
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for raw in ["admin", "/ad*min", "/*/x/**", ""] {
            assert!(ResourcePattern::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn conflicting_rule_is_rejected() {
        let rule = PolicyRule {
            pattern: "/x".to_string(),
            roles: vec!["ROLE_USER".to_string()],
            authenticated: true,
        };
        assert_eq!(
            PolicyTable::from_rules([rule]),
            Err(PolicyError::ConflictingRequirement("/x".to_string()))
        );
    }

    #[test]
    fn rules_deserialize_from_json() {
        let rules: Vec<PolicyRule> = serde_json::from_str(
            r#"[
                { "pattern": "/" },
                { "pattern": "/user", "roles": ["ROLE_USER", "ROLE_ADMIN"] },
                { "pattern": "/admin", "roles": ["ROLE_ADMIN"] }
            ]"#,
        )
        .unwrap();

        assert_eq!(PolicyTable::from_rules(rules).unwrap(), PolicyTable::standard());
    }

    #[test]
    fn explanation_reports_the_matched_entry() {
        let table = PolicyTable::standard();
        let explanation = table.explain(Some(&user()), "/admin");

        assert_eq!(explanation.verdict, Verdict::Forbidden);
        assert_eq!(explanation.matched_pattern.as_deref(), Some("/admin"));
        assert_eq!(explanation.required_roles, vec!["ROLE_ADMIN".to_string()]);
        assert_eq!(explanation.principal.as_deref(), Some("user"));
        assert!(explanation.reason.contains("ROLE_ADMIN"));
    }

    #[test]
    fn explanation_marks_fallback() {
        let explanation = PolicyTable::standard().explain(None, "/elsewhere");
        assert_eq!(explanation.matched_pattern, None);
        assert_eq!(explanation.verdict, Verdict::Unauthenticated);

        let json = serde_json::to_value(&explanation).unwrap();
        assert_eq!(json["verdict"], "unauthenticated");
    }

    fn arb_roles() -> impl Strategy<Value = Vec<RoleName>> {
        prop::collection::vec(
            prop_oneof![
                Just(RoleName::user()),
                Just(RoleName::admin()),
                "[A-Z]{1,8}".prop_map(|s| RoleName::parse(format!("ROLE_{s}")).unwrap()),
            ],
            0..4,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: an anonymous caller is only ever allowed onto public resources.
        #[test]
        fn anonymous_access_only_to_public(resource in "/[a-z]{0,8}(/[a-z]{1,8}){0,2}") {
            let table = PolicyTable::standard();
            let verdict = table.decide(None, &resource);
            if resource == "/" {
                prop_assert_eq!(verdict, Verdict::Allow);
            } else {
                prop_assert_eq!(verdict, Verdict::Unauthenticated);
            }
        }

        /// Property: authenticated callers are never told to authenticate.
        #[test]
        fn principal_never_unauthenticated(
            roles in arb_roles(),
            resource in "/[a-z]{0,8}(/[a-z]{1,8}){0,2}",
        ) {
            let p = principal("someone", &roles);
            prop_assert_ne!(PolicyTable::standard().decide(Some(&p), &resource), Verdict::Unauthenticated);
        }

        /// Property: `/admin` is allowed exactly when ROLE_ADMIN is held.
        #[test]
        fn admin_resource_tracks_admin_role(roles in arb_roles()) {
            let p = principal("someone", &roles);
            let expected = if roles.contains(&RoleName::admin()) {
                Verdict::Allow
            } else {
                Verdict::Forbidden
            };
            prop_assert_eq!(PolicyTable::standard().decide(Some(&p), "/admin"), expected);
        }

        /// Property: explain() always agrees with decide().
        #[test]
        fn explanation_agrees_with_decision(
            roles in arb_roles(),
            anonymous in any::<bool>(),
            resource in "/[a-z]{0,8}",
        ) {
            let p = principal("someone", &roles);
            let who = if anonymous { None } else { Some(&p) };
            let table = PolicyTable::standard();
            prop_assert_eq!(table.explain(who, &resource).verdict, table.decide(who, &resource));
        }
    }
}
