//! Path-based authorization rules.
//!
//! Rules are checked in order and the first match decides. Patterns support
//! literal segments, `{name}` (any single segment), `{name:[0-9]+}` (digits
//! only), and a trailing `**` matching the rest of the path including nothing.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::types::SecurityContext;
use crate::db::Role;

/// Where unauthenticated requests for protected paths are sent.
pub const LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
    Digits,
    Rest,
}

/// A parsed path pattern such as `/posts/{id:[0-9]+}` or `/api/**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "**" {
                    Segment::Rest
                } else if s.starts_with('{') && s.ends_with('}') {
                    match s[1..s.len() - 1].split_once(':') {
                        Some((_, "[0-9]+")) | Some((_, "\\d+")) => Segment::Digits,
                        _ => Segment::Any,
                    }
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut i = 0;
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                _ if i >= parts.len() => return false,
                Segment::Literal(lit) if lit != parts[i] => return false,
                Segment::Digits if !parts[i].bytes().all(|b| b.is_ascii_digit()) => return false,
                _ => {}
            }
            i += 1;
        }
        i == parts.len()
    }
}

/// What a matched request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    PermitAll,
    Authenticated,
    AnyRole(Vec<Role>),
}

#[derive(Debug, Clone)]
pub struct AccessRule {
    method: Option<Method>,
    patterns: Vec<PathPattern>,
    requirement: Requirement,
}

impl AccessRule {
    pub fn new(patterns: &[&str], requirement: Requirement) -> Self {
        Self {
            method: None,
            patterns: patterns.iter().map(|p| PathPattern::parse(p)).collect(),
            requirement,
        }
    }

    /// Restrict the rule to a single HTTP method.
    pub fn for_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// Outcome of checking a request against the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No identity on a protected path
    Unauthenticated,
    /// Identity present but lacking the required role
    Forbidden,
}

/// Ordered rule table with a fallback requirement.
#[derive(Debug, Clone)]
pub struct AccessRules {
    rules: Vec<AccessRule>,
    fallback: Requirement,
}

impl AccessRules {
    pub fn new(rules: Vec<AccessRule>, fallback: Requirement) -> Self {
        Self { rules, fallback }
    }

    /// The board application's rule table.
    pub fn board_defaults() -> Self {
        Self::new(
            vec![
                AccessRule::new(
                    &[
                        "/",
                        "/auth/**",
                        "/login",
                        "/login/**",
                        "/oauth2/**",
                        "/posts",
                        "/files/**",
                        "/css/**",
                        "/js/**",
                        "/images/**",
                    ],
                    Requirement::PermitAll,
                ),
                AccessRule::new(
                    &["/api/posts", "/api/posts/{postId}", "/api/posts/search"],
                    Requirement::PermitAll,
                )
                .for_method(Method::GET),
                AccessRule::new(&["/posts/{id:[0-9]+}"], Requirement::Authenticated),
                AccessRule::new(
                    &["/my-page"],
                    Requirement::AnyRole(vec![Role::User, Role::Admin]),
                ),
                AccessRule::new(&["/api/**"], Requirement::Authenticated),
                AccessRule::new(&["/admin", "/admin/**"], Requirement::AnyRole(vec![Role::Admin])),
            ],
            Requirement::Authenticated,
        )
    }

    pub fn requirement(&self, method: &Method, path: &str) -> &Requirement {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| &rule.requirement)
            .unwrap_or(&self.fallback)
    }

    pub fn decide(&self, method: &Method, path: &str, ctx: Option<&SecurityContext>) -> Decision {
        match (self.requirement(method, path), ctx) {
            (Requirement::PermitAll, _) => Decision::Allow,
            (_, None) => Decision::Unauthenticated,
            (Requirement::Authenticated, Some(_)) => Decision::Allow,
            (Requirement::AnyRole(roles), Some(ctx)) => {
                if ctx.has_any_role(roles) {
                    Decision::Allow
                } else {
                    Decision::Forbidden
                }
            }
        }
    }
}

/// Middleware enforcing [`AccessRules`] on the context attached by the
/// credential filter chain.
pub async fn authorize(
    State(rules): State<Arc<AccessRules>>,
    request: Request,
    next: Next,
) -> Response {
    let decision = rules.decide(
        request.method(),
        request.uri().path(),
        request.extensions().get::<SecurityContext>(),
    );

    match decision {
        Decision::Allow => next.run(request).await,
        Decision::Unauthenticated => Redirect::to(LOGIN_PATH).into_response(),
        Decision::Forbidden => StatusCode::FORBIDDEN.into_response(),
    }
}
