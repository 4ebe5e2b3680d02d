//! Run context
//!
//! One export or import run carries an explicit `Context` value: the acting
//! operator's identity, whether they hold elevated permission, their locale,
//! and the access policy consulted (never enforced) by the engines. The
//! context is threaded as a constructor parameter; there are no process-wide
//! current-user or current-language singletons.

use std::fmt;
use std::sync::Arc;

/// Permission / scope predicate consulted by the engines
///
/// The engines trust the booleans and report/skip accordingly; enforcement
/// lives with the collaborator that implements this.
pub trait AccessPolicy {
    /// True if the page is inside the caller's permitted mount scope
    fn is_within_scope(&self, page_uid: i64) -> bool;

    /// True if the caller may touch records of the table at all
    fn can_access_table(&self, table: &str) -> bool;
}

/// Policy that permits everything (tests, trusted CLI runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn is_within_scope(&self, _page_uid: i64) -> bool {
        true
    }

    fn can_access_table(&self, _table: &str) -> bool {
        true
    }
}

/// Explicit per-run context
#[derive(Clone)]
pub struct Context {
    /// Acting operator identity (recorded into archive metadata)
    pub actor: String,
    /// Elevated permission: required for force-original-identifier imports
    /// and admin-only tables
    pub elevated: bool,
    /// Operator locale (display only)
    pub locale: String,
    policy: Arc<dyn AccessPolicy + Send + Sync>,
}

impl Context {
    /// Create a context with the given policy
    pub fn new(
        actor: impl Into<String>,
        elevated: bool,
        policy: Arc<dyn AccessPolicy + Send + Sync>,
    ) -> Self {
        Self {
            actor: actor.into(),
            elevated,
            locale: "en".to_string(),
            policy,
        }
    }

    /// Elevated context that permits everything
    pub fn elevated(actor: impl Into<String>) -> Self {
        Self::new(actor, true, Arc::new(AllowAll))
    }

    /// Non-elevated context that permits everything
    pub fn operator(actor: impl Into<String>) -> Self {
        Self::new(actor, false, Arc::new(AllowAll))
    }

    /// Builder: set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Consult the policy for page scope
    pub fn is_within_scope(&self, page_uid: i64) -> bool {
        self.policy.is_within_scope(page_uid)
    }

    /// Consult the policy for table access
    pub fn can_access_table(&self, table: &str) -> bool {
        self.policy.can_access_table(table)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("actor", &self.actor)
            .field("elevated", &self.elevated)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}
