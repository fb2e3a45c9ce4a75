//! Per-request serving decision.
//!
//! # Responsibilities
//! - Classify a request into exactly one [`Dispatch`]
//! - Keep precedence explicit: each rule is tried in [`RULES`] order and the
//!   first one that claims the request wins
//!
//! # Design Decisions
//! - Pure function of (method, If-None-Match, manifest entry, cache enabled)
//! - The chain is total: the last two rules cover every request without an
//!   entry, the first two every request with one

use axum::http::{HeaderValue, Method};

use crate::manifest::ManifestEntry;

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<'m> {
    /// Manifest hit whose ETag matches `If-None-Match`: 304, no body.
    NotModified(&'m ManifestEntry),
    /// Manifest hit: 200 with the file and its manifest headers.
    Static(&'m ManifestEntry),
    /// No asset; hand the request to the renderer untouched.
    Render,
    /// No asset; hand the request to the regenerate-on-demand cache.
    Regenerate,
}

impl Dispatch<'_> {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Dispatch::NotModified(_) => "not_modified",
            Dispatch::Static(_) => "static",
            Dispatch::Render => "render",
            Dispatch::Regenerate => "regenerate",
        }
    }
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'r, 'm> {
    pub method: &'r Method,
    pub if_none_match: Option<&'r HeaderValue>,
    pub entry: Option<&'m ManifestEntry>,
    pub isr_enabled: bool,
}

/// One link of the precedence chain.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Claim the request, or pass it on with `None`.
    fn apply<'m>(&self, ctx: &DispatchContext<'_, 'm>) -> Option<Dispatch<'m>>;
}

/// `If-None-Match` equal to the stored ETag, byte for byte.
#[derive(Debug)]
pub struct ConditionalHit;

impl Rule for ConditionalHit {
    fn name(&self) -> &'static str {
        "conditional_hit"
    }

    fn apply<'m>(&self, ctx: &DispatchContext<'_, 'm>) -> Option<Dispatch<'m>> {
        let entry = ctx.entry?;
        let etag = entry.etag()?;
        let candidate = ctx.if_none_match?;
        (candidate.as_bytes() == etag.as_bytes()).then_some(Dispatch::NotModified(entry))
    }
}

/// Any manifest hit.
#[derive(Debug)]
pub struct StaticHit;

impl Rule for StaticHit {
    fn name(&self) -> &'static str {
        "static_hit"
    }

    fn apply<'m>(&self, ctx: &DispatchContext<'_, 'm>) -> Option<Dispatch<'m>> {
        ctx.entry.map(Dispatch::Static)
    }
}

/// Miss with the cache disabled, or a method the cache must not see.
#[derive(Debug)]
pub struct RenderFallback;

impl Rule for RenderFallback {
    fn name(&self) -> &'static str {
        "render_fallback"
    }

    fn apply<'m>(&self, ctx: &DispatchContext<'_, 'm>) -> Option<Dispatch<'m>> {
        if ctx.entry.is_some() {
            return None;
        }
        (!ctx.isr_enabled || *ctx.method != Method::GET).then_some(Dispatch::Render)
    }
}

/// Miss on a GET with the cache enabled.
#[derive(Debug)]
pub struct RegenerateFallback;

impl Rule for RegenerateFallback {
    fn name(&self) -> &'static str {
        "regenerate_fallback"
    }

    fn apply<'m>(&self, ctx: &DispatchContext<'_, 'm>) -> Option<Dispatch<'m>> {
        if ctx.entry.is_some() {
            return None;
        }
        (ctx.isr_enabled && *ctx.method == Method::GET).then_some(Dispatch::Regenerate)
    }
}

/// Precedence order. Do not reorder.
pub static RULES: [&dyn Rule; 4] = [
    &ConditionalHit,
    &StaticHit,
    &RenderFallback,
    &RegenerateFallback,
];

/// Run the chain.
pub fn classify<'m>(ctx: &DispatchContext<'_, 'm>) -> Dispatch<'m> {
    RULES
        .iter()
        .find_map(|rule| rule.apply(ctx))
        // Unreachable while the chain is total; rendering is the safe answer.
        .unwrap_or(Dispatch::Render)
}
