//! Path rule, header policy and rewrite-exemption configuration.

use super::ordered::OrderedMap;
use serde::{Deserialize, Serialize};

/// Header drop/inject lists, used globally and per path rule.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HeaderConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<String>,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub inject: OrderedMap<String>,
}

/// A path exempted from rewriting.
///
/// With `rewriteTarget: true` the target host is still swapped in but the path is kept as-is.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreRewriteConfig {
    pub path: String,
    #[serde(default)]
    pub rewrite_target: bool,
}

/// One entry of the `paths` table, keyed by its glob.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRuleConfig {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderConfig>,
    /// Regex pattern -> replacement, tried in declaration order.
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub path_rewrite: OrderedMap<String>,
    /// `user:password`, variable-resolved and sent as basic auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_rewrite: Vec<IgnoreRewriteConfig>,
}
