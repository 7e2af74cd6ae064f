//! Upstream URL construction from the selected path rule.

use super::router::{CompiledPathRule, IgnoreRewrite, PathRouter};
use tracing::info;

/// Result of rewriting an inbound path.
#[derive(Debug, Clone)]
pub struct PathRewrite<'a> {
    /// An absolute upstream URL when `absolute`, otherwise the untouched path.
    /// The inbound query string is carried over either way.
    pub rewritten: String,
    pub absolute: bool,
    pub rule: Option<&'a CompiledPathRule>,
}

impl PathRewrite<'_> {
    /// The URL to call: the rewritten URL, or the path under the global redirect target.
    pub fn upstream_url(&self, redirect_target: &str) -> String {
        if self.absolute {
            self.rewritten.clone()
        } else {
            format!("{}{}", redirect_target.trim_end_matches('/'), self.rewritten)
        }
    }
}

impl PathRouter {
    /// Rewrite `path` using the rule selected by `rewrite_ids` (or the first match).
    pub fn rewrite<'a>(
        &'a self,
        path: &str,
        query: Option<&str>,
        rewrite_ids: &[&str],
    ) -> PathRewrite<'a> {
        let matched = self.find_paths(path);
        let Some(rule) = self.select_rule(&matched, rewrite_ids) else {
            return untouched(path, query, None);
        };

        if let Some(outcome) = self.check_ignored(&self.ignore_path_rewrite, path, query, rule, "global")
        {
            return outcome;
        }

        for (regex, replacement) in &rule.rewrites {
            if !regex.is_match(path) {
                continue;
            }
            if let Some(outcome) = self.check_ignored(&rule.ignore_rewrites, path, query, rule, "local")
            {
                return outcome;
            }
            let replaced = regex.replace_all(path, replacement.as_str());
            return self.with_target(&replaced, query, rule);
        }

        self.with_target(path, query, rule)
    }

    fn check_ignored<'a>(
        &self,
        ignores: &[IgnoreRewrite],
        path: &str,
        query: Option<&str>,
        rule: &'a CompiledPathRule,
        scope: &str,
    ) -> Option<PathRewrite<'a>> {
        let ignore = ignores.iter().find(|i| i.glob.is_match(path))?;
        if ignore.rewrite_target {
            Some(self.with_target(path, query, rule))
        } else {
            info!(path, scope, "Not rewriting path due to ignore rewrite configuration");
            Some(untouched(path, query, Some(rule)))
        }
    }

    /// `scheme://target/path?query`, with a `/` inserted only when neither side provides one.
    fn with_target<'a>(
        &self,
        path: &str,
        query: Option<&str>,
        rule: &'a CompiledPathRule,
    ) -> PathRewrite<'a> {
        let scheme = if rule.config.secure { "https" } else { "http" };
        let resolved = self.variables.resolve(&rule.config.target);
        let target = resolved
            .strip_prefix("https://")
            .or_else(|| resolved.strip_prefix("http://"))
            .unwrap_or(&resolved);

        let separator = if path.starts_with('/') || rule.config.target.ends_with('/') {
            ""
        } else {
            "/"
        };

        let mut rewritten = format!("{scheme}://{target}{separator}{path}");
        append_query(&mut rewritten, query);
        PathRewrite {
            rewritten,
            absolute: true,
            rule: Some(rule),
        }
    }
}

fn untouched<'a>(
    path: &str,
    query: Option<&str>,
    rule: Option<&'a CompiledPathRule>,
) -> PathRewrite<'a> {
    let mut rewritten = path.to_string();
    append_query(&mut rewritten, query);
    PathRewrite {
        rewritten,
        absolute: false,
        rule,
    }
}

fn append_query(url: &mut String, query: Option<&str>) {
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
}
