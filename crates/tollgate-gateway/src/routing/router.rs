//! Ordered path rules compiled from the `paths` table, plus the path-scoped
//! policy lists (delays, mock mode, redirect and validation exemptions).

use super::glob::{compile_config_glob, Glob, GlobList};
use crate::config::{ConfigError, GatewayConfig, IgnoreRewriteConfig, PathRuleConfig, VariableTable};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Request header carrying the `rewriteId` that picks a specific rule.
pub const REWRITE_ID_HEADER: &str = "rewriteid";

#[derive(Debug, Clone)]
pub struct IgnoreRewrite {
    pub glob: Glob,
    pub rewrite_target: bool,
}

impl IgnoreRewrite {
    fn compile_all(key: &str, configs: &[IgnoreRewriteConfig]) -> Result<Vec<Self>, ConfigError> {
        configs
            .iter()
            .map(|c| {
                Ok(Self {
                    glob: compile_config_glob(key, &c.path)?,
                    rewrite_target: c.rewrite_target,
                })
            })
            .collect()
    }
}

/// A `paths` entry with its glob, rewrite regexes and ignore globs compiled.
#[derive(Debug, Clone)]
pub struct CompiledPathRule {
    pub key: String,
    pub glob: Glob,
    pub config: PathRuleConfig,
    pub(crate) rewrites: Vec<(Regex, String)>,
    pub(crate) ignore_rewrites: Vec<IgnoreRewrite>,
}

impl CompiledPathRule {
    pub fn compile(key: &str, config: &PathRuleConfig) -> Result<Self, ConfigError> {
        let glob = compile_config_glob(&format!("paths.{key}"), key)?;

        let mut rewrites = Vec::with_capacity(config.path_rewrite.len());
        for (pattern, replacement) in config.path_rewrite.iter() {
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                key: format!("paths.{key}.pathRewrite"),
                pattern: pattern.to_string(),
                source,
            })?;
            rewrites.push((regex, replacement.clone()));
        }

        let ignore_rewrites =
            IgnoreRewrite::compile_all(&format!("paths.{key}.ignoreRewrite"), &config.ignore_rewrite)?;

        Ok(Self {
            key: key.to_string(),
            glob,
            config: config.clone(),
            rewrites,
            ignore_rewrites,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.glob.is_match(path)
    }
}

#[derive(Debug, Clone)]
pub struct PathRouter {
    rules: Vec<CompiledPathRule>,
    path_delays: Vec<(Glob, u64)>,
    pub(crate) ignore_path_rewrite: Vec<IgnoreRewrite>,
    mock_mode_list: GlobList,
    ignore_redirects: GlobList,
    redirect_allow_list: GlobList,
    ignore_validation: GlobList,
    validation_allow_list: GlobList,
    pub(crate) variables: Arc<VariableTable>,
}

impl PathRouter {
    pub fn compile(
        config: &GatewayConfig,
        variables: Arc<VariableTable>,
    ) -> Result<Self, ConfigError> {
        let rules = config
            .paths
            .iter()
            .map(|(key, rule)| CompiledPathRule::compile(key, rule))
            .collect::<Result<Vec<_>, _>>()?;

        let path_delays = config
            .path_delays
            .iter()
            .map(|(key, ms)| Ok((compile_config_glob("pathDelays", &variables.resolve(key))?, *ms)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let router = Self {
            rules,
            path_delays,
            ignore_path_rewrite: IgnoreRewrite::compile_all(
                "ignorePathRewrite",
                &config.ignore_path_rewrite,
            )?,
            mock_mode_list: GlobList::compile("mockModeList", &config.mock_mode_list, &variables)?,
            ignore_redirects: GlobList::compile(
                "ignoreRedirects",
                &config.ignore_redirects,
                &variables,
            )?,
            redirect_allow_list: GlobList::compile(
                "redirectAllowList",
                &config.redirect_allow_list,
                &variables,
            )?,
            ignore_validation: GlobList::compile(
                "ignoreValidation",
                &config.ignore_validation,
                &variables,
            )?,
            validation_allow_list: GlobList::compile(
                "validationAllowList",
                &config.validation_allow_list,
                &variables,
            )?,
            variables,
        };
        debug!(
            rules = router.rules.len(),
            delays = router.path_delays.len(),
            "Path router compiled"
        );
        Ok(router)
    }

    pub fn rules(&self) -> &[CompiledPathRule] {
        &self.rules
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Every rule whose glob matches `path`, in declaration order.
    pub fn find_paths(&self, path: &str) -> Vec<&CompiledPathRule> {
        self.rules.iter().filter(|r| r.is_match(path)).collect()
    }

    /// The rule governing rewriting: the matched rule whose `rewriteId` equals one of
    /// `rewrite_ids`, else the first matched rule.
    pub fn select_rule<'a>(
        &'a self,
        matched: &[&'a CompiledPathRule],
        rewrite_ids: &[&str],
    ) -> Option<&'a CompiledPathRule> {
        let by_id = matched.iter().copied().find(|rule| {
            rule.config
                .rewrite_id
                .as_deref()
                .is_some_and(|id| rewrite_ids.contains(&id))
        });
        by_id.or_else(|| matched.first().copied())
    }

    /// Delay of the first matching rule that declares one, else the last matching
    /// `pathDelays` entry, else zero.
    pub fn find_path_delay(&self, path: &str) -> u64 {
        if let Some(ms) = self
            .rules
            .iter()
            .filter(|r| r.is_match(path))
            .find_map(|r| r.config.delay)
        {
            return ms;
        }
        self.path_delays
            .iter()
            .filter(|(glob, _)| glob.is_match(path))
            .map(|(_, ms)| *ms)
            .last()
            .unwrap_or(0)
    }

    pub fn in_mock_mode_list(&self, path: &str) -> bool {
        self.mock_mode_list.matches(path)
    }

    /// Redirects are not followed on ignored paths unless they are allow-listed.
    pub fn redirects_ignored(&self, path: &str) -> bool {
        self.ignore_redirects.matches(path) && !self.redirect_allow_list.matches(path)
    }

    /// Contract validation is skipped on ignored paths unless they are allow-listed.
    pub fn validation_ignored(&self, path: &str) -> bool {
        self.ignore_validation.matches(path) && !self.validation_allow_list.matches(path)
    }
}
