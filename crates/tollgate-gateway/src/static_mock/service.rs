use super::definition::StaticMockDefinition;
use super::matcher::PatternCache;
use super::template::{render, request_view};
use crate::problem::ProblemDetails;
use crate::proxy::headers::GatewayHeadersExt;
use crate::transaction::{Broadcaster, GatewayEvent};
use crate::transform::{format_set_cookie, InboundRequest, ResponseSnapshot};
use arc_swap::ArcSwap;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, SET_COOKIE};
use hyper::{HeaderMap, StatusCode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const DEFINITIONS_DIR: &str = "mock-definitions";
pub const BODIES_DIR: &str = "body-jsons";

#[derive(Debug, thiserror::Error)]
pub enum StaticMockError {
    #[error("unable to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("body file '{name}' must name a file inside 'body-jsons'")]
    UnsafeBodyPath { name: String },
    #[error("'{path}' is not a mock definition file: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("unable to watch '{path}': {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
}

/// Parse one definition file: a single object or an array of them.
///
/// Array items that do not deserialize are logged and skipped.
pub fn parse_definitions(
    path: &Path,
    contents: &str,
) -> Result<Vec<StaticMockDefinition>, StaticMockError> {
    let parsed: Value = serde_json::from_str(contents).map_err(|e| StaticMockError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match parsed {
        Value::Object(_) => serde_json::from_value(parsed)
            .map(|d| vec![d])
            .map_err(|e| StaticMockError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value(item) {
                Ok(def) => Some(def),
                Err(e) => {
                    warn!(file = %path.display(), index = i, error = %e, "Skipping invalid mock definition");
                    None
                }
            })
            .collect()),
        _ => Err(StaticMockError::Parse {
            path: path.to_path_buf(),
            reason: "expected an object or an array".to_string(),
        }),
    }
}

/// Every `*.json` under `<dir>/mock-definitions`, in file name order.
pub fn load_definitions(dir: &Path) -> Vec<StaticMockDefinition> {
    let definitions_dir = dir.join(DEFINITIONS_DIR);
    let entries = match std::fs::read_dir(&definitions_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(dir = %definitions_dir.display(), error = %e, "Unable to read mock definitions");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_json(path))
        .collect();
    files.sort();

    let mut definitions = Vec::new();
    for file in files {
        let loaded = std::fs::read_to_string(&file)
            .map_err(|source| StaticMockError::Io {
                path: file.clone(),
                source,
            })
            .and_then(|contents| parse_definitions(&file, &contents));
        match loaded {
            Ok(mut defs) => definitions.append(&mut defs),
            Err(e) => error!(error = %e, "Skipping mock definition file"),
        }
    }
    definitions
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Definitions loaded together and the regexes compiled while matching them.
struct MockTable {
    definitions: Arc<Vec<StaticMockDefinition>>,
    patterns: PatternCache,
}

impl MockTable {
    fn new(definitions: Vec<StaticMockDefinition>) -> Self {
        Self {
            definitions: Arc::new(definitions),
            patterns: PatternCache::default(),
        }
    }
}

/// Serves requests from static definitions and keeps them in sync with disk.
pub struct StaticMockService {
    dir: PathBuf,
    table: ArcSwap<MockTable>,
}

impl StaticMockService {
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let definitions = load_definitions(&dir);
        info!(dir = %dir.display(), definitions = definitions.len(), "Static mocks loaded");
        Self {
            dir,
            table: ArcSwap::from_pointee(MockTable::new(definitions)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The active table. Holders keep their snapshot across reloads.
    pub fn definitions(&self) -> Arc<Vec<StaticMockDefinition>> {
        Arc::clone(&self.table.load().definitions)
    }

    /// Re-read the definitions and swap them in. Returns the new count.
    pub fn reload(&self) -> usize {
        let definitions = load_definitions(&self.dir);
        let count = definitions.len();
        self.table.store(Arc::new(MockTable::new(definitions)));
        info!(definitions = count, "Static mock definitions reloaded");
        count
    }

    /// First definition matching `request`, in table order.
    pub fn find_match(&self, request: &InboundRequest) -> Option<StaticMockDefinition> {
        let table = self.table.load();
        table
            .definitions
            .iter()
            .find(|def| table.patterns.matches(&def.request, request))
            .cloned()
    }

    /// Number of regexes compiled for the active table.
    pub fn compiled_patterns(&self) -> usize {
        self.table.load().patterns.len()
    }

    /// Build the response for a matched definition.
    ///
    /// A body file that cannot be read, or that points outside the bodies
    /// directory, yields a 500 problem-details response.
    pub async fn respond(
        &self,
        definition: &StaticMockDefinition,
        request: &InboundRequest,
    ) -> ResponseSnapshot {
        let template = &definition.response;
        let body = match &template.body_json_filename {
            Some(name) if !name.is_empty() => match self.read_body_file(name).await {
                Ok(contents) => contents,
                Err(e) => {
                    error!(id = %request.id, error = %e, "Static mock body file unavailable");
                    return error_response(&e);
                }
            },
            _ => template.inline_body(),
        };
        let body = render(&body, &request_view(request));

        let mut headers = HeaderMap::new();
        headers.set_json_cors();
        for (name, value) in &template.header {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!(header = %name, "Skipping invalid static mock header name");
                continue;
            };
            for (i, value) in header_values(value).iter().enumerate() {
                let Ok(value) = HeaderValue::from_str(value) else {
                    continue;
                };
                if i == 0 {
                    headers.insert(name.clone(), value);
                } else {
                    headers.append(name.clone(), value);
                }
            }
        }
        for (name, cookie) in &template.cookies {
            if let Ok(value) = HeaderValue::from_str(&format_set_cookie(name, cookie)) {
                headers.append(SET_COOKIE, value);
            }
        }

        let status = template
            .status_code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::OK);
        ResponseSnapshot::capture(status, headers, Bytes::from(body))
    }

    async fn read_body_file(&self, name: &str) -> Result<String, StaticMockError> {
        let relative = Path::new(name);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StaticMockError::UnsafeBodyPath {
                name: name.to_string(),
            });
        }
        let path = self.dir.join(BODIES_DIR).join(relative);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StaticMockError::Io { path, source })
    }

    /// Watch the definitions directory and reload on `*.json` changes.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn watch(
        self: &Arc<Self>,
        broadcaster: Broadcaster,
    ) -> Result<RecommendedWatcher, StaticMockError> {
        let path = self.dir.join(DEFINITIONS_DIR);
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_definition_change(&event) {
                    let _ = tx.send(());
                }
            }
            Err(e) => error!(error = %e, "Static mock watch error"),
        })
        .map_err(|source| StaticMockError::Watch {
            path: path.clone(),
            source,
        })?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| StaticMockError::Watch {
                path: path.clone(),
                source,
            })?;

        let service = Arc::clone(self);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // editors emit bursts of events per save
                while rx.try_recv().is_ok() {}
                let definitions = service.reload();
                broadcaster.publish(GatewayEvent::StaticMockReloaded { definitions });
            }
        });

        info!(path = %path.display(), "Static mock watcher started");
        Ok(watcher)
    }
}

fn is_definition_change(event: &Event) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant && event.paths.iter().any(|p| is_json(p))
}

fn header_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn error_response(error: &StaticMockError) -> ResponseSnapshot {
    let mut headers = HeaderMap::new();
    headers.set_json_cors();
    let body = ProblemDetails::new(error.to_string(), 500, "Internal server error").to_bytes(false);
    ResponseSnapshot::capture(StatusCode::INTERNAL_SERVER_ERROR, headers, body)
}
