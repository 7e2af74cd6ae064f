//! API contracts: loading, structural validation and example generation.

pub mod document;
pub mod example;
pub mod validator;

use crate::config::ConfigError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub use document::{
    ContractDocument, MediaTypeObject, Operation, ResolvedPath, ResponseObject, SecurityScheme,
};
pub use example::{ExampleError, ExampleGenerator, SchemaExampleGenerator};
pub use validator::{validate_request, validate_response, ContractValidator, ValidationFinding};

/// Every configured contract, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ContractSet {
    documents: Vec<Arc<ContractDocument>>,
}

impl ContractSet {
    pub fn load(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let documents = paths
            .iter()
            .map(|p| ContractDocument::from_file(p).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        for doc in &documents {
            info!(contract = %doc.source.display(), paths = doc.paths.len(), "Loaded contract");
        }
        Ok(Self { documents })
    }

    pub fn from_documents(documents: Vec<ContractDocument>) -> Self {
        Self {
            documents: documents.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// The first contract that documents `path`, else the first contract.
    pub fn select(&self, path: &str) -> Option<&Arc<ContractDocument>> {
        self.documents
            .iter()
            .find(|doc| doc.has_path(path))
            .or_else(|| self.documents.first())
    }
}
