//! Job configuration
//!
//! A job is one JSON (or YAML) document. This module loads it, checks the
//! top-level layout and hands out the individual sections; the sections
//! themselves are interpreted by the stages that consume them.

mod args;

pub use args::Args;

use crate::error::{JobError, Result};
use crate::kwargs::{index_path, json_kind, Directive};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub const REQUIRED_SECTIONS: [&str; 4] = ["periodic_system", "model_kwargs", "basis_kwargs", "scf"];
pub const OPTIONAL_SECTIONS: [&str; 1] = ["postscf"];

/// Input document format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Yaml,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                InputFormat::Yaml
            }
            _ => InputFormat::Json,
        }
    }
}

/// The validated job document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    periodic_system: Map<String, Value>,
    model_kwargs: Map<String, Value>,
    basis_kwargs: Map<String, Value>,
    scf: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    postscf: Option<Vec<Value>>,
}

fn take_object(document: &mut Map<String, Value>, key: &str) -> Result<Map<String, Value>> {
    match document.remove(key) {
        Some(Value::Object(section)) => Ok(section),
        Some(other) => Err(JobError::config(
            key,
            format!("expected an object, found {}", json_kind(&other)),
        )),
        None => Err(JobError::config(key, "required section is missing")),
    }
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| JobError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, InputFormat::from_path(path))
    }

    pub fn parse(text: &str, format: InputFormat) -> Result<Self> {
        let value: Value = match format {
            InputFormat::Json => serde_json::from_str(text)?,
            InputFormat::Yaml => serde_yml::from_str(text)?,
        };
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let mut document = match value {
            Value::Object(document) => document,
            other => {
                return Err(JobError::config(
                    "",
                    format!("the job document must be an object, found {}", json_kind(&other)),
                ))
            }
        };

        for key in REQUIRED_SECTIONS {
            if !document.contains_key(key) {
                return Err(JobError::config(key, "required section is missing"));
            }
        }
        if let Some(key) = document
            .keys()
            .find(|k| !REQUIRED_SECTIONS.contains(&k.as_str()) && !OPTIONAL_SECTIONS.contains(&k.as_str()))
        {
            return Err(JobError::config(key.as_str(), "unknown section"));
        }

        let periodic_system = take_object(&mut document, "periodic_system")?;
        let model_kwargs = take_object(&mut document, "model_kwargs")?;
        let basis_kwargs = take_object(&mut document, "basis_kwargs")?;
        let scf = take_object(&mut document, "scf")?;
        let postscf = match document.remove("postscf") {
            None | Some(Value::Null) => None,
            Some(Value::Array(entries)) => Some(entries),
            Some(other) => {
                return Err(JobError::config(
                    "postscf",
                    format!("expected an array, found {}", json_kind(&other)),
                ))
            }
        };

        Ok(JobConfig {
            periodic_system,
            model_kwargs,
            basis_kwargs,
            scf,
            postscf,
        })
    }

    pub fn periodic_system(&self) -> &Map<String, Value> {
        &self.periodic_system
    }

    pub fn model_kwargs(&self) -> &Map<String, Value> {
        &self.model_kwargs
    }

    pub fn basis_kwargs(&self) -> &Map<String, Value> {
        &self.basis_kwargs
    }

    pub fn scf(&self) -> Result<Directive> {
        Directive::from_map("scf", &self.scf)
    }

    /// The post-SCF calls in input order; empty when the section is absent.
    pub fn postscf(&self) -> Result<Vec<Directive>> {
        self.postscf
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, entry)| Directive::parse(&index_path("postscf", i), entry))
            .collect()
    }
}
