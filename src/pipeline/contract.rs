//! Output contracts: the required-field schema each stage's response must
//! satisfy before it reaches a typed consumer.
//!
//! Violations carry an explicit kind so callers can branch on *what* went
//! wrong without looking at error text.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::repair::{repair_json, strip_code_fence, MalformedOutput};

/// What a stage does when its output fails the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Repair the text, then fall back to one bare retry.
    RepairThenRetry,
    /// Skip repair; one bare retry only.
    RetryOnly,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("Response is not JSON: {0}")]
    NotJson(String),

    #[error("Response is not a JSON object")]
    NotAnObject,

    #[error("Required field missing: {0}")]
    MissingField(String),

    #[error("Response does not match the expected shape: {0}")]
    Shape(String),

    #[error(transparent)]
    Unrepairable(#[from] MalformedOutput),
}

/// Required-field schema plus an optional allow-list used after repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputContract {
    required: Vec<&'static str>,
    allowed: Option<Vec<&'static str>>,
}

impl OutputContract {
    pub fn new(required: &[&'static str]) -> Self {
        Self {
            required: required.to_vec(),
            allowed: None,
        }
    }

    /// Restrict repaired output to these keys. Required keys are always
    /// allowed, whether or not they are listed.
    pub fn allowing(mut self, allowed: &[&'static str]) -> Self {
        let mut keys = allowed.to_vec();
        for field in &self.required {
            if !keys.contains(field) {
                keys.push(*field);
            }
        }
        self.allowed = Some(keys);
        self
    }

    pub fn required(&self) -> &[&'static str] {
        &self.required
    }

    pub fn allowed(&self) -> Option<&[&'static str]> {
        self.allowed.as_deref()
    }

    /// Check shape: an object carrying every required key with a non-null value.
    pub fn check(&self, value: &Value) -> Result<(), ContractViolation> {
        let object = value.as_object().ok_or(ContractViolation::NotAnObject)?;
        for field in &self.required {
            match object.get(*field) {
                Some(v) if !v.is_null() => {}
                _ => return Err(ContractViolation::MissingField((*field).to_string())),
            }
        }
        Ok(())
    }

    /// Parse without repair: fence stripping is the only leniency, and
    /// only for text that is not already valid JSON.
    pub fn parse_strict<T: DeserializeOwned>(&self, text: &str) -> Result<(T, Value), ContractViolation> {
        let value: Value = match serde_json::from_str(text.trim()) {
            Ok(value) => value,
            Err(_) => serde_json::from_str(strip_code_fence(text))
                .map_err(|e| ContractViolation::NotJson(e.to_string()))?,
        };
        self.typed(value)
    }

    /// Parse through the repair layer, applying the allow-list.
    pub fn parse_repaired<T: DeserializeOwned>(&self, text: &str) -> Result<(T, Value), ContractViolation> {
        let value = repair_json(text, self.allowed())?;
        self.typed(value)
    }

    fn typed<T: DeserializeOwned>(&self, value: Value) -> Result<(T, Value), ContractViolation> {
        self.check(&value)?;
        let typed = serde_json::from_value(value.clone())
            .map_err(|e| ContractViolation::Shape(e.to_string()))?;
        Ok((typed, value))
    }
}
