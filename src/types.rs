//! Core identifiers shared across the conversion pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Identifies the analysis/generation stages of a conversion run, in
/// pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    FormStructure,
    BusinessLogic,
    DataAccess,
    Security,
    TemplateGeneration,
}

impl StageId {
    /// All stages in ordinal order.
    pub const ALL: [Self; 5] = [
        Self::FormStructure,
        Self::BusinessLogic,
        Self::DataAccess,
        Self::Security,
        Self::TemplateGeneration,
    ];

    /// Returns the string representation of the stage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FormStructure => "form-structure",
            Self::BusinessLogic => "business-logic",
            Self::DataAccess => "data-access",
            Self::Security => "security",
            Self::TemplateGeneration => "template-generation",
        }
    }

    /// Position of the stage within the pipeline.
    #[must_use]
    pub const fn ordinal(&self) -> u8 {
        match self {
            Self::FormStructure => 0,
            Self::BusinessLogic => 1,
            Self::DataAccess => 2,
            Self::Security => 3,
            Self::TemplateGeneration => 4,
        }
    }

    /// Numeric prefix used in artifact filenames (spaced by 10 so stages
    /// can be inserted without renumbering existing artifacts).
    #[must_use]
    pub const fn file_prefix(&self) -> u8 {
        match self {
            Self::FormStructure => 0,
            Self::BusinessLogic => 10,
            Self::DataAccess => 20,
            Self::Security => 30,
            Self::TemplateGeneration => 40,
        }
    }

    /// File extension of the artifact this stage produces. Analysis stages
    /// emit JSON; the template stage emits operator-readable markdown.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::TemplateGeneration => "md",
            _ => "json",
        }
    }

    /// Artifact filename for this stage, e.g. `10-business-logic.json`.
    #[must_use]
    pub fn artifact_filename(&self) -> String {
        format!("{:02}-{}.{}", self.file_prefix(), self.as_str(), self.extension())
    }

    /// Parse a stage token: either the stage name or its ordinal position.
    #[must_use]
    pub fn parse_token(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Ok(n) = token.parse::<u8>() {
            return Self::ALL.iter().copied().find(|s| s.ordinal() == n);
        }
        Self::ALL.iter().copied().find(|s| s.as_str() == token)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from parsing a `--skip-steps` list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkipParseError {
    #[error("unknown stage '{0}' in skip list (expected a stage name or ordinal 0-4)")]
    UnknownStage(String),
}

/// The set of stages an operator has opted to bypass on a given run,
/// typically because their artifacts already exist from a prior run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSet(BTreeSet<StageId>);

impl SkipSet {
    /// Parse a comma-separated list of stage names or ordinals.
    /// Empty tokens are ignored so trailing commas are harmless.
    pub fn parse(raw: &str) -> Result<Self, SkipParseError> {
        let mut set = BTreeSet::new();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match StageId::parse_token(token) {
                Some(stage) => {
                    set.insert(stage);
                }
                None => return Err(SkipParseError::UnknownStage(token.to_string())),
            }
        }
        Ok(Self(set))
    }

    #[must_use]
    pub fn contains(&self, stage: StageId) -> bool {
        self.0.contains(&stage)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<StageId> for SkipSet {
    fn from_iter<I: IntoIterator<Item = StageId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
