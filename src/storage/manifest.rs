use core::{fmt::Display, str::FromStr};
use std::collections::BTreeSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::{BeamError, Result};
use crate::session::SessionId;

use super::draft::Draft;

pub const MANIFEST_VERSION: i32 = 1;

/// Indices a receiver still lacks for one session.
///
/// Travels back to the sender outside of the optical channel, either as the
/// JSON file or typed in by hand using the compact [`MissingRanges`] form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingManifest {
    pub session_id: SessionId,
    pub total: u16,
    pub missing: BTreeSet<u16>,
}

impl MissingManifest {
    pub fn from_draft(draft: &Draft) -> Self {
        Self {
            session_id: draft.session_id().clone(),
            total: draft.total(),
            missing: draft.missing(),
        }
    }

    pub fn filename(&self) -> &str {
        self.session_id.filename()
    }

    pub fn ranges(&self) -> MissingRanges {
        MissingRanges(self.missing.clone())
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        let data = ManifestData {
            version: MANIFEST_VERSION,
            session_id: self.session_id.to_string(),
            filename: self.filename().to_owned(),
            total: self.total,
            missing: self.missing.iter().copied().collect(),
        };
        Ok(serde_json::to_vec_pretty(&data)?)
    }

    pub(crate) fn from_json(label: &str, bytes: &[u8]) -> Result<Self> {
        let storage_err = |msg: String| BeamError::Storage(label.to_owned(), msg);

        let data: ManifestData =
            serde_json::from_slice(bytes).map_err(|e| storage_err(e.to_string()))?;
        if data.version != MANIFEST_VERSION {
            return Err(storage_err(format!(
                "Manifest version mismatch: expected {}, got {}",
                MANIFEST_VERSION, data.version
            )));
        }

        let session_id: SessionId = data
            .session_id
            .parse()
            .map_err(|_| storage_err("Invalid session id".to_owned()))?;

        let mut missing = BTreeSet::new();
        for index in data.missing {
            if index >= data.total {
                return Err(storage_err(format!(
                    "Missing frame {} is outside of 0..{}",
                    index, data.total
                )));
            }
            if !missing.insert(index) {
                return Err(storage_err(format!("Frame {} is listed twice", index)));
            }
        }

        Ok(Self {
            session_id,
            total: data.total,
            missing,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ManifestData {
    version: i32,
    session_id: String,
    filename: String,
    total: u16,
    missing: Vec<u16>,
}

/// Compact text form of a set of indices, e.g. `2,4,7-9`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MissingRanges(pub BTreeSet<u16>);

impl Display for MissingRanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut runs: Vec<(u16, u16)> = Vec::new();
        for &index in &self.0 {
            match runs.last_mut() {
                Some((_, end)) if end.checked_add(1) == Some(index) => *end = index,
                _ => runs.push((index, index)),
            }
        }

        let text = runs
            .into_iter()
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{}-{}", start, end)
                }
            })
            .join(",");
        write!(f, "{}", text)
    }
}

impl FromStr for MissingRanges {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self> {
        let mut set = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let parse = |v: &str| v.trim().parse::<u16>().map_err(|_| BeamError::Parse);
            match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse(start)?, parse(end)?);
                    if start > end {
                        return Err(BeamError::Parse);
                    }
                    set.extend(start..=end);
                }
                None => {
                    set.insert(parse(part)?);
                }
            }
        }
        Ok(Self(set))
    }
}
