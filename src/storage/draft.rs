use std::collections::{BTreeMap, BTreeSet};

use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};

use crate::errors::{BeamError, Result};
use crate::frame::checksum;
use crate::session::{Session, SessionId};

/*
Note on draft versioning:

Version 1 stores every accepted payload as base64 alongside its CRC32, keyed
by frame index. A `BTreeMap` keeps the key order stable so that loading a
draft and saving it again produces the very same bytes.
*/
pub const DRAFT_VERSION: i32 = 1;

/// Receiver-side partial state of one session.
///
/// Every stored payload has already passed checksum validation and every
/// key lies in `0..total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    session_id: SessionId,
    total: u16,
    entries: BTreeMap<u16, Vec<u8>>,
}

impl Draft {
    pub fn new(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            total: session.total,
            entries: BTreeMap::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn filename(&self) -> &str {
        self.session_id.filename()
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    pub fn session(&self) -> Session {
        Session::new(self.session_id.clone(), self.total)
    }

    pub fn belongs_to(&self, session_id: &SessionId, total: u16) -> bool {
        &self.session_id == session_id && self.total == total
    }

    /// Store a payload for a fresh index. Returns `false`, leaving the draft
    /// untouched, when the index is already present or out of range.
    pub fn insert(&mut self, index: u16, payload: Vec<u8>) -> bool {
        if index >= self.total || self.entries.contains_key(&index) {
            return false;
        }
        self.entries.insert(index, payload);
        true
    }

    pub fn contains(&self, index: u16) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn stored(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() == self.total as usize
    }

    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    /// `{0..total} \ stored`, ascending.
    pub fn missing(&self) -> BTreeSet<u16> {
        (0..self.total)
            .filter(|i| !self.entries.contains_key(i))
            .collect()
    }

    /// Concatenate payloads in index order, if every index is present.
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let size = self.entries.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(size);
        for payload in self.entries.values() {
            out.extend_from_slice(payload);
        }
        Some(out)
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        let data = DraftData {
            version: DRAFT_VERSION,
            session_id: self.session_id.to_string(),
            filename: self.filename().to_owned(),
            total: self.total,
            entries: self
                .entries
                .iter()
                .map(|(index, payload)| {
                    let entry = DraftEntry {
                        crc32: checksum(payload),
                        data: general_purpose::STANDARD.encode(payload),
                    };
                    (*index, entry)
                })
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&data)?)
    }

    pub(crate) fn from_json(label: &str, bytes: &[u8]) -> Result<Self> {
        let storage_err = |msg: String| BeamError::Storage(label.to_owned(), msg);

        let data: DraftData =
            serde_json::from_slice(bytes).map_err(|e| storage_err(e.to_string()))?;
        if data.version != DRAFT_VERSION {
            return Err(storage_err(format!(
                "Draft version mismatch: expected {}, got {}",
                DRAFT_VERSION, data.version
            )));
        }

        let session_id: SessionId = data
            .session_id
            .parse()
            .map_err(|_| storage_err("Invalid session id".to_owned()))?;
        if session_id.filename() != data.filename {
            return Err(storage_err(
                "File name does not match the session id".to_owned(),
            ));
        }

        let mut entries = BTreeMap::new();
        for (index, entry) in data.entries {
            if index >= data.total {
                return Err(storage_err(format!(
                    "Frame {} is outside of 0..{}",
                    index, data.total
                )));
            }
            let payload = general_purpose::STANDARD
                .decode(entry.data)
                .map_err(|e| storage_err(e.to_string()))?;
            if checksum(&payload) != entry.crc32 {
                return Err(storage_err(format!(
                    "Checksum mismatch for stored frame {}",
                    index
                )));
            }
            entries.insert(index, payload);
        }

        Ok(Self {
            session_id,
            total: data.total,
            entries,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct DraftData {
    version: i32,
    session_id: String,
    filename: String,
    total: u16,
    entries: BTreeMap<u16, DraftEntry>,
}

#[derive(Serialize, Deserialize)]
struct DraftEntry {
    crc32: u32,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> Draft {
        let id = SessionId::derive("draft.bin", 4, b"abcdefgh");
        Draft::new(&Session::new(id, 4))
    }

    #[test]
    fn duplicate_insert_keeps_first_payload() {
        let mut draft = draft();
        assert!(draft.insert(0, b"ab".to_vec()));
        assert!(!draft.insert(0, b"zz".to_vec()));
        assert_eq!(draft.stored(), 1);

        draft.insert(1, b"cd".to_vec());
        draft.insert(2, b"ef".to_vec());
        draft.insert(3, b"gh".to_vec());
        assert_eq!(draft.assemble().unwrap(), b"abcdefgh");
    }

    #[test]
    fn out_of_range_insert_is_refused() {
        let mut draft = draft();
        assert!(!draft.insert(4, b"x".to_vec()));
        assert!(draft.is_empty());
    }

    #[test]
    fn missing_is_complement_of_stored() {
        let mut draft = draft();
        draft.insert(3, b"gh".to_vec());
        draft.insert(0, b"ab".to_vec());
        assert_eq!(draft.missing().into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(draft.assemble().is_none());
    }

    #[test]
    fn json_form_is_stable() {
        let mut draft = draft();
        draft.insert(2, b"ef".to_vec());
        draft.insert(0, b"ab".to_vec());

        let first = draft.to_json().unwrap();
        let reloaded = Draft::from_json("test", &first).unwrap();
        assert_eq!(reloaded, draft);
        assert_eq!(reloaded.to_json().unwrap(), first);
    }

    #[test]
    fn tampered_entry_is_rejected() {
        let mut draft = draft();
        draft.insert(1, b"cd".to_vec());
        let json = String::from_utf8(draft.to_json().unwrap()).unwrap();
        let tampered = json.replace(&general_purpose::STANDARD.encode(b"cd"), "enk=");

        assert!(matches!(
            Draft::from_json("test", tampered.as_bytes()),
            Err(BeamError::Storage(_, _))
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let json = String::from_utf8(draft().to_json().unwrap()).unwrap();
        let future = json.replace("\"version\": 1", "\"version\": 2");
        match Draft::from_json("test", future.as_bytes()) {
            Err(BeamError::Storage(_, msg)) => assert!(msg.contains("version mismatch")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
