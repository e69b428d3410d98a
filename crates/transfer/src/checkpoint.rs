//! Resume checkpoint and its JSON codec.
//!
//! Persisted shape: `{"size", "offset", "modify_time", "contexts": [..]}`.
//! A block without an acknowledged chunk is stored as an empty string.

use serde::{Deserialize, Serialize};

use crate::Layout;

/// Snapshot of an upload's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub size: u64,
    /// First byte not yet acknowledged.
    pub offset: u64,
    /// Source modification time in epoch milliseconds.
    pub modify_time: i64,
    pub contexts: Vec<String>,
}

/// Why a stored checkpoint cannot be used for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    ZeroOffset,
    SizeChanged,
    ModifyTimeChanged,
    NoContexts,
    OffsetPastEnd,
    TooManyContexts,
    MissingContext { block: usize },
}

impl Checkpoint {
    /// Builds a checkpoint from per-block context slots.
    pub fn new(size: u64, offset: u64, modify_time: i64, contexts: &[Option<String>]) -> Self {
        Self {
            size,
            offset,
            modify_time,
            contexts: contexts
                .iter()
                .map(|c| c.clone().unwrap_or_default())
                .collect(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a stored checkpoint. Anything malformed decodes to `None`.
    pub fn decode(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }

    /// Context slots with placeholders turned back into `None`.
    pub fn context_slots(&self) -> Vec<Option<String>> {
        self.contexts
            .iter()
            .map(|c| (!c.is_empty()).then(|| c.clone()))
            .collect()
    }

    /// Checks that this checkpoint describes the same file and a state the
    /// engine can continue from.
    pub fn validate(&self, layout: &Layout, modify_time: i64) -> Result<(), StaleReason> {
        if self.offset == 0 {
            return Err(StaleReason::ZeroOffset);
        }
        if self.size != layout.size() {
            return Err(StaleReason::SizeChanged);
        }
        if self.modify_time != modify_time {
            return Err(StaleReason::ModifyTimeChanged);
        }
        if self.contexts.is_empty() {
            return Err(StaleReason::NoContexts);
        }
        if self.offset > layout.size() {
            return Err(StaleReason::OffsetPastEnd);
        }
        if self.contexts.len() > layout.block_count() {
            return Err(StaleReason::TooManyContexts);
        }
        // Every block that holds acknowledged bytes needs its context.
        let touched = layout.block_index(self.offset - 1);
        for block in 0..=touched {
            if self.contexts.get(block).is_none_or(String::is_empty) {
                return Err(StaleReason::MissingContext { block });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn layout() -> Layout {
        Layout::new(10 * MIB, 4 * MIB, MIB).unwrap()
    }

    fn sample() -> Checkpoint {
        Checkpoint::new(
            10 * MIB,
            5 * MIB,
            1_700_000_000_000,
            &[Some("c0".into()), Some("c1".into()), None],
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let cp = sample();
        let bytes = cp.encode().unwrap();
        let decoded = Checkpoint::decode(&bytes).unwrap();
        assert_eq!(decoded, cp);
        assert_eq!(
            decoded.context_slots(),
            vec![Some("c0".to_string()), Some("c1".to_string()), None]
        );
    }

    #[test]
    fn persisted_field_names() {
        let json: serde_json::Value = serde_json::from_slice(&sample().encode().unwrap()).unwrap();
        assert_eq!(json["size"], 10 * MIB);
        assert_eq!(json["offset"], 5 * MIB);
        assert_eq!(json["modify_time"], 1_700_000_000_000i64);
        assert_eq!(json["contexts"], serde_json::json!(["c0", "c1", ""]));
    }

    #[test]
    fn decode_tolerates_garbage() {
        assert!(Checkpoint::decode(b"").is_none());
        assert!(Checkpoint::decode(b"not json").is_none());
        assert!(Checkpoint::decode(br#"{"size":1,"offset":1}"#).is_none());
        assert!(
            Checkpoint::decode(br#"{"size":"1","offset":1,"modify_time":1,"contexts":[]}"#)
                .is_none()
        );
        assert!(
            Checkpoint::decode(br#"{"size":1,"offset":1,"modify_time":1,"contexts":[1]}"#)
                .is_none()
        );
    }

    #[test]
    fn decode_accepts_extra_whitespace_and_fields() {
        let raw = br#"{"size":10,"offset":4, "modify_time":7, "contexts":["a"], "extra":true}"#;
        let cp = Checkpoint::decode(raw).unwrap();
        assert_eq!(cp.offset, 4);
        assert_eq!(cp.contexts, vec!["a"]);
    }

    #[test]
    fn validate_accepts_matching_checkpoint() {
        assert_eq!(sample().validate(&layout(), 1_700_000_000_000), Ok(()));
    }

    #[test]
    fn validate_rejects_stale_fingerprint() {
        let cp = sample();
        assert_eq!(
            cp.validate(&layout(), 1),
            Err(StaleReason::ModifyTimeChanged)
        );
        let other = Layout::new(11 * MIB, 4 * MIB, MIB).unwrap();
        assert_eq!(
            cp.validate(&other, 1_700_000_000_000),
            Err(StaleReason::SizeChanged)
        );
    }

    #[test]
    fn validate_rejects_inconsistent_state() {
        let mt = 1_700_000_000_000;
        let mut cp = sample();
        cp.offset = 0;
        assert_eq!(cp.validate(&layout(), mt), Err(StaleReason::ZeroOffset));

        let mut cp = sample();
        cp.contexts.clear();
        assert_eq!(cp.validate(&layout(), mt), Err(StaleReason::NoContexts));

        let mut cp = sample();
        cp.offset = 11 * MIB;
        assert_eq!(cp.validate(&layout(), mt), Err(StaleReason::OffsetPastEnd));

        let mut cp = sample();
        cp.contexts.push("x".into());
        cp.contexts.push("y".into());
        assert_eq!(cp.validate(&layout(), mt), Err(StaleReason::TooManyContexts));

        let mut cp = sample();
        cp.contexts[1] = String::new();
        assert_eq!(
            cp.validate(&layout(), mt),
            Err(StaleReason::MissingContext { block: 1 })
        );
    }

    #[test]
    fn block_boundary_offset_does_not_need_next_context() {
        // Offset exactly at the start of block 1: only block 0 is touched.
        let cp = Checkpoint::new(10 * MIB, 4 * MIB, 9, &[Some("c0".into()), None, None]);
        assert_eq!(cp.validate(&layout(), 9), Ok(()));
    }
}
