//! Work units: один диапазон кольца + участвующие узлы.
//!
//! Юниты раздаются воркерам один раз на старте (без work stealing) и
//! сериализуются в JSON-файлы под tmp dir для подпроцессов. Identifiers
//! ходят в hex — JSON не дружит с массивами длиннее 32 байт.

use serde::{Deserialize, Serialize};

use crate::blob::IdRange;

use super::RecoveryType;

mod id_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::blob::Id;
    use crate::util::{id_from_hex, id_to_hex};

    pub fn serialize<S: Serializer>(id: &Id, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id_to_hex(id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Id, D::Error> {
        let s = String::deserialize(d)?;
        id_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Per-unit recovery participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Merge: push misplaced local keys to the range owner.
    Merge { remote: String },
    /// Dc: reconcile one range across replicas (group, addr).
    Dc { replicas: Vec<(u32, String)> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkUnit {
    pub index: usize,
    pub group: u32,
    #[serde(with = "id_hex")]
    pub start: crate::blob::Id,
    #[serde(with = "id_hex")]
    pub end: crate::blob::Id,
    pub kind: UnitKind,
}

impl WorkUnit {
    pub fn range(&self) -> IdRange {
        IdRange::new(self.start, self.end)
    }

    pub fn rtype(&self) -> RecoveryType {
        match self.kind {
            UnitKind::Merge { .. } => RecoveryType::Merge,
            UnitKind::Dc { .. } => RecoveryType::Dc,
        }
    }
}

/// Per-unit state machine. Terminal states: Done, Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Iterating,
    Diffing,
    Transferring,
    Done,
    Failed,
}

impl UnitState {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitState::Pending => "pending",
            UnitState::Iterating => "iterating",
            UnitState::Diffing => "diffing",
            UnitState::Transferring => "transferring",
            UnitState::Done => "done",
            UnitState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed)
    }
}
