use super::{computation::CompId, group::GroupId, tsid::TsKey};
use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotifyKind {
    TsCreated,
    TsDeleted,
    TsModified,
    ComputationModified,
    GroupModified,
    FullEval,
}

impl NotifyKind {
    pub fn code(self) -> char {
        match self {
            Self::TsCreated => 'T',
            Self::TsDeleted => 'D',
            Self::TsModified => 'M',
            Self::ComputationModified => 'C',
            Self::GroupModified => 'G',
            Self::FullEval => 'F',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        let kind = match code.to_ascii_uppercase() {
            'T' => Self::TsCreated,
            'D' => Self::TsDeleted,
            'M' => Self::TsModified,
            'C' => Self::ComputationModified,
            'G' => Self::GroupModified,
            'F' => Self::FullEval,
            _ => return None,
        };
        Some(kind)
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TsCreated => "ts_created",
            Self::TsDeleted => "ts_deleted",
            Self::TsModified => "ts_modified",
            Self::ComputationModified => "computation_modified",
            Self::GroupModified => "group_modified",
            Self::FullEval => "full_eval",
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub record_num: i64,
    pub kind: NotifyKind,
    pub key: i64,
    pub loaded_at: NaiveDateTime,
}

impl ChangeNotification {
    /// Same event as `other`, ignoring the record number.
    pub fn is_duplicate_of(&self, other: &ChangeNotification) -> bool {
        self.kind == other.kind && self.key == other.key && self.loaded_at == other.loaded_at
    }

    pub fn ts_key(&self) -> TsKey {
        TsKey(self.key)
    }

    pub fn comp_id(&self) -> CompId {
        CompId(self.key)
    }

    pub fn group_id(&self) -> GroupId {
        GroupId(self.key)
    }
}
