use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SubjectId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Like,
    Dislike,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user's locally believed vote on a subject. `None` means no vote.
pub type VoteMark = Option<VoteDirection>;

/// Who may update a subject's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OwnershipKind {
    Single { owner: String },
    MultiSig { owners: Vec<String>, threshold: u32 },
    Permissionless,
}

impl OwnershipKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::MultiSig { .. } => "multisig",
            Self::Permissionless => "permissionless",
        }
    }
}

/// A votable subject as last reported by the indexer. Replaced wholesale on
/// every catalog refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: SubjectId,
    pub creator: String,
    pub ownership: OwnershipKind,
    #[serde(default)]
    pub update_fee: u128,
    #[serde(default)]
    pub immutable: bool,
    pub like_count: u64,
    pub dislike_count: u64,
}

impl Subject {
    pub fn score(&self) -> i128 {
        i128::from(self.like_count) - i128::from(self.dislike_count)
    }
}
