use super::{JoinError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 0-based index of a compute node.
pub type NodeId = usize;

/// One of the two join inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// Build side, replicated for heavy keys.
    R,
    /// Probe side, kept stationary for heavy keys.
    S,
}

impl Relation {
    /// Tag byte carried in every wire message.
    pub fn tag(self) -> u8 {
        match self {
            Relation::R => b'R',
            Relation::S => b'S',
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            b'R' => Ok(Relation::R),
            b'S' => Ok(Relation::S),
            other => Err(JoinError::Transport(format!(
                "invalid relation tag 0x{:02x}",
                other
            ))),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::R => write!(f, "R"),
            Relation::S => write!(f, "S"),
        }
    }
}

/// A join candidate or a joined output row.
///
/// Input rows only carry the id of their own relation; the other slot holds
/// [`Row::PLACEHOLDER`]. Joined rows carry both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Row {
    pub join_val: u32,
    pub source_id_r: u32,
    pub source_id_s: u32,
}

impl Row {
    pub const PLACEHOLDER: u32 = 0;

    /// Size of one row on the wire.
    pub const ENCODED_LEN: usize = 12;

    pub fn new(join_val: u32, source_id_r: u32, source_id_s: u32) -> Self {
        Self {
            join_val,
            source_id_r,
            source_id_s,
        }
    }

    /// Builds an input row of `relation` with its row id in the matching slot.
    pub fn input(relation: Relation, join_val: u32, row_id: u32) -> Self {
        match relation {
            Relation::R => Self::new(join_val, row_id, Self::PLACEHOLDER),
            Relation::S => Self::new(join_val, Self::PLACEHOLDER, row_id),
        }
    }

    /// Combines a build-side match with a probe-side row.
    pub fn joined(r: &Row, s: &Row) -> Self {
        Self::new(s.join_val, r.source_id_r, s.source_id_s)
    }

    /// The row id meaningful for `relation`.
    pub fn source_id(&self, relation: Relation) -> u32 {
        match relation {
            Relation::R => self.source_id_r,
            Relation::S => self.source_id_s,
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.join_val, self.source_id_r, self.source_id_s
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_rows_fill_their_own_slot() {
        assert_eq!(Row::input(Relation::R, 7, 3), Row::new(7, 3, 0));
        assert_eq!(Row::input(Relation::S, 7, 3), Row::new(7, 0, 3));
    }

    #[test]
    fn relation_tags() {
        assert_eq!(Relation::from_tag(Relation::R.tag()).unwrap(), Relation::R);
        assert_eq!(Relation::from_tag(b'S').unwrap(), Relation::S);
        assert!(matches!(
            Relation::from_tag(b'X'),
            Err(JoinError::Transport(_))
        ));
    }
}
