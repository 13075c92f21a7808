//! One bus address slot

use crate::core::codec::{CapabilityBlock, ErrorBlock, HoldingBlock, StatusBlock};

/// Local mirror of one indoor unit slot
///
/// The slot index is the bus address and never changes; discovery resets the
/// rest of the record.
#[derive(Debug, Clone, Default)]
pub struct Unit {
    pub(crate) index: u8,
    pub(crate) id: String,
    pub(crate) present: bool,
    pub(crate) last_error_read: Option<u64>,
    pub(crate) capability: CapabilityBlock,
    pub(crate) status: StatusBlock,
    pub(crate) holding: HoldingBlock,
    pub(crate) error: ErrorBlock,
}

impl Unit {
    /// Empty slot
    pub fn new(index: u8) -> Self {
        Self {
            index,
            id: Self::display_id(index),
            ..Self::default()
        }
    }

    /// Display id of a slot, `group-number`, e.g. `1-05` or `4-15`
    pub fn display_id(index: u8) -> String {
        format!("{}-{:02}", index / 16 + 1, index % 16)
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.index);
    }

    /// Slot index, equal to the bus address
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Display id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Found by the last discovery pass
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Time of the last successful error read
    pub fn last_error_read(&self) -> Option<u64> {
        self.last_error_read
    }

    /// Capability snapshot
    pub fn capability(&self) -> &CapabilityBlock {
        &self.capability
    }

    /// Status mirror
    pub fn status(&self) -> &StatusBlock {
        &self.status
    }

    /// Holding image
    pub fn holding(&self) -> &HoldingBlock {
        &self.holding
    }

    /// Cached error block
    pub fn error(&self) -> &ErrorBlock {
        &self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_id() {
        assert_eq!(Unit::display_id(0), "1-00");
        assert_eq!(Unit::display_id(5), "1-05");
        assert_eq!(Unit::display_id(16), "2-00");
        assert_eq!(Unit::display_id(63), "4-15");
    }

    #[test]
    fn test_reset_keeps_index() {
        let mut unit = Unit::new(17);
        unit.present = true;
        unit.last_error_read = Some(10);
        unit.reset();
        assert_eq!(unit.index(), 17);
        assert_eq!(unit.id(), "2-01");
        assert!(!unit.is_present());
        assert_eq!(unit.last_error_read(), None);
    }
}
