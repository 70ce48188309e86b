use bytes::Bytes;

/// Snapshot of the dispatcher's view of the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    /// Last observed alarm bitmap, one byte per alarm group.
    pub alarms: Bytes,
    /// Best-known free slots in the device command queue.
    pub left_space: u32,
}

impl LinkState {
    /// First nonzero alarm group as `(group, code)`.
    pub fn active_alarm(&self) -> Option<(usize, u8)> {
        first_alarm(&self.alarms)
    }
}

pub(crate) fn first_alarm(alarms: &[u8]) -> Option<(usize, u8)> {
    alarms
        .iter()
        .enumerate()
        .find(|(_, code)| **code != 0)
        .map(|(group, code)| (group, *code))
}
