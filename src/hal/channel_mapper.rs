use super::types::StreamingConfiguration;
use crate::core::Channel;

/// Maps logical channels onto positions in a raw frame
///
/// The device stream omits disabled channels, so enabled channels occupy
/// consecutive positions in logical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelIndexMap {
    indices: [Option<usize>; 3],
}

impl ChannelIndexMap {
    pub fn from_enabled(enabled: [bool; 3]) -> Self {
        let mut indices = [None; 3];
        let mut next = 0;
        for (slot, is_enabled) in indices.iter_mut().zip(enabled) {
            if is_enabled {
                *slot = Some(next);
                next += 1;
            }
        }
        Self { indices }
    }

    pub fn from_streaming(config: &StreamingConfiguration) -> Self {
        Self::from_enabled(config.as_array())
    }

    /// Device-side index of a logical channel, `None` when disabled
    pub fn index(&self, channel: Channel) -> Option<usize> {
        self.indices[channel.index()]
    }

    pub fn indices(&self) -> [Option<usize>; 3] {
        self.indices
    }

    pub fn enabled_count(&self) -> usize {
        self.indices.iter().flatten().count()
    }

    /// Value of a logical channel within a device-ordered frame
    pub fn value(&self, channel: Channel, values: &[f64]) -> Option<f64> {
        self.index(channel).and_then(|i| values.get(i).copied())
    }

    /// Project a device-ordered frame onto logical channel order
    pub fn project(&self, values: &[f64]) -> [Option<f64>; 3] {
        Channel::ALL.map(|ch| self.value(ch, values))
    }
}
