use daqstream::core::Channel;
use daqstream::hal::{ChannelIndexMap, StreamingConfiguration};

#[test]
fn test_first_only() {
    let map = ChannelIndexMap::from_enabled([true, false, false]);
    assert_eq!(map.indices(), [Some(0), None, None]);
    assert_eq!(map.enabled_count(), 1);
}

#[test]
fn test_first_and_second() {
    let map = ChannelIndexMap::from_enabled([true, true, false]);
    assert_eq!(map.indices(), [Some(0), Some(1), None]);
}

#[test]
fn test_all_channels() {
    let map = ChannelIndexMap::from_enabled([true, true, true]);
    assert_eq!(map.indices(), [Some(0), Some(1), Some(2)]);
    assert_eq!(map.enabled_count(), 3);
}

#[test]
fn test_second_only_reads_first_wire_slot() {
    let map = ChannelIndexMap::from_enabled([false, true, false]);
    assert_eq!(map.index(Channel::Second), Some(0));
    assert_eq!(map.index(Channel::First), None);
}

#[test]
fn test_first_and_third_are_consecutive() {
    let map = ChannelIndexMap::from_streaming(&StreamingConfiguration::new(true, false, true));
    assert_eq!(map.indices(), [Some(0), None, Some(1)]);
    assert_eq!(map.project(&[0.5, -0.5]), [Some(0.5), None, Some(-0.5)]);
}

#[test]
fn test_value_of_disabled_channel_is_none() {
    let map = ChannelIndexMap::from_enabled([true, false, false]);
    assert_eq!(map.value(Channel::First, &[1.25]), Some(1.25));
    assert_eq!(map.value(Channel::Third, &[1.25]), None);
}
