pub mod frame;
pub mod instructions;

pub use frame::{Batch, DataValue, DerivedPoint, ObserverMessage, SampleFrame, COUNTER_MODULUS};
pub use instructions::{AdcConfig, Channel, ChannelSelection, DerivedMetricRequest, SessionInstructions};
