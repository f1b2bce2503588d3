//! Page audio tracking used to keep assistant speech from overlapping media.

pub mod monitor;

pub use monitor::{
    AudioActivityMonitor, AudioRegistry, AudioSource, IdleWait, PlaybackEvent, TrackedAudio,
};
