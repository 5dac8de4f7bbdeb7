//! Audio subsystem module

pub mod capture;
pub mod queue;
pub mod source;

pub use capture::CaptureProducer;
pub use queue::{OverflowPolicy, PushResult, Sample, SampleQueue, SharedSampleQueue};
pub use source::{sample_from_frame, CpalSource, RawFrame, SampleSource};
