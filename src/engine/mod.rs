// Transcode and probe engine - independent of any front end

pub mod core;
pub mod error;
pub mod events;
pub mod hardware;
pub mod probe;
pub mod thumbnail;
pub mod tools;
pub mod worker;

pub use self::core::{
    AudioCodec, Rotation, Supervisor, SupervisorOptions, Target, TranscodeParams, VideoCodec,
    WatermarkPlacement, WatermarkStyle,
};
pub use error::{EngineError, EngineResult};
pub use events::{Event, EventSink, JsonLinesSink, NullSink, ProgressTick};
pub use probe::{VideoInfo, probe, probe_many};
pub use tools::{Locator, Tool, ToolPath, locate};
pub use worker::{ProcessRegistry, TranscodeJob, WorkerMessage, WorkerPool};
