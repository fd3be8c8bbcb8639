mod ffmpeg_cmd;
mod filters;
mod progress;
mod scan;
mod supervisor;
mod types;

pub use ffmpeg_cmd::{
    TranscodeCommand, build_transcode_cmd, resolve_audio_codec, resolve_video_codec,
    transcode_args,
};
pub use filters::{
    WatermarkStyle, escape_text, filter_chain, placement_coordinates, rotation_filter,
    scale_filter, watermark_filter,
};
pub use progress::{ProgressTracker, parse_line, percentage, to_seconds};
pub use scan::{
    VIDEO_EXTENSIONS, collect_inputs, is_same_file, is_video_file, output_path_for,
    scan_streaming,
};
pub use supervisor::{
    FileStamp, Filesystem, LocalFs, STATUS_OK, Supervisor, SupervisorOptions, scan_diagnostics,
};
pub use types::{
    AudioCodec, JobState, Rotation, Target, TranscodeParams, UNCHANGED, VideoCodec,
    WatermarkPlacement,
};
