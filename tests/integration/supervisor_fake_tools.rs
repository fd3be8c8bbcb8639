// Supervisor behaviour against scripted ffmpeg/ffprobe stand-ins

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use vidbatch::engine::core::{FileStamp, Filesystem, LocalFs, STATUS_OK};
use vidbatch::engine::{
    EngineError, Event, NullSink, Supervisor, SupervisorOptions, TranscodeParams,
};

use crate::common::fake_tools::*;
use crate::common::helpers::{assert_monotone, collect_ticks};

struct Fixture {
    tools: FakeTools,
    work: TempDir,
}

impl Fixture {
    fn new(tools: FakeTools) -> Self {
        Self {
            tools,
            work: TempDir::new().unwrap(),
        }
    }

    fn out_dir(&self) -> std::path::PathBuf {
        self.work.path().join("output")
    }

    fn supervisor(&self, overwrite: bool) -> (Supervisor, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let mut options = SupervisorOptions::new(self.out_dir());
        options.overwrite = overwrite;
        (
            Supervisor::new(self.tools.locator(), options, Arc::new(tx)),
            rx,
        )
    }

    fn input(&self, name: &str) -> std::path::PathBuf {
        touch(self.work.path(), name)
    }
}

#[test]
fn successful_run_reports_increasing_progress_then_completed() {
    let fx = Fixture::new(FakeTools::standard());
    let (supervisor, rx) = fx.supervisor(false);
    let input = fx.input("clip.mp4");

    let status = supervisor.run("job-1", &input, &TranscodeParams::default());
    assert_eq!(status, STATUS_OK);

    let ticks = collect_ticks(&rx);
    let pcts: Vec<Option<f64>> = ticks.iter().map(|t| t.percentage).collect();
    assert_eq!(
        pcts,
        vec![Some(25.0), Some(50.0), Some(75.0), Some(100.0), Some(100.0)]
    );
    assert!(ticks.iter().all(|t| t.id == "job-1"));
    assert!(ticks.last().unwrap().is_completed());
    assert_monotone(&ticks);

    let output = fx.out_dir().join("clip.mp4");
    assert_eq!(fs::read_to_string(output).unwrap(), "encoded");
}

#[test]
fn transcode_returns_output_path_and_creates_directory() {
    let fx = Fixture::new(FakeTools::standard());
    let (supervisor, _rx) = fx.supervisor(false);
    let input = fx.input("movie.mkv");
    assert!(!fx.out_dir().exists());

    let output = supervisor
        .transcode("job", &input, &TranscodeParams::default())
        .unwrap();
    assert_eq!(output, fx.out_dir().join("movie.mkv"));
    assert!(output.is_file());
}

#[test]
fn unknown_duration_gives_ticks_without_percentage() {
    let fx = Fixture::new(FakeTools::new().with_ffmpeg(FFMPEG_OK).with_ffprobe(FFPROBE_FAIL));
    let (supervisor, rx) = fx.supervisor(false);
    let input = fx.input("clip.mp4");

    assert_eq!(supervisor.run("j", &input, &TranscodeParams::default()), STATUS_OK);

    let ticks = collect_ticks(&rx);
    let (last, rest) = ticks.split_last().unwrap();
    assert_eq!(rest.len(), 4);
    assert!(rest.iter().all(|t| t.percentage.is_none()));
    assert_eq!(rest[1].elapsed, "00:00:05.000000");
    assert_eq!(last.percentage, Some(100.0));
    assert_eq!(last.elapsed, "completed");
}

#[test]
fn failed_encode_carries_diagnostics_and_removes_partial_output() {
    let fx = Fixture::new(FakeTools::standard());
    let (supervisor, rx) = fx.supervisor(false);
    let input = fx.input("broken.mp4");

    let err = supervisor
        .transcode("bad", &input, &TranscodeParams::default())
        .unwrap_err();
    match &err {
        EngineError::ProcessRuntime {
            status,
            diagnostics,
        } => {
            assert!(status.contains('1'), "{}", status);
            assert_eq!(diagnostics.last().unwrap(), "Conversion failed!");
            assert!(diagnostics.iter().any(|l| l.contains("broken frame")));
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }

    let text = err.to_string();
    assert!(text.contains("FFmpeg error:"), "{}", text);
    assert!(!fx.out_dir().join("broken.mp4").exists());

    let ticks = collect_ticks(&rx);
    assert!(ticks.iter().all(|t| !t.is_completed()));
}

#[test]
fn run_reports_failure_text() {
    let fx = Fixture::new(FakeTools::standard());
    let (supervisor, _rx) = fx.supervisor(false);
    let input = fx.input("broken.mp4");

    let status = supervisor.run("bad", &input, &TranscodeParams::default());
    assert_ne!(status, STATUS_OK);
    assert!(status.starts_with("ffmpeg failed with"), "{}", status);
}

#[test]
fn existing_output_is_kept_without_overwrite() {
    let fx = Fixture::new(FakeTools::standard());
    fs::create_dir_all(fx.out_dir()).unwrap();
    let existing = fx.out_dir().join("clip.mp4");
    fs::write(&existing, "precious").unwrap();

    let (supervisor, _rx) = fx.supervisor(false);
    let input = fx.input("clip.mp4");
    let err = supervisor
        .transcode("j", &input, &TranscodeParams::default())
        .unwrap_err();

    assert!(matches!(err, EngineError::ProcessRuntime { .. }));
    assert!(err.to_string().contains("already exists"));
    assert_eq!(fs::read_to_string(&existing).unwrap(), "precious");
}

#[test]
fn overwrite_replaces_existing_output() {
    let fx = Fixture::new(FakeTools::standard());
    fs::create_dir_all(fx.out_dir()).unwrap();
    let existing = fx.out_dir().join("clip.mp4");
    fs::write(&existing, "old").unwrap();

    let (supervisor, _rx) = fx.supervisor(true);
    let input = fx.input("clip.mp4");

    let command = supervisor
        .command_for(&input, &TranscodeParams::default())
        .unwrap();
    assert_eq!(command.args()[0], "-y");

    supervisor
        .transcode("j", &input, &TranscodeParams::default())
        .unwrap();
    assert_eq!(fs::read_to_string(&existing).unwrap(), "encoded");
}

#[test]
fn output_in_the_input_directory_is_refused() {
    let fx = Fixture::new(FakeTools::standard());
    let input = fx.input("clip.mp4");
    fs::write(&input, "source").unwrap();

    let mut options = SupervisorOptions::new(fx.work.path());
    options.overwrite = true;
    let supervisor = Supervisor::new(fx.tools.locator(), options, Arc::new(NullSink));

    let err = supervisor
        .transcode("same", &input, &TranscodeParams::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::CommandBuild { .. }), "{:?}", err);
    assert!(err.to_string().contains("its own input"), "{}", err);
    assert!(supervisor.command_for(&input, &TranscodeParams::default()).is_err());

    assert_ne!(supervisor.run("same", &input, &TranscodeParams::default()), STATUS_OK);
    assert_eq!(fs::read_to_string(&input).unwrap(), "source");
}

#[test]
fn relative_output_directory_matching_input_is_refused() {
    let fx = Fixture::new(FakeTools::standard());
    let input = fx.input("clip.mp4");
    fs::write(&input, "source").unwrap();

    let mut options = SupervisorOptions::new(fx.work.path().join("sub/.."));
    options.overwrite = true;
    let supervisor = Supervisor::new(fx.tools.locator(), options, Arc::new(NullSink));
    fs::create_dir_all(fx.work.path().join("sub")).unwrap();

    let err = supervisor
        .transcode("same", &input, &TranscodeParams::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::CommandBuild { .. }), "{:?}", err);
    assert_eq!(fs::read_to_string(&input).unwrap(), "source");
}

#[test]
fn early_failure_keeps_existing_output_even_with_overwrite() {
    let fx = Fixture::new(FakeTools::standard());
    fs::create_dir_all(fx.out_dir()).unwrap();
    let existing = fx.out_dir().join("noencoder.mp4");
    fs::write(&existing, "previous run").unwrap();

    let (supervisor, _rx) = fx.supervisor(true);
    let input = fx.input("noencoder.mp4");
    let err = supervisor
        .transcode("j", &input, &TranscodeParams::default())
        .unwrap_err();

    match &err {
        EngineError::ProcessRuntime { diagnostics, .. } => {
            assert_eq!(diagnostics.last().unwrap(), "Unknown encoder 'libfdk_aac'");
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
    assert_eq!(fs::read_to_string(&existing).unwrap(), "previous run");
}

#[test]
fn overwritten_output_is_removed_when_the_encode_fails() {
    let fx = Fixture::new(FakeTools::standard());
    fs::create_dir_all(fx.out_dir()).unwrap();
    let existing = fx.out_dir().join("broken.mp4");
    fs::write(&existing, "old").unwrap();

    let (supervisor, _rx) = fx.supervisor(true);
    let input = fx.input("broken.mp4");
    let result = supervisor.transcode("j", &input, &TranscodeParams::default());
    assert!(result.is_err());

    // ffmpeg -y had already truncated and rewritten it; only the partial was left
    assert!(!existing.exists());
}

#[test]
fn missing_encoder_is_a_command_build_error() {
    let fx = Fixture::new(FakeTools::new().with_ffprobe(FFPROBE_OK));
    let (supervisor, rx) = fx.supervisor(false);
    let input = fx.input("clip.mp4");

    let err = supervisor
        .transcode("j", &input, &TranscodeParams::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::CommandBuild { .. }), "{:?}", err);
    assert!(collect_ticks(&rx).is_empty());
}

struct ReadOnlyFs;

impl Filesystem for ReadOnlyFs {
    fn ensure_directory(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }

    fn stamp(&self, path: &Path) -> Option<FileStamp> {
        LocalFs.stamp(path)
    }

    fn remove_file(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }
}

#[test]
fn output_directory_failure_is_fatal() {
    let fx = Fixture::new(FakeTools::standard());
    let (supervisor, _rx) = fx.supervisor(false);
    let supervisor = supervisor.with_filesystem(Arc::new(ReadOnlyFs));
    let input = fx.input("clip.mp4");

    let err = supervisor
        .transcode("j", &input, &TranscodeParams::default())
        .unwrap_err();
    match err {
        EngineError::OutputDirectory { path, .. } => assert_eq!(path, fx.out_dir()),
        other => panic!("expected output directory error, got {:?}", other),
    }
}

#[test]
fn cancel_terminates_running_job() {
    let fx = Fixture::new(FakeTools::new().with_ffmpeg(FFMPEG_SLOW).with_ffprobe(FFPROBE_OK));
    let (supervisor, rx) = fx.supervisor(false);
    let input = fx.input("clip.mp4");

    let worker = {
        let supervisor = supervisor.clone();
        thread::spawn(move || supervisor.transcode("slow", &input, &TranscodeParams::default()))
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !supervisor.registry().is_running("slow") {
        assert!(Instant::now() < deadline, "job never started");
        thread::sleep(Duration::from_millis(10));
    }

    let started = Instant::now();
    assert!(supervisor.cancel("slow"));
    let result = worker.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    match result {
        Err(EngineError::Cancelled { id }) => assert_eq!(id, "slow"),
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert_eq!(supervisor.registry().running_count(), 0);
    assert!(collect_ticks(&rx).iter().all(|t| !t.is_completed()));
}

#[test]
fn gpu_detection_reads_buildconf() {
    let fx = Fixture::new(FakeTools::standard());
    assert!(!vidbatch::engine::hardware::gpu_supported(&fx.tools.locator()));

    let nvenc = FakeTools::new().with_ffmpeg(
        r#"
if [ "$1" = "-buildconf" ]; then
  echo "configuration: --enable-gpl --enable-nvenc --enable-cuda"
  exit 0
fi
exit 1
"#,
    );
    assert!(vidbatch::engine::hardware::gpu_supported(&nvenc.locator()));

    let broken = FakeTools::new().with_ffmpeg(FAIL);
    assert!(!vidbatch::engine::hardware::gpu_supported(&broken.locator()));
}
