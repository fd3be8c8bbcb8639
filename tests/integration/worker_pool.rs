// Tests for worker pool and message handling

use std::sync::Arc;

use vidbatch::engine::{
    Locator, NullSink, Supervisor, SupervisorOptions, TranscodeJob, TranscodeParams,
    WorkerMessage, WorkerPool,
};

fn idle_pool(max_workers: usize) -> WorkerPool {
    let supervisor = Supervisor::new(
        Locator::new(),
        SupervisorOptions::new("output"),
        Arc::new(NullSink),
    );
    WorkerPool::new(supervisor, max_workers)
}

#[test]
fn test_worker_pool_initialization() {
    let pool = idle_pool(3);
    assert_eq!(pool.active_count(), 0, "Pool should start with 0 active workers");
    assert_eq!(pool.max_workers(), 3, "Pool should have max_workers set to 3");
    assert!(pool.can_spawn(), "Pool should allow spawning when active < max");
}

#[test]
fn test_worker_pool_dynamic_max_workers() {
    let pool = idle_pool(2);

    pool.set_max_workers(5);
    assert_eq!(pool.max_workers(), 5, "Max should be updated to 5");

    pool.set_max_workers(1);
    assert_eq!(pool.max_workers(), 1, "Max should be updated to 1");
    assert!(pool.can_spawn(), "Should be able to spawn 1 worker when max is 1");
}

#[test]
fn test_zero_workers_is_clamped_to_one() {
    let pool = idle_pool(0);
    assert_eq!(pool.max_workers(), 1);
    pool.set_max_workers(0);
    assert_eq!(pool.max_workers(), 1);
}

#[test]
fn test_empty_batch_returns_immediately() {
    let pool = idle_pool(2);
    let outcomes = pool.run_all(Vec::new(), |_| panic!("no messages expected"));
    assert!(outcomes.is_empty());
}

#[test]
fn test_worker_message_types() {
    let started = WorkerMessage::JobStarted {
        job_id: "a".to_string(),
    };
    let failed = WorkerMessage::JobFailed {
        job_id: "a".to_string(),
        error: "ffmpeg failed with exit status: 1".to_string(),
    };
    assert_ne!(started, failed);
    assert!(matches!(failed, WorkerMessage::JobFailed { ref error, .. } if error.contains("exit status")));
}

#[cfg(unix)]
mod with_fake_tools {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use tempfile::TempDir;
    use vidbatch::engine::Event;

    use crate::common::fake_tools::{FakeTools, touch};

    #[test]
    fn batch_runs_every_job_within_the_worker_limit() {
        let tools = FakeTools::standard();
        let work = TempDir::new().unwrap();
        let out_dir = work.path().join("out");

        let (tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(
            tools.locator(),
            SupervisorOptions::new(&out_dir),
            Arc::new(tx),
        );
        let pool = WorkerPool::new(supervisor, 2);

        let jobs: Vec<TranscodeJob> = ["a.mp4", "b.mkv", "c.mov"]
            .iter()
            .map(|name| TranscodeJob::new(touch(work.path(), name), TranscodeParams::default()))
            .collect();
        let ids: HashSet<String> = jobs.iter().map(|j| j.id.clone()).collect();

        let mut started = 0;
        let mut peak_active = 0;
        let outcomes = pool.run_all(jobs, |message| {
            if let WorkerMessage::JobStarted { .. } = message {
                started += 1;
            }
            peak_active = peak_active.max(pool.active_count());
        });

        assert_eq!(started, 3);
        assert!(peak_active <= 2, "peak {}", peak_active);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()), "{:?}", outcomes);
        assert_eq!(
            outcomes.iter().map(|(id, _)| id.clone()).collect::<HashSet<_>>(),
            ids
        );
        for name in ["a.mp4", "b.mkv", "c.mov"] {
            assert!(out_dir.join(name).is_file(), "missing {}", name);
        }

        // Every job finished with its own completed tick
        let completed: HashSet<String> = rx
            .try_iter()
            .filter_map(|e| match e {
                Event::Progress(t) if t.is_completed() => Some(t.id),
                _ => None,
            })
            .collect();
        assert_eq!(completed, ids);
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let tools = FakeTools::standard();
        let work = TempDir::new().unwrap();
        let supervisor = Supervisor::new(
            tools.locator(),
            SupervisorOptions::new(work.path().join("out")),
            Arc::new(NullSink),
        );
        let pool = WorkerPool::new(supervisor, 1);

        let good = TranscodeJob::new(touch(work.path(), "good.mp4"), TranscodeParams::default());
        let bad = TranscodeJob::new(touch(work.path(), "broken.mp4"), TranscodeParams::default());
        let bad_id = bad.id.clone();

        let outcomes = pool.run_all(vec![bad, good], |_| {});
        assert_eq!(outcomes.len(), 2);

        for (id, result) in &outcomes {
            if *id == bad_id {
                let error = result.as_ref().unwrap_err();
                assert!(error.contains("Conversion failed!"), "{}", error);
            } else {
                assert!(result.is_ok());
            }
        }
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn jobs_sharing_an_output_file_do_not_race() {
        let tools = FakeTools::standard();
        let work = TempDir::new().unwrap();
        let out_dir = work.path().join("out");
        for sub in ["first", "second"] {
            std::fs::create_dir_all(work.path().join(sub)).unwrap();
        }

        let supervisor = Supervisor::new(
            tools.locator(),
            SupervisorOptions::new(&out_dir),
            Arc::new(NullSink),
        );
        let pool = WorkerPool::new(supervisor, 2);

        let first = TranscodeJob::new(
            touch(&work.path().join("first"), "clip.mp4"),
            TranscodeParams::default(),
        );
        let second = TranscodeJob::new(
            touch(&work.path().join("second"), "clip.mp4"),
            TranscodeParams::default(),
        );
        let (first_id, second_id) = (first.id.clone(), second.id.clone());

        let mut started = Vec::new();
        let outcomes = pool.run_all(vec![first, second], |message| {
            if let WorkerMessage::JobStarted { job_id } = message {
                started.push(job_id.clone());
            }
        });

        assert_eq!(started, vec![first_id.clone()]);
        assert_eq!(outcomes.len(), 2);
        for (id, result) in &outcomes {
            if *id == first_id {
                assert_eq!(result.as_ref().unwrap(), &out_dir.join("clip.mp4"));
            } else {
                assert_eq!(*id, second_id);
                let error = result.as_ref().unwrap_err();
                assert!(error.contains("already claimed"), "{}", error);
                assert!(error.contains(&first_id), "{}", error);
            }
        }
        assert_eq!(
            std::fs::read_to_string(out_dir.join("clip.mp4")).unwrap(),
            "encoded"
        );
    }
}
