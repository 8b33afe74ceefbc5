//! 集成测试模块
//! 测试工作线程、重复文件策略、历史记录与失败账本之间的完整下载流程

#[cfg(test)]
mod tests {
    use crate::core::{
        duplicate::{DuplicateDecision, DuplicatePrompt},
        events::{event_channel, DownloadEvent, EventReceiver},
        fetcher::{MediaMetadata, PlaylistEntry},
        history::HISTORY_FILE,
        failures::FAILURE_FILE,
        manager::{DownloadManager, ManagerSettings},
        models::{DownloadMode, DownloadTask, DuplicatePolicy, TaskRequest, TaskStatus},
        progress::PROCESSING_TEXT,
        test_support::{drain_events, events_until, Script, ScriptedFetcher},
    };
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::{tempdir, TempDir};

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        dir: TempDir,
        fetcher: Arc<ScriptedFetcher>,
        manager: DownloadManager,
        rx: EventReceiver,
    }

    impl Harness {
        fn new(workers: usize) -> Self {
            let dir = tempdir().unwrap();
            let fetcher = Arc::new(ScriptedFetcher::new());
            let (tx, rx) = event_channel();
            let manager = DownloadManager::new(settings(dir.path(), workers), fetcher.clone(), tx)
                .unwrap();
            Self {
                dir,
                fetcher,
                manager,
                rx,
            }
        }

        fn output_dir(&self) -> std::path::PathBuf {
            self.dir.path().join("downloads")
        }

        fn until(&mut self, done: impl FnMut(&DownloadEvent) -> bool) -> Vec<DownloadEvent> {
            events_until(&mut self.rx, WAIT, done)
        }

        fn failure_lines(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join(FAILURE_FILE))
                .map(|s| s.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }
    }

    fn settings(root: &Path, workers: usize) -> ManagerSettings {
        let mut settings = ManagerSettings::new(root.join("downloads"));
        settings.worker_count = workers;
        settings.dequeue_timeout = Duration::from_millis(20);
        settings.shutdown_timeout = Duration::from_millis(300);
        settings
    }

    fn audio(url: &str) -> TaskRequest {
        TaskRequest::new(url, DownloadMode::Audio)
    }

    fn for_task<'a>(events: &'a [DownloadEvent], id: &str) -> Vec<&'a DownloadEvent> {
        events.iter().filter(|e| e.task_id() == Some(id)).collect()
    }

    fn is_started(event: &DownloadEvent) -> bool {
        matches!(event, DownloadEvent::Started { .. })
    }

    #[test]
    fn test_single_task_lifecycle() {
        let mut h = Harness::new(1);
        h.fetcher.script("https://youtu.be/song", Script::titled("Song"));

        let id = h.manager.enqueue(audio("https://youtu.be/song")).unwrap();
        h.manager.start();
        let events = h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        let task_events = for_task(&events, &id);
        assert_eq!(task_events.len(), 4);
        match task_events[0] {
            DownloadEvent::Started {
                title,
                thumbnail_url,
                ..
            } => {
                assert_eq!(title, "Song");
                assert_eq!(thumbnail_url, "https://i.ytimg.com/Song.jpg");
            }
            other => panic!("expected started, got {:?}", other),
        }
        assert!(matches!(
            task_events[1],
            DownloadEvent::Progress { percent, status_text, .. }
                if *percent == 50.0 && status_text.starts_with("50.0%")
        ));
        assert!(matches!(
            task_events[2],
            DownloadEvent::Progress { percent, status_text, .. }
                if *percent == 100.0 && status_text == PROCESSING_TEXT
        ));
        let expected_path = h.output_dir().join("Song.mp3");
        assert!(matches!(
            task_events[3],
            DownloadEvent::Completed { output_path, .. }
                if Path::new(output_path) == expected_path
        ));

        let task = h.manager.task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress_percent, 100.0);
        assert!(expected_path.exists());

        let history = h.manager.get_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "Song");
        assert_eq!(history[0].status, TaskStatus::Completed);
        assert!(h.dir.path().join(HISTORY_FILE).exists());
        assert!(h.failure_lines().is_empty());
        h.manager.stop();
    }

    #[test]
    fn test_two_workers_start_two_of_three() {
        let mut h = Harness::new(2);
        let urls = ["https://youtu.be/1", "https://youtu.be/2", "https://youtu.be/3"];
        for (n, url) in urls.iter().enumerate() {
            h.fetcher
                .script(url, Script::titled(&format!("Track {}", n + 1)).held());
            h.manager.enqueue(audio(url)).unwrap();
        }
        h.manager.start();

        let mut started = 0;
        let events = h.until(|e| {
            if is_started(e) {
                started += 1;
            }
            started == 2
        });
        assert!(!events.iter().any(|e| e.is_terminal()));

        std::thread::sleep(Duration::from_millis(200));
        let idle = drain_events(&mut h.rx);
        assert!(!idle.iter().any(is_started));
        assert_eq!(h.manager.queue_size(), 1);

        let first_started: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Started { title, .. } => Some(title.clone()),
                _ => None,
            })
            .collect();
        let release = if first_started.contains(&"Track 1".to_string()) {
            urls[0]
        } else {
            urls[1]
        };
        h.fetcher.release(release);

        let events = h.until(is_started);
        let terminal_at = events.iter().position(|e| e.is_terminal()).unwrap();
        let started_at = events.iter().position(is_started).unwrap();
        assert!(terminal_at < started_at);
        assert!(matches!(
            &events[started_at],
            DownloadEvent::Started { title, .. } if title == "Track 3"
        ));

        h.fetcher.release_all();
        assert!(h.manager.wait_idle(WAIT));
        assert_eq!(h.manager.get_history().len(), 3);
        h.manager.stop();
    }

    #[test]
    fn test_720p_video_format_selector() {
        let mut h = Harness::new(1);
        h.fetcher.script("https://youtu.be/clip", Script::titled("Clip"));

        let request = TaskRequest::new("https://youtu.be/clip", DownloadMode::Video).quality("720p");
        h.manager.enqueue(request).unwrap();
        h.manager.start();
        h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        let downloads = h.fetcher.downloads();
        assert_eq!(downloads.len(), 1);
        let options = &downloads[0].options;
        assert_eq!(
            options.format,
            "bestvideo[height<=720]+bestaudio/best[height<=720]/best"
        );
        assert_eq!(options.merge_output_format.as_deref(), Some("mp4"));
        assert!(h.output_dir().join("Clip.mp4").exists());
        h.manager.stop();
    }

    #[test]
    fn test_skip_policy_with_existing_file() {
        let mut h = Harness::new(1);
        h.fetcher.script("https://youtu.be/dup", Script::titled("Dup"));
        std::fs::write(h.output_dir().join("Dup.mp3"), b"already here").unwrap();

        h.manager.set_duplicate_policy(DuplicatePolicy::Skip);
        let id = h.manager.enqueue(audio("https://youtu.be/dup")).unwrap();
        h.manager.start();
        let events = h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        let task_events = for_task(&events, &id);
        assert_eq!(task_events.len(), 1);
        assert!(matches!(
            task_events[0],
            DownloadEvent::Skipped { reason, .. } if reason == "File exists: Dup"
        ));
        assert_eq!(h.manager.task(&id).unwrap().status, TaskStatus::Skipped);
        assert!(h.fetcher.downloads().is_empty());
        assert!(h.manager.get_history().is_empty());
        assert_eq!(
            std::fs::read(h.output_dir().join("Dup.mp3")).unwrap(),
            b"already here"
        );
        h.manager.stop();
    }

    struct CountingPrompt {
        decision: DuplicateDecision,
        calls: AtomicUsize,
    }

    impl DuplicatePrompt for CountingPrompt {
        fn decide(&self, _task: &DownloadTask, _existing: &Path) -> DuplicateDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decision
        }
    }

    #[test]
    fn test_ask_policy_consults_prompt() {
        let mut h = Harness::new(1);
        h.fetcher.script("https://youtu.be/ask", Script::titled("Ask"));
        std::fs::write(h.output_dir().join("Ask.mp3"), b"old").unwrap();

        let prompt = Arc::new(CountingPrompt {
            decision: DuplicateDecision::Replace,
            calls: AtomicUsize::new(0),
        });
        h.manager
            .set_duplicate_prompt(Some(prompt.clone() as Arc<dyn DuplicatePrompt>));
        let id = h.manager.enqueue(audio("https://youtu.be/ask")).unwrap();
        h.manager.start();
        let events = h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert!(for_task(&events, &id)
            .iter()
            .any(|e| matches!(e, DownloadEvent::Completed { .. })));
        assert_eq!(std::fs::read(h.output_dir().join("Ask.mp3")).unwrap(), b"media");
        h.manager.stop();
    }

    #[test]
    fn test_stop_during_downloads() {
        let mut h = Harness::new(2);
        let urls = ["https://youtu.be/a", "https://youtu.be/b", "https://youtu.be/c"];
        let mut ids = Vec::new();
        for (url, title) in urls.iter().zip(["A", "B", "C"]) {
            h.fetcher.script(url, Script::titled(title).held());
            ids.push(h.manager.enqueue(audio(url)).unwrap());
        }
        h.manager.start();

        let mut started = 0;
        let events = h.until(|e| {
            if is_started(e) {
                started += 1;
            }
            started == 2
        });
        let in_flight: Vec<String> = events
            .iter()
            .filter(|e| is_started(e))
            .filter_map(|e| e.task_id().map(str::to_string))
            .collect();
        assert_eq!(in_flight.len(), 2);
        let queued_id = ids.iter().find(|id| !in_flight.contains(id)).unwrap().clone();
        let queued_url = h.manager.task(&queued_id).unwrap().url;

        // 一个任务在等待期内完成，另一个超时后被中止
        let finishing_url = h.manager.task(&in_flight[0]).unwrap().url;
        let fetcher = h.fetcher.clone();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            fetcher.release(&finishing_url);
        });

        let stop_started = Instant::now();
        h.manager.stop();
        assert!(stop_started.elapsed() < Duration::from_secs(4));
        releaser.join().unwrap();
        assert_eq!(h.manager.running_workers(), 0);

        let events = drain_events(&mut h.rx);
        assert!(for_task(&events, &in_flight[0])
            .iter()
            .any(|e| matches!(e, DownloadEvent::Completed { .. })));
        assert!(for_task(&events, &in_flight[1])
            .iter()
            .any(|e| matches!(e, DownloadEvent::Failed { .. })));
        assert!(for_task(&events, &queued_id).is_empty());
        assert!(h.manager.task(&queued_id).is_none());

        let lines = h.failure_lines();
        assert_eq!(lines.len(), 1);
        assert!(!lines.iter().any(|l| l.starts_with(&queued_url)));
    }

    #[test]
    fn test_failed_download_is_recorded_and_replayed() {
        let mut h = Harness::new(1);
        h.fetcher.script(
            "https://youtu.be/broken",
            Script::titled("Broken").failing_download("HTTP Error 403: Forbidden"),
        );

        let id = h.manager.enqueue(audio("https://youtu.be/broken")).unwrap();
        h.manager.start();
        let events = h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        assert!(for_task(&events, &id).iter().any(|e| matches!(
            e,
            DownloadEvent::Failed { title, error_message, .. }
                if title == "Broken" && error_message.contains("403")
        )));
        let task = h.manager.task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error_message.unwrap().contains("403"));

        let output_dir = h.output_dir();
        assert_eq!(
            h.failure_lines(),
            vec![format!(
                "https://youtu.be/broken|audio|best|{}|attempt=1",
                output_dir.to_string_lossy()
            )]
        );
        h.manager.stop();

        // 下次启动时重放一次
        let (tx, _rx) = event_channel();
        let manager =
            DownloadManager::new(settings(h.dir.path(), 1), h.fetcher.clone(), tx).unwrap();
        let tasks = manager.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "https://youtu.be/broken");
        assert_eq!(tasks[0].replay_attempt, 1);
        assert!(h.failure_lines().is_empty());
    }

    #[test]
    fn test_metadata_failure_fails_task() {
        let mut h = Harness::new(1);
        h.fetcher.script(
            "https://youtu.be/private",
            Script {
                metadata_error: Some("Private video".to_string()),
                ..Script::default()
            },
        );

        let id = h.manager.enqueue(audio("https://youtu.be/private")).unwrap();
        h.manager.start();
        let events = h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        let task_events = for_task(&events, &id);
        assert_eq!(task_events.len(), 1);
        assert!(matches!(
            task_events[0],
            DownloadEvent::Failed { title, error_message, .. }
                if title == "https://youtu.be/private" && error_message.contains("Private video")
        ));
        assert!(h.fetcher.downloads().is_empty());
        assert_eq!(h.failure_lines().len(), 1);
        h.manager.stop();
    }

    #[test]
    fn test_playlist_fans_out_into_children() {
        let mut h = Harness::new(1);
        h.fetcher.script(
            "https://www.youtube.com/playlist?list=PL1",
            Script {
                metadata: Some(MediaMetadata {
                    title: "Mix".to_string(),
                    thumbnail_url: String::new(),
                    entries: vec![
                        PlaylistEntry {
                            url: "https://youtu.be/e1".to_string(),
                            title: Some("E1".to_string()),
                        },
                        PlaylistEntry {
                            url: "https://youtu.be/e2".to_string(),
                            title: None,
                        },
                    ],
                }),
                ..Script::default()
            },
        );
        h.fetcher.script("https://youtu.be/e1", Script::titled("E1"));
        h.fetcher.script("https://youtu.be/e2", Script::titled("E2"));

        let request =
            TaskRequest::new("https://www.youtube.com/playlist?list=PL1", DownloadMode::Audio)
                .format("flac");
        let parent = h.manager.enqueue(request).unwrap();
        h.manager.start();
        let events = h.until(|e| matches!(e, DownloadEvent::QueueDrained));

        assert!(for_task(&events, &parent).is_empty());
        assert!(h.manager.task(&parent).is_none());

        let completed: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Completed { title, .. } => Some(title.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["E1", "E2"]);
        assert!(h.output_dir().join("E1.flac").exists());
        assert!(h.output_dir().join("E2.flac").exists());

        let children: Vec<DownloadTask> = h.manager.tasks();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|t| t.output_format == "flac"));
        h.manager.stop();
    }
}
