//! Watch loop state machine with scripted and real event sources.

mod common;

use common::{context, Call, FixedVolume, MockStore};
use scoutwatch::{
    BackupWriter, CancellationToken, DirectoryWatcher, EventSource, IngestContext,
    PersistenceOrchestrator, PollingEventSource, ResumeSignal, RetryPolicy, WatchEvent,
    WatchEventKind, WatchState,
};
use scoutwatch_db::{SqliteStore, StoreConnector, StoreSession};
use scoutwatch_logging::OperatorLog;
use scoutwatch_protocol::{FormType, HeaderLayout};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Hands out prepared batches, then cancels the loop.
struct ScriptedSource {
    dir: PathBuf,
    batches: VecDeque<Vec<WatchEvent>>,
    fail_wait: bool,
    renewable: bool,
}

impl ScriptedSource {
    fn new(dir: &Path, batches: Vec<Vec<PathBuf>>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            batches: batches
                .into_iter()
                .map(|paths| {
                    paths
                        .into_iter()
                        .map(|path| WatchEvent {
                            kind: WatchEventKind::Created,
                            path,
                        })
                        .collect()
                })
                .collect(),
            fail_wait: false,
            renewable: true,
        }
    }
}

impl EventSource for ScriptedSource {
    fn directory(&self) -> &Path {
        &self.dir
    }

    async fn next_batch(&mut self, cancel: &CancellationToken) -> io::Result<Vec<WatchEvent>> {
        if self.fail_wait {
            return Err(io::Error::new(io::ErrorKind::NotFound, "directory removed"));
        }
        match self.batches.pop_front() {
            Some(batch) => Ok(batch),
            None => {
                cancel.cancel();
                Ok(Vec::new())
            }
        }
    }

    fn renew(&mut self) -> bool {
        self.renewable
    }
}

struct TestEnv {
    temp: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn dir(&self) -> &Path {
        self.temp.path()
    }

    fn export(&self, name: &str, payload: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        fs::write(&path, payload).expect("Failed to write export");
        path
    }
}

#[tokio::test]
async fn test_batch_processed_in_delivery_order() {
    let env = TestEnv::new();
    let a = env.export("a", "1|1|Ana|300|1|5,1||");
    let b = env.export("b", "1|2|Ben|100|1|5,2||");
    let c = env.export("c", "1|3|Cy|200|1|5,3||");

    let store = MockStore::new();
    let mut ctx = context(&store);
    let mut watcher = DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![c, a, b]]));

    let report = watcher.run(&mut ctx).await;

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.batches, 1);
    assert_eq!(report.files_processed, 3);
    assert_eq!(store.stored_teams(), vec![200, 300, 100]);

    // Each form's session closes before the next one opens.
    let calls = store.calls();
    let opens: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == Call::Connect)
        .map(|(i, _)| i)
        .collect();
    for pair in opens.windows(2) {
        assert_eq!(calls[pair[1] - 1], Call::Close);
    }
}

#[tokio::test]
async fn test_failed_header_does_not_stop_next_event() {
    let env = TestEnv::new();
    let bad = env.export("bad", "1|1|Ana|118|1|5,1|6,2||");
    let good = env.export("good", "1|1|Ana|254|1|5,1||");

    let store = MockStore::new();
    store.fail_report_for_team(118);
    let mut ctx = context(&store);
    let mut watcher = DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![bad, good]]));

    let report = watcher.run(&mut ctx).await;

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.forms_failed, 1);
    assert_eq!(report.forms_stored, 1);
    assert_eq!(store.stored_teams(), vec![254]);
    // The failed form's two records were never attempted.
    assert_eq!(store.count(|c| matches!(c, Call::InsertRecord { .. })), 1);
}

#[tokio::test]
async fn test_unreadable_file_and_bad_form_are_scoped() {
    let env = TestEnv::new();
    let missing = env.dir().join("vanished");
    let mixed = env.export("mixed", "1|1|Ana|118|1|5,1||x|1|Ana|254|1||1|1|Ana|1678|1|5,3||");

    let store = MockStore::new();
    let mut ctx = context(&store);
    let mut watcher = DirectoryWatcher::new(ScriptedSource::new(
        env.dir(),
        vec![vec![missing], vec![mixed]],
    ));

    let report = watcher.run(&mut ctx).await;

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.batches, 2);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.decode_errors, 1);
    assert_eq!(store.stored_teams(), vec![118, 1678]);
    assert!(ctx.log.lines().any(|l| l.contains("vanished")));
}

#[tokio::test]
async fn test_store_outage_pauses_until_store_returns() {
    let env = TestEnv::new();
    let first = env.export("first", "1|1|Ana|118|1|5,1||1|1|Ana|254|1|5,2||");
    let second = env.export("second", "1|1|Ana|1678|1|5,3||");

    let store = MockStore::new();
    // The first form goes in, then the store drops out mid-file.
    store.fail_connect_after(1);
    let mut ctx = context(&store);
    let resume = ResumeSignal::new();
    let mut watcher = DirectoryWatcher::new(ScriptedSource::new(
        env.dir(),
        vec![vec![first, second]],
    ))
    .with_resume(resume.clone(), None);

    let operator = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        store.restore_connect();
        resume.request();
    };
    let (report, ()) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(watcher.run(&mut ctx), operator) },
    )
    .await
    .expect("paused loop never resumed");

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.halts, 1);
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.forms_stored, 3);
    // Resumed at the failed form; the first one is not inserted twice.
    assert_eq!(store.stored_teams(), vec![118, 254, 1678]);
    assert!(ctx.log.lines().any(|l| l.contains("Ingestion paused")));
    assert!(ctx.log.lines().any(|l| l.contains("ingestion resumed")));
}

#[tokio::test]
async fn test_paused_loop_retries_on_interval() {
    let env = TestEnv::new();
    let file = env.export("first", "1|1|Ana|118|1|5,1||");

    let store = MockStore::new();
    store.fail_connect();
    let mut ctx = context(&store);
    let mut watcher = DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![file]]))
        .with_resume(ResumeSignal::new(), Some(Duration::from_millis(20)));

    let operator = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        store.restore_connect();
    };
    let (report, ()) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(watcher.run(&mut ctx), operator) },
    )
    .await
    .expect("paused loop never resumed");

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.halts, 1);
    assert_eq!(store.stored_teams(), vec![118]);
    // 3 connect attempts per try, more than one try while paused
    assert!(store.count(|c| *c == Call::Connect) > 6);
}

#[tokio::test]
async fn test_cancel_while_paused_lists_unprocessed_files() {
    let env = TestEnv::new();
    let first = env.export("first", "1|1|Ana|118|1|5,1||");
    let second = env.export("second", "1|1|Ana|254|1|5,1||");

    let store = MockStore::new();
    store.fail_connect();
    let mut ctx = context(&store);
    let cancel = ctx.cancel.clone();
    let mut watcher = DirectoryWatcher::new(ScriptedSource::new(
        env.dir(),
        vec![vec![first, second]],
    ))
    .with_resume(ResumeSignal::new(), None);

    let operator = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    };
    let (report, ()) = tokio::join!(watcher.run(&mut ctx), operator);

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.halts, 1);
    assert!(store.stored_teams().is_empty());
    // Only the first file's form reached the store.
    assert_eq!(store.count(|c| *c == Call::Connect), 3);
    for name in ["first", "second"] {
        assert!(ctx
            .log
            .lines()
            .any(|l| l.starts_with("Not ingested") && l.contains(name)));
    }
}

#[tokio::test]
async fn test_non_text_file_warns_but_ingests() {
    let env = TestEnv::new();
    let file = env.export("odd", "1|1|Ana|118|1|5,1\u{1}||");

    let store = MockStore::new();
    let mut ctx = context(&store);
    let report = DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![file]]))
        .run(&mut ctx)
        .await;

    assert_eq!(report.forms_stored, 1);
    assert!(ctx.log.lines().any(|l| l.contains("odd is not a plain-text export")));
}

#[tokio::test]
async fn test_directory_loss_is_inaccessible() {
    let env = TestEnv::new();
    let file = env.export("one", "1|1|Ana|118|1||");

    let store = MockStore::new();
    let mut ctx = context(&store);
    let mut source = ScriptedSource::new(env.dir(), vec![vec![file]]);
    source.renewable = false;
    let mut watcher = DirectoryWatcher::new(source);

    let report = watcher.run(&mut ctx).await;
    assert_eq!(report.exit, WatchState::Inaccessible);
    assert_eq!(report.files_processed, 1);

    let mut source = ScriptedSource::new(env.dir(), vec![]);
    source.fail_wait = true;
    let report = DirectoryWatcher::new(source).run(&mut context(&store)).await;
    assert_eq!(report.exit, WatchState::Inaccessible);
}

#[tokio::test]
async fn test_cancelled_before_start_stops() {
    let env = TestEnv::new();
    let store = MockStore::new();
    let mut ctx = context(&store);
    ctx.cancel.cancel();

    let file = env.export("never", "1|1|Ana|118|1||");
    let report = DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![file]]))
        .run(&mut ctx)
        .await;

    assert_eq!(report.exit, WatchState::Stopped);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_each_file_backed_up_in_order() {
    let env = TestEnv::new();
    let usb = env.dir().join("usb");
    fs::create_dir(&usb).unwrap();
    let first = env.export("first", "1|1|Ana|118|1|5,1||");
    let second = env.export("second", "1|1|Ana|254|1|5,2||");

    let store = MockStore::new();
    let mut ctx = context(&store).with_backup(BackupWriter::new(
        FixedVolume(Some(usb.clone())),
        RetryPolicy::once(),
        0,
    ));
    DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![first, second]]))
        .run(&mut ctx)
        .await;

    assert_eq!(
        fs::read_to_string(usb.join("scoutingfile0")).unwrap(),
        "1|1|Ana|118|1|5,1||"
    );
    assert_eq!(
        fs::read_to_string(usb.join("scoutingfile1")).unwrap(),
        "1|1|Ana|254|1|5,2||"
    );
}

#[tokio::test]
async fn test_missing_backup_volume_does_not_block_ingestion() {
    let env = TestEnv::new();
    let file = env.export("first", "1|1|Ana|118|1|5,1||");

    let store = MockStore::new();
    let mut ctx =
        context(&store).with_backup(BackupWriter::new(FixedVolume(None), RetryPolicy::once(), 0));
    let report = DirectoryWatcher::new(ScriptedSource::new(env.dir(), vec![vec![file]]))
        .run(&mut ctx)
        .await;

    assert_eq!(report.forms_stored, 1);
    assert!(ctx.log.lines().any(|l| l.contains("Backup of first skipped")));
}

#[tokio::test]
async fn test_polling_source_into_sqlite() {
    let env = TestEnv::new();
    let drop_dir = env.dir().join("Desktop");
    fs::create_dir(&drop_dir).unwrap();
    fs::write(drop_dir.join("before_start"), "1|1|Ana|9999|1||").unwrap();

    let store = SqliteStore::open(env.dir().join("scouting.sqlite3"))
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let mut ctx: IngestContext<SqliteStore> = IngestContext::new(
        HeaderLayout::A,
        PersistenceOrchestrator::new(store.clone(), RetryPolicy::once(), 2),
        OperatorLog::new(16),
        cancel.clone(),
    );
    let source = PollingEventSource::new(&drop_dir, Duration::from_millis(10), false).unwrap();

    let writer_dir = drop_dir.clone();
    let stopper = cancel.clone();
    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        fs::write(writer_dir.join("tablet3"), "0|3|Ana|118|-1|5,2|8,fast||").unwrap();
        std::thread::sleep(Duration::from_millis(500));
        stopper.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        DirectoryWatcher::new(source).run(&mut ctx),
    )
    .await
    .expect("watch loop did not stop");
    producer.join().unwrap();

    assert_eq!(report.exit, WatchState::Stopped);
    assert_eq!(report.forms_stored, 1);

    let mut session = store.connect().await.unwrap();
    let headers = session
        .query_headers_by_team_and_type(118, FormType::Prescouting)
        .await
        .unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].match_num, -1);
    let baseline = session
        .query_headers_by_team_and_type(9999, FormType::Match)
        .await
        .unwrap();
    assert!(baseline.is_empty(), "files present at startup are not ingested");
}
