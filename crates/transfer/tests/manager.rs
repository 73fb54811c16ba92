mod support;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use content_transfer::{
    ChannelListener, ContentId, ContentRegistry, ManagerConfig, RequestId, SLOT_COUNT,
    TransferError, TransferEvent, TransferListener, TransferManager, TransferOutcome,
    TransferStatus,
};
use support::{
    Script, ScriptedTransport, Uploaded, assert_quiet, eventually, ids, next_terminal,
    terminals_for,
};
use tokio::sync::{Notify, mpsc};

fn config() -> ManagerConfig {
    ManagerConfig {
        tick_interval_ms: 20,
        ..ManagerConfig::default()
    }
}

fn start(
    transport: &Arc<ScriptedTransport>,
    config: ManagerConfig,
) -> (TransferManager, mpsc::UnboundedReceiver<TransferEvent>) {
    let (listener, rx) = ChannelListener::new();
    let manager = TransferManager::builder(transport.clone())
        .config(config)
        .default_listener(Arc::new(listener))
        .build()
        .unwrap();
    (manager, rx)
}

fn canceled(request_id: RequestId) -> TransferEvent {
    TransferEvent::Canceled {
        request_id,
        outcome: TransferOutcome::success(),
    }
}

fn status(manager: &TransferManager, id: RequestId) -> TransferStatus {
    manager.transfer_info(id).unwrap().status
}

#[tokio::test]
async fn at_most_three_run_and_queue_is_fifo() {
    let transport = ScriptedTransport::new();
    let names = ["a", "b", "c", "d", "e"];
    for name in names {
        transport.script(&format!("mem://{name}"), Script::Stall);
    }
    let (manager, mut rx) = start(&transport, config());

    let submitted: Vec<RequestId> = names
        .iter()
        .map(|name| manager.download_to_buffer(&format!("mem://{name}"), 0, 0).unwrap())
        .collect();
    assert_eq!(submitted, (1..=5).map(RequestId).collect::<Vec<_>>());

    transport.wait_fetched(3).await;
    let active: Vec<RequestId> = manager
        .active_transfer_list()
        .unwrap()
        .iter()
        .map(|info| info.request_id)
        .collect();
    assert_eq!(active, submitted[..SLOT_COUNT]);
    assert_eq!(status(&manager, submitted[3]), TransferStatus::Queued);
    assert_eq!(status(&manager, submitted[4]), TransferStatus::Queued);

    // Freeing a slot promotes R4, never R5.
    manager.cancel(submitted[1]).unwrap();
    assert_eq!(next_terminal(&mut rx).await, canceled(submitted[1]));
    transport.wait_fetched(4).await;
    assert_eq!(transport.fetched()[3], "mem://d");
    assert_eq!(status(&manager, submitted[3]), TransferStatus::Active);
    assert_eq!(status(&manager, submitted[4]), TransferStatus::Queued);

    manager.cancel(submitted[0]).unwrap();
    assert_eq!(next_terminal(&mut rx).await, canceled(submitted[0]));
    transport.wait_fetched(5).await;
    assert_eq!(transport.fetched()[4], "mem://e");

    assert_eq!(manager.active_transfer_list().unwrap().len(), SLOT_COUNT);
    assert!(transport.peak() <= SLOT_COUNT);
}

#[tokio::test]
async fn request_ids_are_unique_and_increasing() {
    let transport = ScriptedTransport::new();
    let (manager, mut rx) = start(&transport, config());

    let mut seen = Vec::new();
    for _ in 0..10 {
        seen.push(manager.download_to_buffer("mem://nothing", 0, 0).unwrap());
    }
    terminals_for(&mut rx, seen.len()).await;
    manager.remove_all().unwrap();
    seen.push(manager.download_to_buffer("mem://nothing", 0, 0).unwrap());

    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(seen.last(), Some(&RequestId(11)));
}

#[tokio::test]
async fn active_records_cannot_be_removed() {
    let transport = ScriptedTransport::new();
    transport.script("mem://slow", Script::Stall);
    let (manager, mut rx) = start(&transport, config());

    let id = manager.download_to_buffer("mem://slow", 0, 0).unwrap();
    transport.wait_fetched(1).await;

    assert!(matches!(
        manager.remove(id),
        Err(TransferError::InvalidState(_))
    ));
    assert_eq!(status(&manager, id), TransferStatus::Active);

    manager.cancel(id).unwrap();
    assert_eq!(status(&manager, id), TransferStatus::Canceled);
    assert!(matches!(
        manager.cancel(id),
        Err(TransferError::InvalidState(_))
    ));
    assert_eq!(next_terminal(&mut rx).await, canceled(id));

    manager.remove(id).unwrap();
    assert_eq!(manager.transfer_info(id), Err(TransferError::NotFound(id)));
}

#[tokio::test]
async fn remove_all_spares_active_cancel_all_stops_them() {
    let transport = ScriptedTransport::new();
    transport.script("mem://done", Script::Body(b"ok".to_vec()));
    transport.script("mem://slow", Script::Stall);
    let (manager, mut rx) = start(&transport, config());

    let done = manager.download_to_buffer("mem://done", 0, 0).unwrap();
    assert_eq!(next_terminal(&mut rx).await.request_id(), done);

    let slow: Vec<RequestId> = (0..4)
        .map(|_| manager.download_to_buffer("mem://slow", 0, 0).unwrap())
        .collect();
    assert_eq!(status(&manager, slow[3]), TransferStatus::Queued);

    manager.remove_all().unwrap();
    let left: Vec<RequestId> = manager
        .transfer_list()
        .unwrap()
        .iter()
        .map(|info| info.request_id)
        .collect();
    assert_eq!(left, slow[..3]);
    assert_quiet(&mut rx, Duration::from_millis(100)).await;

    manager.cancel_all().unwrap();
    let mut stopped = ids(&terminals_for(&mut rx, 3).await);
    stopped.sort();
    assert_eq!(stopped, slow[..3]);
    assert!(
        manager
            .transfer_list()
            .unwrap()
            .iter()
            .all(|info| info.status == TransferStatus::Canceled)
    );

    manager.remove_all().unwrap();
    assert!(manager.transfer_list().unwrap().is_empty());
    // The canceled queued record never reached the network.
    assert_eq!(transport.fetched().len(), 1 + SLOT_COUNT);
}

#[tokio::test]
async fn timeout_cancels_and_deletes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("big.bin");
    let transport = ScriptedTransport::new();
    transport.script(
        "mem://big",
        Script::Hold {
            first: vec![7u8; 1024],
            total: 1 << 20,
            release: Arc::new(Notify::new()),
        },
    );
    let (manager, mut rx) = start(&transport, config());

    let id = manager.download("mem://big", &dest, false, 1, 0).unwrap();
    eventually(|| dest.exists()).await;

    assert_eq!(
        next_terminal(&mut rx).await,
        TransferEvent::Canceled {
            request_id: id,
            outcome: TransferOutcome::failure(TransferError::Timeout),
        }
    );
    assert!(!dest.exists());

    let info = manager.transfer_info(id).unwrap();
    assert_eq!(info.status, TransferStatus::Canceled);
    assert_eq!(
        info.outcome.map(|o| o.result),
        Some(Err(TransferError::Timeout))
    );
    assert_quiet(&mut rx, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn default_timeout_applies_to_zero() {
    let transport = ScriptedTransport::new();
    transport.script("mem://slow", Script::Stall);
    let (manager, mut rx) = start(&transport, config());

    manager.set_default_timeout(1).unwrap();
    manager.set_progress_interval_by_percent(25).unwrap();
    let defaulted = manager.download_to_buffer("mem://slow", 0, 0).unwrap();
    let explicit = manager.download_to_buffer("mem://slow", 60, 50).unwrap();

    let info = manager.transfer_info(defaulted).unwrap();
    assert_eq!((info.timeout_secs, info.progress_interval_percent), (1, 25));
    let info = manager.transfer_info(explicit).unwrap();
    assert_eq!((info.timeout_secs, info.progress_interval_percent), (60, 50));

    assert_eq!(
        next_terminal(&mut rx).await,
        TransferEvent::Canceled {
            request_id: defaulted,
            outcome: TransferOutcome::failure(TransferError::Timeout),
        }
    );
    assert_eq!(status(&manager, explicit), TransferStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exactly_one_terminal_callback_under_concurrent_cancels() {
    let transport = ScriptedTransport::new();
    let count = 24;
    for i in 0..count {
        transport.script(&format!("mem://f{i}"), Script::Body(vec![i as u8; 64]));
    }
    let (manager, mut rx) = start(&transport, config());

    let submitted: Vec<RequestId> = (0..count)
        .map(|i| manager.download_to_buffer(&format!("mem://f{i}"), 0, 0).unwrap())
        .collect();

    let cancelers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let submitted = submitted.clone();
            tokio::task::spawn_blocking(move || {
                for id in submitted {
                    let _ = manager.cancel(id);
                }
            })
        })
        .collect();
    for canceler in cancelers {
        canceler.await.unwrap();
    }

    let events = terminals_for(&mut rx, count).await;
    let mut delivered = ids(&events);
    delivered.sort();
    assert_eq!(delivered, submitted);
    assert_quiet(&mut rx, Duration::from_millis(200)).await;

    for event in events {
        let expected = match event {
            TransferEvent::Canceled { .. } => TransferStatus::Canceled,
            _ => TransferStatus::Completed,
        };
        assert_eq!(status(&manager, event.request_id()), expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn canceled_file_downloads_leave_no_destination_behind() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let count = 24;
    for i in 0..count {
        transport.script(&format!("mem://f{i}"), Script::Body(vec![i as u8; 64]));
    }
    let (manager, mut rx) = start(&transport, config());

    let mut dests = HashMap::new();
    let submitted: Vec<RequestId> = (0..count)
        .map(|i| {
            let dest = dir.path().join(format!("f{i}.bin"));
            let id = manager
                .download(&format!("mem://f{i}"), &dest, false, 0, 0)
                .unwrap();
            dests.insert(id, (dest, vec![i as u8; 64]));
            id
        })
        .collect();

    let cancelers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let submitted = submitted.clone();
            tokio::task::spawn_blocking(move || {
                for id in submitted {
                    let _ = manager.cancel(id);
                }
            })
        })
        .collect();
    for canceler in cancelers {
        canceler.await.unwrap();
    }

    let events = terminals_for(&mut rx, count).await;
    let mut delivered = ids(&events);
    delivered.sort();
    assert_eq!(delivered, submitted);
    assert_quiet(&mut rx, Duration::from_millis(200)).await;

    for event in events {
        let (dest, body) = &dests[&event.request_id()];
        match event {
            TransferEvent::Canceled { request_id, .. } => {
                assert!(!dest.exists(), "{request_id} left {}", dest.display());
                assert_eq!(status(&manager, request_id), TransferStatus::Canceled);
            }
            TransferEvent::DownloadCompleted {
                request_id,
                outcome,
                ..
            } => {
                assert!(outcome.is_success(), "{request_id} failed: {outcome:?}");
                assert_eq!(&std::fs::read(dest).unwrap(), body);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn queued_download_keeps_file_created_while_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("keep.txt");
    let transport = ScriptedTransport::new();
    for name in ["a", "b", "c"] {
        transport.script(&format!("mem://{name}"), Script::Stall);
    }
    transport.script("mem://new", Script::Body(b"NEW".to_vec()));
    let (manager, mut rx) = start(&transport, config());

    let stalled: Vec<RequestId> = ["a", "b", "c"]
        .iter()
        .map(|name| manager.download_to_buffer(&format!("mem://{name}"), 0, 0).unwrap())
        .collect();
    let queued = manager.download("mem://new", &dest, false, 0, 0).unwrap();
    transport.wait_fetched(SLOT_COUNT).await;
    assert_eq!(status(&manager, queued), TransferStatus::Queued);

    std::fs::write(&dest, b"PRECIOUS").unwrap();
    manager.cancel(stalled[0]).unwrap();

    let events = terminals_for(&mut rx, 2).await;
    assert_eq!(events[0], canceled(stalled[0]));
    match &events[1] {
        TransferEvent::DownloadCompleted {
            request_id,
            content_id: None,
            outcome,
        } => {
            assert_eq!(*request_id, queued);
            assert!(matches!(
                outcome.result,
                Err(TransferError::FileAlreadyExists(_))
            ));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(std::fs::read(&dest).unwrap(), b"PRECIOUS");
    assert!(transport.fetched().contains(&"mem://new".to_string()));
}

/// Registry that takes its time, so a cancel can land after the file
/// has been written.
struct SlowRegistry {
    content: ContentId,
    delay: Duration,
    registered: Mutex<Vec<PathBuf>>,
    withdrawn: Mutex<Vec<ContentId>>,
}

impl ContentRegistry for SlowRegistry {
    fn register(&self, path: &Path) -> Result<ContentId, TransferError> {
        self.registered.lock().unwrap().push(path.to_path_buf());
        std::thread::sleep(self.delay);
        Ok(self.content)
    }

    fn unregister(&self, id: &ContentId) -> Result<(), TransferError> {
        self.withdrawn.lock().unwrap().push(*id);
        Ok(())
    }
}

#[tokio::test]
async fn cancel_during_registration_deletes_download() {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    std::fs::create_dir(&media).unwrap();

    let registry = Arc::new(SlowRegistry {
        content: ContentId::new_v4(),
        delay: Duration::from_millis(500),
        registered: Mutex::new(Vec::new()),
        withdrawn: Mutex::new(Vec::new()),
    });
    let transport = ScriptedTransport::new();
    transport.script("mem://song", Script::Body(b"la la".to_vec()));
    let (listener, mut rx) = ChannelListener::new();
    let manager = TransferManager::builder(transport.clone())
        .config(ManagerConfig {
            media_roots: vec![media.clone()],
            ..config()
        })
        .content_registry(registry.clone())
        .default_listener(Arc::new(listener))
        .build()
        .unwrap();

    let dest = media.join("song.mp3");
    let id = manager.download("mem://song", &dest, false, 0, 0).unwrap();
    eventually(|| !registry.registered.lock().unwrap().is_empty()).await;
    assert_eq!(std::fs::read(&dest).unwrap(), b"la la");

    manager.cancel(id).unwrap();
    assert_eq!(next_terminal(&mut rx).await, canceled(id));
    assert!(!dest.exists());
    assert_eq!(*registry.withdrawn.lock().unwrap(), vec![registry.content]);
    assert_eq!(status(&manager, id), TransferStatus::Canceled);
    assert_quiet(&mut rx, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn media_downloads_are_registered() {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    std::fs::create_dir(&media).unwrap();

    let content = ContentId::new_v4();
    let registered = Arc::new(Mutex::new(Vec::<PathBuf>::new()));
    let registry: Arc<dyn ContentRegistry> = {
        let registered = Arc::clone(&registered);
        Arc::new(move |path: &Path| -> Result<ContentId, TransferError> {
            registered.lock().unwrap().push(path.to_path_buf());
            Ok(content)
        })
    };

    let transport = ScriptedTransport::new();
    transport.script("mem://song", Script::Body(b"la la".to_vec()));
    let (listener, mut rx) = ChannelListener::new();
    let manager = TransferManager::builder(transport.clone())
        .config(ManagerConfig {
            allowed_roots: vec![dir.path().to_path_buf()],
            media_roots: vec![media.clone()],
            ..config()
        })
        .content_registry(registry)
        .default_listener(Arc::new(listener))
        .build()
        .unwrap();

    let dest = media.join("song.mp3");
    let id = manager.download("mem://song", &dest, false, 0, 0).unwrap();
    assert_eq!(
        next_terminal(&mut rx).await,
        TransferEvent::DownloadCompleted {
            request_id: id,
            content_id: Some(content),
            outcome: TransferOutcome::success(),
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), b"la la");
    assert_eq!(*registered.lock().unwrap(), vec![dest.clone()]);

    let info = manager.transfer_info(id).unwrap();
    assert_eq!(info.status, TransferStatus::Completed);
    assert_eq!((info.transferred_size, info.total_size), (5, 5));

    assert!(matches!(
        manager.download("mem://song", &dest, false, 0, 0),
        Err(TransferError::FileAlreadyExists(_))
    ));
    let elsewhere = tempfile::tempdir().unwrap();
    assert!(matches!(
        manager.download("mem://song", elsewhere.path().join("x"), false, 0, 0),
        Err(TransferError::IllegalAccess(_))
    ));
    manager.download("mem://song", &dest, true, 0, 0).unwrap();
}

#[tokio::test]
async fn upload_streams_file_to_base_uri() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("hello.txt");
    std::fs::write(&src, b"hello upload").unwrap();

    let transport = ScriptedTransport::new();
    let (manager, mut rx) = start(
        &transport,
        ManagerConfig {
            upload_base_uri: Some("mem://remote/".into()),
            chunk_size: 3,
            ..config()
        },
    );

    let (id, uri) = manager.upload(&src, "inbox/hello.txt", false).unwrap();
    assert_eq!(uri, "mem://remote/inbox/hello.txt");
    assert_eq!(
        next_terminal(&mut rx).await,
        TransferEvent::UploadCompleted {
            request_id: id,
            outcome: TransferOutcome::success(),
        }
    );
    assert_eq!(
        transport.uploads(),
        vec![Uploaded {
            uri,
            replace: false,
            body: b"hello upload".to_vec(),
        }]
    );

    let info = manager.transfer_info(id).unwrap();
    assert_eq!((info.transferred_size, info.total_size), (12, 12));
    assert!(matches!(
        manager.upload(&src, "../escape.txt", true),
        Err(TransferError::InvalidArg(_))
    ));
}

#[tokio::test]
async fn transport_failure_is_a_completed_error() {
    let transport = ScriptedTransport::new();
    let (manager, mut rx) = start(&transport, config());

    let id = manager.download_to_buffer("mem://missing", 0, 0).unwrap();
    let expected = TransferOutcome::failure(TransferError::ServerError {
        code: "404".into(),
        message: "scripted 404".into(),
    });
    assert_eq!(expected.server_error_code, "404");
    assert_eq!(
        next_terminal(&mut rx).await,
        TransferEvent::DownloadToBufferCompleted {
            request_id: id,
            buffer: Vec::new(),
            outcome: expected,
        }
    );
    assert_eq!(status(&manager, id), TransferStatus::Completed);
}

#[tokio::test]
async fn per_request_listener_gets_progress() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    let release = Arc::new(Notify::new());
    let transport = ScriptedTransport::new();
    transport.script(
        "mem://file",
        Script::Hold {
            first: vec![1u8; 10],
            total: 100,
            release: Arc::clone(&release),
        },
    );
    let (manager, mut default_rx) = start(&transport, config());

    let (listener, mut rx) = ChannelListener::new();
    let id = manager
        .download_with_listener("mem://file", &dest, false, 0, 0, Arc::new(listener))
        .unwrap();

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let TransferEvent::Progress { transferred: 10, .. } = event {
            assert_eq!(event.request_id(), id);
            break;
        }
    }

    // The destination is owned by the running request.
    assert!(matches!(
        manager.download("mem://file", &dest, true, 0, 0),
        Err(TransferError::FileAlreadyExists(_))
    ));

    release.notify_one();
    assert_eq!(
        next_terminal(&mut rx).await,
        TransferEvent::DownloadCompleted {
            request_id: id,
            content_id: None,
            outcome: TransferOutcome::success(),
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), vec![1u8; 10]);
    assert!(default_rx.try_recv().is_err());
}

struct RemoveWhenDone {
    manager: Mutex<Option<TransferManager>>,
    results: mpsc::UnboundedSender<Result<(), TransferError>>,
}

impl TransferListener for RemoveWhenDone {
    fn on_download_to_buffer_completed(
        &self,
        request_id: RequestId,
        _buffer: Vec<u8>,
        _outcome: &TransferOutcome,
    ) {
        let manager = self.manager.lock().unwrap().clone();
        if let Some(manager) = manager {
            let _ = self.results.send(manager.remove(request_id));
        }
    }
}

#[tokio::test]
async fn listener_may_call_back_into_manager() {
    let transport = ScriptedTransport::new();
    transport.script("mem://small", Script::Body(b"tiny".to_vec()));
    let (manager, _rx) = start(&transport, config());

    let (tx, mut results) = mpsc::unbounded_channel();
    let listener = Arc::new(RemoveWhenDone {
        manager: Mutex::new(Some(manager.clone())),
        results: tx,
    });
    manager
        .download_to_buffer_with_listener("mem://small", 0, 0, listener.clone())
        .unwrap();

    let removed = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(removed, Ok(()));
    assert!(manager.transfer_list().unwrap().is_empty());
    listener.manager.lock().unwrap().take();
}
