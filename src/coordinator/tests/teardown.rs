use crate::coordinator::test_helpers::*;
use crate::task::{Source, TaskOptions};
use crate::types::{Direction, Event};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_second_teardown_is_a_noop() {
    let (coordinator, fakes, _temp) = create_test_coordinator(TestSetup {
        backend: Script::Hold,
        ..Default::default()
    })
    .await;
    let mut rx = coordinator.subscribe();

    let id = coordinator
        .submit(
            Source::link("https://host.example/file.mkv"),
            TaskOptions::default(),
            origin(1),
        )
        .await
        .unwrap();
    let backend = fakes.backend.clone();
    eventually("dispatch", move || backend.held() == 1).await;

    let task = coordinator.task(id).await.unwrap();
    assert!(coordinator.on_download_error(&task, "boom", None).await);
    assert!(!coordinator.on_download_error(&task, "boom", None).await);
    assert!(!coordinator.on_upload_error(&task, "boom again").await);

    match wait_terminal(&mut rx, id).await {
        Event::Failed { error, .. } => assert_eq!(error, "boom"),
        other => panic!("expected failure, got {:?}", other),
    }
    // let the lifecycle observe the teardown
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fakes.messenger.notifications().len(), 1);
    assert_eq!(fakes.messenger.deleted.lock().unwrap().len(), 1);
    assert_eq!(fakes.bookkeeping.purges.load(Ordering::SeqCst), 1);
    let lane = coordinator
        .scheduling
        .admission
        .snapshot(Direction::Download)
        .await;
    assert!(lane.running.is_empty());
}

#[tokio::test]
async fn test_aggregate_status_refreshed_until_the_last_task_ends() {
    let (coordinator, fakes, _temp) = create_test_coordinator(TestSetup {
        backend: Script::Hold,
        ..Default::default()
    })
    .await;
    let mut rx = coordinator.subscribe();

    let first = coordinator
        .submit(
            Source::link("https://host.example/1.mkv"),
            TaskOptions::default(),
            origin(1),
        )
        .await
        .unwrap();
    let second = coordinator
        .submit(
            Source::link("https://host.example/2.mkv"),
            TaskOptions::default(),
            origin(2),
        )
        .await
        .unwrap();
    assert!(coordinator.scheduling.status_refresher.lock().await.is_some());

    let backend = fakes.backend.clone();
    eventually("dispatch", move || backend.held() == 2).await;

    fakes.backend.fail_held(first, "dead link");
    wait_terminal(&mut rx, first).await;
    // one task left: the chat's aggregate view is refreshed, not deleted
    assert_eq!(fakes.messenger.aggregate_updates.load(Ordering::SeqCst), 1);
    assert_eq!(fakes.messenger.aggregate_deletes.load(Ordering::SeqCst), 0);
    assert!(coordinator.scheduling.status_refresher.lock().await.is_some());

    fakes.backend.complete_held(second, "2.mkv", 10);
    wait_terminal(&mut rx, second).await;
    assert_eq!(fakes.messenger.aggregate_deletes.load(Ordering::SeqCst), 1);
    assert_eq!(fakes.bookkeeping.purges.load(Ordering::SeqCst), 1);
    assert!(coordinator.scheduling.status_refresher.lock().await.is_none());
}

#[tokio::test]
async fn test_failure_purges_upload_dir_and_thumbnail() {
    let (coordinator, _fakes, temp) = create_test_coordinator(TestSetup {
        backend: Script::Fail {
            message: "dead link".to_string(),
            hint: None,
        },
        ..Default::default()
    })
    .await;
    let mut rx = coordinator.subscribe();

    let up_dir = temp.path().join("staging");
    std::fs::create_dir_all(&up_dir).unwrap();
    let thumbnail = temp.path().join("thumb.jpg");
    std::fs::write(&thumbnail, b"jpeg").unwrap();

    let options = TaskOptions {
        up_dir: Some(up_dir.clone()),
        thumbnail: Some(thumbnail.clone()),
        ..TaskOptions::default()
    };
    let id = coordinator
        .submit(Source::link("https://host.example/file.mkv"), options, origin(1))
        .await
        .unwrap();
    wait_terminal(&mut rx, id).await;

    eventually("upload dir purge", || !up_dir.exists()).await;
    eventually("thumbnail purge", || !thumbnail.exists()).await;
}

#[tokio::test]
async fn test_teardown_before_admission_frees_the_download_slot() {
    let (coordinator, fakes, _temp) = create_test_coordinator(TestSetup {
        backend: Script::Hold,
        max_concurrent_downloads: 1,
        ..Default::default()
    })
    .await;
    let mut rx = coordinator.subscribe();

    let id = coordinator
        .submit(
            Source::link("magnet:?xt=urn:btih:abc"),
            TaskOptions::default(),
            origin(1),
        )
        .await
        .unwrap();
    // fail it before its lifecycle reaches the admission lane
    let task = coordinator.task(id).await.unwrap();
    assert!(coordinator.on_download_error(&task, "boom", None).await);
    wait_terminal(&mut rx, id).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let lane = coordinator
        .scheduling
        .admission
        .snapshot(Direction::Download)
        .await;
    assert!(lane.running.is_empty(), "slot held by {:?}", lane.running);
    assert!(lane.queued.is_empty());

    let next = coordinator
        .submit(
            Source::link("magnet:?xt=urn:btih:def"),
            TaskOptions::default(),
            origin(2),
        )
        .await
        .unwrap();
    let backend = fakes.backend.clone();
    eventually("next task dispatched", move || {
        backend.dispatched_ids().contains(&next)
    })
    .await;
}

#[tokio::test]
async fn test_escaping_folder_name_never_purges_other_tasks() {
    let (coordinator, _fakes, temp) = create_test_coordinator(TestSetup {
        backend: Script::Fail {
            message: "dead link".to_string(),
            hint: None,
        },
        ..Default::default()
    })
    .await;
    let mut rx = coordinator.subscribe();

    let downloads = temp.path().join("downloads");
    let neighbour = downloads.join("other").join("data.mkv");
    std::fs::create_dir_all(neighbour.parent().unwrap()).unwrap();
    std::fs::write(&neighbour, b"keep").unwrap();

    for (n, folder) in ["/../x", "/a/b"].iter().enumerate() {
        let options = TaskOptions {
            folder_name: Some(folder.to_string()),
            ..TaskOptions::default()
        };
        let id = coordinator
            .submit(
                Source::link("https://host.example/file.mkv"),
                options,
                origin(n as i64 + 1),
            )
            .await
            .unwrap();
        let task_dir = coordinator.task(id).await.map(|task| task.dir.clone());
        if let Some(dir) = task_dir {
            assert_eq!(dir, downloads.join(id.to_string()));
        }
        wait_terminal(&mut rx, id).await;
        let root = downloads.join(id.to_string());
        eventually("task directory purge", move || !root.exists()).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(downloads.exists());
    assert!(neighbour.exists());
}
