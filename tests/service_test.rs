//! Task service: create, query, edit, delete, and permission rules.

use std::sync::Arc;

use chrono::Utc;
use taskclaim::error::Error;
use taskclaim::model::{NewTask, Status, TaskFilter, TaskPatch, UserId};
use taskclaim::service::TaskService;
use taskclaim::store::MemoryStore;

fn test_service() -> TaskService {
    TaskService::new(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn create_task_is_unassigned_with_creator() {
    let service = test_service();
    let creator = UserId::new();

    let task = service
        .create_task(
            creator,
            NewTask::new("Enhanced Satellite Data Analysis")
                .description("Develop a comprehensive analytical model"),
        )
        .await
        .unwrap();

    assert_eq!(task.status, Status::Unassigned);
    assert_eq!(task.owner, None);
    assert_eq!(task.creator, creator);
    assert_eq!(task.description, "Develop a comprehensive analytical model");
    assert_eq!(service.get_task(task.id).await.unwrap(), task);
}

#[tokio::test]
async fn create_task_rejects_blank_title() {
    let service = test_service();
    let err = service
        .create_task(UserId::new(), NewTask::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn list_filters_by_status_owner_and_date() {
    let service = test_service();
    let creator = UserId::new();
    let alice = UserId::new();

    service.create_task(creator, NewTask::new("a")).await.unwrap();
    let b = service.create_task(creator, NewTask::new("b")).await.unwrap();
    service.create_task(creator, NewTask::new("c")).await.unwrap();
    service.claim_task(alice, b.id).await.unwrap();

    let all = service.list_tasks(&TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let unassigned = service
        .list_tasks(&TaskFilter::default().status(Status::Unassigned))
        .await
        .unwrap();
    assert_eq!(unassigned.len(), 2);

    let owned = service
        .list_tasks(&TaskFilter::default().owner(alice))
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, b.id);

    let today = service
        .list_tasks(&TaskFilter::default().created_on(Utc::now().date_naive()))
        .await
        .unwrap();
    assert_eq!(today.len(), 3);

    let limited = service
        .list_tasks(&TaskFilter::default().limit(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn board_counts_by_status() {
    let service = test_service();
    let creator = UserId::new();
    let t = service.create_task(creator, NewTask::new("a")).await.unwrap();
    service.create_task(creator, NewTask::new("b")).await.unwrap();
    service.claim_task(UserId::new(), t.id).await.unwrap();

    let board = service.board().await.unwrap();
    assert_eq!(board.unassigned, 1);
    assert_eq!(board.in_progress, 1);
    assert_eq!(board.total(), 2);
}

#[tokio::test]
async fn creator_and_owner_may_edit_others_may_not() {
    let service = test_service();
    let creator = UserId::new();
    let owner = UserId::new();
    let task = service
        .create_task(creator, NewTask::new("draft"))
        .await
        .unwrap();

    let edited = service
        .update_task(
            creator,
            task.id,
            TaskPatch {
                title: Some("final".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.title, "final");

    let err = service
        .update_task(
            owner,
            task.id,
            TaskPatch {
                title: None,
                description: Some("notes".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    service.claim_task(owner, task.id).await.unwrap();
    let edited = service
        .update_task(
            owner,
            task.id,
            TaskPatch {
                title: None,
                description: Some("notes".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.description, "notes");
    assert_eq!(edited.owner, Some(owner), "edits never touch ownership");
    assert_eq!(edited.status, Status::InProgress);
}

#[tokio::test]
async fn only_creator_may_delete() {
    let service = test_service();
    let creator = UserId::new();
    let task = service
        .create_task(creator, NewTask::new("temp"))
        .await
        .unwrap();

    let err = service
        .delete_task(UserId::new(), task.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    service.delete_task(creator, task.id).await.unwrap();
    assert!(matches!(
        service.get_task(task.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn claim_through_service_then_conflict() {
    let service = test_service();
    let task = service
        .create_task(UserId::new(), NewTask::new("x"))
        .await
        .unwrap();
    let alice = UserId::new();

    service.claim_task(alice, task.id).await.unwrap();
    let err = service
        .claim_task(UserId::new(), task.id)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.status_code(), 409);
    assert_eq!(service.get_task(task.id).await.unwrap().owner, Some(alice));
}
