// Property-based tests for the scheduled job store state machine

use chrono::{DateTime, Duration, Utc};
use common::db::InMemoryScheduledJobStore;
use common::errors::StoreError;
use common::models::{JobResolution, JobStatus, NewScheduledJob, ScheduledJob};
use common::store::ScheduledJobStore;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

async fn enqueue_at(
    store: &InMemoryScheduledJobStore,
    user_id: Uuid,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ScheduledJob {
    store
        .enqueue(
            NewScheduledJob {
                user_id,
                content_id: Uuid::new_v4(),
                account_ids: vec![Uuid::new_v4()],
                scheduled_at,
            },
            now,
        )
        .await
        .unwrap()
}

/// *For any* number of due jobs and concurrent claimers, every due job is
/// claimed exactly once and no job is handed to two claimers.
#[test]
fn property_concurrent_claims_are_exclusive() {
    proptest!(ProptestConfig::with_cases(32), |(
        due_jobs in 1usize..60,
        future_jobs in 0usize..10,
        claimers in 2usize..8,
        limit in 1u32..20,
    )| {
        let rt = runtime();
        let (claimed, expected): (Vec<Uuid>, HashSet<Uuid>) = rt.block_on(async {
            let store = Arc::new(InMemoryScheduledJobStore::new());
            let user_id = Uuid::new_v4();
            let created = Utc::now();

            let mut expected = HashSet::new();
            for i in 0..due_jobs {
                let job = enqueue_at(&store, user_id, created + Duration::seconds(i as i64 + 1), created).await;
                expected.insert(job.id);
            }
            for _ in 0..future_jobs {
                enqueue_at(&store, user_id, created + Duration::days(1), created).await;
            }

            let now = created + Duration::seconds(due_jobs as i64 + 1);
            let tasks: Vec<_> = (0..claimers)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let mut mine = Vec::new();
                        loop {
                            let batch = store.claim_due(now, limit).await.unwrap();
                            if batch.is_empty() {
                                break;
                            }
                            assert!(batch.len() <= limit as usize);
                            assert!(batch.iter().all(|job| job.status == JobStatus::Publishing));
                            mine.extend(batch.into_iter().map(|job| job.id));
                        }
                        mine
                    })
                })
                .collect();

            let mut claimed = Vec::new();
            for task in tasks {
                claimed.extend(task.await.unwrap());
            }
            (claimed, expected)
        });

        let unique: HashSet<Uuid> = claimed.iter().copied().collect();
        prop_assert_eq!(unique.len(), claimed.len(), "a job was claimed twice");
        prop_assert_eq!(unique, expected);
    });
}

/// *For any* batch, claims come back oldest due first.
#[test]
fn property_claims_are_due_ordered() {
    proptest!(|(offsets in prop::collection::vec(1i64..10_000, 1..40), limit in 1u32..50)| {
        let rt = runtime();
        let claimed = rt.block_on(async {
            let store = InMemoryScheduledJobStore::new();
            let user_id = Uuid::new_v4();
            let created = Utc::now();
            for offset in &offsets {
                enqueue_at(&store, user_id, created + Duration::seconds(*offset), created).await;
            }
            store
                .claim_due(created + Duration::seconds(10_000), limit)
                .await
                .unwrap()
        });

        prop_assert_eq!(claimed.len(), offsets.len().min(limit as usize));
        prop_assert!(claimed.windows(2).all(|w| w[0].scheduled_at <= w[1].scheduled_at));
    });
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Claim,
    Publish,
    Fail,
    Cancel,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Claim),
        Just(Step::Publish),
        Just(Step::Fail),
        Just(Step::Cancel),
    ]
}

/// *For any* sequence of transitions, cancel and reschedule succeed only while
/// the job is still scheduled; otherwise they report a conflict and leave the
/// job untouched.
#[test]
fn property_cancel_and_reschedule_only_before_claim() {
    proptest!(|(steps in prop::collection::vec(step(), 0..4), hours in 1i64..48)| {
        let rt = runtime();
        rt.block_on(async {
            let store = InMemoryScheduledJobStore::new();
            let user_id = Uuid::new_v4();
            let created = Utc::now();
            let job = enqueue_at(&store, user_id, created + Duration::seconds(1), created).await;
            let now = created + Duration::seconds(5);

            for step in &steps {
                // Outcomes of driving steps are irrelevant; only the reached status matters
                let _ = match step {
                    Step::Claim => store.claim_due(now, 10).await.map(|_| ()),
                    Step::Publish => store.mark_result(job.id, JobResolution::Published, now).await.map(|_| ()),
                    Step::Fail => store
                        .mark_result(job.id, JobResolution::Failed { error: "boom".to_string() }, now)
                        .await
                        .map(|_| ()),
                    Step::Cancel => store.cancel(user_id, job.id, now).await.map(|_| ()),
                };
            }

            let before = store.snapshot(job.id).await.unwrap();
            let new_time = now + Duration::hours(hours);
            let rescheduled = store.reschedule(user_id, job.id, new_time, now).await;

            if before.status == JobStatus::Scheduled {
                let moved = rescheduled.unwrap();
                assert_eq!(moved.scheduled_at, new_time);
                assert_eq!(moved.status, JobStatus::Scheduled);
                assert!(store.cancel(user_id, job.id, now).await.is_ok());
            } else {
                assert!(matches!(
                    rescheduled,
                    Err(StoreError::Conflict { status, .. }) if status == before.status
                ));
                assert!(matches!(
                    store.cancel(user_id, job.id, now).await,
                    Err(StoreError::Conflict { .. })
                ));
                assert_eq!(store.snapshot(job.id).await.unwrap(), before);
            }
        });
    });
}

/// *For any* past or present time, reschedule is rejected and the job keeps
/// its original due time.
#[test]
fn property_reschedule_to_past_is_rejected() {
    proptest!(|(seconds_back in 0i64..1_000_000)| {
        let rt = runtime();
        rt.block_on(async {
            let store = InMemoryScheduledJobStore::new();
            let user_id = Uuid::new_v4();
            let now = Utc::now();
            let job = enqueue_at(&store, user_id, now + Duration::hours(1), now).await;

            let result = store
                .reschedule(user_id, job.id, now - Duration::seconds(seconds_back), now)
                .await;

            assert!(matches!(result, Err(StoreError::InvalidSchedule(_))));
            assert_eq!(store.snapshot(job.id).await.unwrap().scheduled_at, job.scheduled_at);
        });
    });
}

/// Another user's job is indistinguishable from a missing one.
#[tokio::test]
async fn test_foreign_jobs_are_not_found() {
    let store = InMemoryScheduledJobStore::new();
    let owner = Uuid::new_v4();
    let now = Utc::now();
    let job = enqueue_at(&store, owner, now + Duration::hours(1), now).await;
    let stranger = Uuid::new_v4();

    assert!(matches!(
        store.get(stranger, job.id).await,
        Err(StoreError::NotFound(id)) if id == job.id
    ));
    assert!(matches!(
        store.cancel(stranger, job.id, now).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.reschedule(stranger, job.id, now + Duration::hours(2), now).await,
        Err(StoreError::NotFound(_))
    ));
}
