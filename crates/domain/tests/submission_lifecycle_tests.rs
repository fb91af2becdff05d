mod common;

use cadet_core::{
    models::{Category, Principal, SubmissionStatus, TaskStatus},
    CadetError,
};
use cadet_domain::{PenaltyOutcome, ReviewRequest, ScoringOutcome};
use common::{drill, essay, TestEngine};
use uuid::Uuid;

#[tokio::test]
async fn test_claim_submit_review_awards_points() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Cadet C").await;
    let task = t.publish(essay().with_capacity(0)).await;

    let claimed = t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    assert_eq!(claimed.status, SubmissionStatus::Taken);
    assert_eq!(t.task(task.id).await.current_participants, 1);

    let submitted = t
        .engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "my essay")
        .await
        .unwrap();
    assert_eq!(submitted.status, SubmissionStatus::Submitted);
    assert_eq!(submitted.submission_text, "my essay");
    assert!(submitted.submitted_at.is_some());

    let outcome = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(claimed.id, 7).with_feedback("good"))
        .await
        .unwrap();
    assert_eq!(outcome.submission.status, SubmissionStatus::Completed);
    assert_eq!(outcome.submission.reviewed_by, Some(t.reviewer.user_id));
    assert_eq!(outcome.submission.feedback.as_deref(), Some("good"));

    let ScoringOutcome::Applied(update) = outcome.scoring else {
        panic!("expected points to be applied, got {:?}", outcome.scoring);
    };
    assert_eq!(update.scores.study_score, 7);
    assert_eq!(update.total_score, 7);
    assert_eq!(update.history.points, 7);
    assert_eq!(update.history.awarded_by, Some(t.reviewer.user_id));
    assert!(update.history.description.contains("Write an essay"));

    assert_eq!(t.cadet_total(cadet_id).await, 7);
    assert_eq!(t.history_points(cadet_id).await, vec![(Category::Study, 7)]);
}

#[tokio::test]
async fn test_essay_scenario() {
    let t = TestEngine::new();
    let (c_id, c) = t.enroll("C").await;
    let (d_id, d) = t.enroll("D").await;
    let task = t.publish(essay()).await;

    let submission = t.engine.submissions.claim(&c, task.id, c_id).await.unwrap();

    let err = t.engine.submissions.claim(&d, task.id, d_id).await.unwrap_err();
    assert_eq!(
        err,
        CadetError::CapacityExceeded {
            task_id: task.id,
            max_participants: 1
        }
    );

    t.engine
        .submissions
        .submit(&c, task.id, c_id, "done")
        .await
        .unwrap();
    let outcome = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(submission.id, 8))
        .await
        .unwrap();
    assert!(matches!(outcome.scoring, ScoringOutcome::Applied(_)));

    let scores = t.engine.ledger.scores(&c, c_id).await.unwrap();
    assert_eq!(scores.study_score, 8);
    assert_eq!(t.history_points(c_id).await, vec![(Category::Study, 8)]);
    assert!(t.history_points(d_id).await.is_empty());
    assert_eq!(t.submission_count(task.id).await, 1);
}

#[tokio::test]
async fn test_second_claim_is_already_claimed() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Repeat").await;
    let task = t.publish(drill(3)).await;

    t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    let err = t
        .engine
        .submissions
        .claim(&cadet, task.id, cadet_id)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CadetError::AlreadyClaimed {
            task_id: task.id,
            cadet_id
        }
    );
    assert_eq!(t.task(task.id).await.current_participants, 1);
    assert_eq!(t.submission_count(task.id).await, 1);
}

#[tokio::test]
async fn test_already_claimed_wins_over_full_capacity() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Only one").await;
    let task = t.publish(essay()).await;

    t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    let err = t
        .engine
        .submissions
        .claim(&cadet, task.id, cadet_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CadetError::AlreadyClaimed { .. }));
}

#[tokio::test]
async fn test_claim_rejects_missing_and_closed_tasks() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Late").await;

    let err = t.engine.submissions.claim(&cadet, 999, cadet_id).await.unwrap_err();
    assert!(matches!(err, CadetError::NotFound { .. }));

    let mut closed = drill(0);
    closed.status = TaskStatus::Inactive;
    let closed = t.publish(closed).await;
    let err = t
        .engine
        .submissions
        .claim(&cadet, closed.id, cadet_id)
        .await
        .unwrap_err();
    assert_eq!(err, CadetError::Inactive { task_id: closed.id });

    let mut hidden = drill(0);
    hidden.is_active = false;
    let hidden = t.publish(hidden).await;
    let err = t
        .engine
        .submissions
        .claim(&cadet, hidden.id, cadet_id)
        .await
        .unwrap_err();
    assert_eq!(err, CadetError::Inactive { task_id: hidden.id });

    let ghost = Uuid::new_v4();
    let open = t.publish(drill(0)).await;
    let err = t
        .engine
        .submissions
        .claim(&t.admin, open.id, ghost)
        .await
        .unwrap_err();
    assert_eq!(err, CadetError::cadet_not_found(ghost));
}

#[tokio::test]
async fn test_abandon_applies_clamped_penalty() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Quitter").await;
    let task = t.publish(essay()).await;

    // 先给 3 分，罚 5 分后截断为 0
    t.engine
        .ledger
        .award(&t.admin, cadet_id, Category::Study, 3, "课堂表现")
        .await
        .unwrap();

    let submission = t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    let outcome = t
        .engine
        .submissions
        .abandon(&cadet, task.id, cadet_id)
        .await
        .unwrap();

    assert_eq!(outcome.submission_id, submission.id);
    let PenaltyOutcome::Applied(update) = outcome.penalty else {
        panic!("expected penalty, got {:?}", outcome.penalty);
    };
    assert_eq!(update.history.points, -5);
    assert_eq!(update.history.awarded_by, None);
    assert_eq!(update.applied_delta, -3);
    assert_eq!(update.scores.study_score, 0);

    assert_eq!(t.cadet_total(cadet_id).await, 0);
    assert_eq!(
        t.history_points(cadet_id).await,
        vec![(Category::Study, 3), (Category::Study, -5)]
    );
    assert_eq!(t.submission_count(task.id).await, 0);
    assert_eq!(t.task(task.id).await.current_participants, 0);
}

#[tokio::test]
async fn test_abandon_without_penalty_frees_slot() {
    let t = TestEngine::new();
    let (a_id, a) = t.enroll("A").await;
    let (b_id, b) = t.enroll("B").await;
    let task = t.publish(drill(1)).await;

    t.engine.submissions.claim(&a, task.id, a_id).await.unwrap();
    let outcome = t.engine.submissions.abandon(&a, task.id, a_id).await.unwrap();
    assert_eq!(outcome.penalty, PenaltyOutcome::NotApplicable);
    assert!(t.history_points(a_id).await.is_empty());

    // 空出的名额可以被其他人领取，放弃者也可以重新领取
    t.engine.submissions.claim(&b, task.id, b_id).await.unwrap();
    assert_eq!(t.task(task.id).await.current_participants, 1);
}

#[tokio::test]
async fn test_submit_and_abandon_require_taken_row() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Eager").await;
    let task = t.publish(drill(0)).await;
    let not_claimed = CadetError::NotClaimed {
        task_id: task.id,
        cadet_id,
    };

    let err = t
        .engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "early")
        .await
        .unwrap_err();
    assert_eq!(err, not_claimed);

    let err = t
        .engine
        .submissions
        .abandon(&cadet, task.id, cadet_id)
        .await
        .unwrap_err();
    assert_eq!(err, not_claimed);

    t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    t.engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "work")
        .await
        .unwrap();

    // 已提交的记录不能再次提交，也不能放弃
    let err = t
        .engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "again")
        .await
        .unwrap_err();
    assert_eq!(err, not_claimed);
    let err = t
        .engine
        .submissions
        .abandon(&cadet, task.id, cadet_id)
        .await
        .unwrap_err();
    assert_eq!(err, not_claimed);
}

#[tokio::test]
async fn test_review_requires_submitted_state() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Reviewed").await;
    let task = t.publish(drill(0)).await;
    let submission = t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();

    let err = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(submission.id, 4))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CadetError::InvalidState {
            submission_id: submission.id,
            status: SubmissionStatus::Taken
        }
    );

    t.engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "work")
        .await
        .unwrap();
    t.engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::rejected(submission.id))
        .await
        .unwrap();

    for request in [
        ReviewRequest::completed(submission.id, 4),
        ReviewRequest::rejected(submission.id),
    ] {
        let err = t
            .engine
            .submissions
            .review(&t.reviewer, &request)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CadetError::InvalidState {
                submission_id: submission.id,
                status: SubmissionStatus::Rejected
            }
        );
    }

    let err = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(4242, 1))
        .await
        .unwrap_err();
    assert_eq!(err, CadetError::submission_not_found(4242));

    assert!(t.history_points(cadet_id).await.is_empty());
    assert_eq!(t.cadet_total(cadet_id).await, 0);
}

#[tokio::test]
async fn test_completed_review_is_final() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Done").await;
    let task = t.publish(drill(0)).await;
    let submission = t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    t.engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "work")
        .await
        .unwrap();
    t.engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(submission.id, 4))
        .await
        .unwrap();

    let err = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(submission.id, 4))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CadetError::InvalidState {
            status: SubmissionStatus::Completed,
            ..
        }
    ));
    assert_eq!(t.history_points(cadet_id).await, vec![(Category::Discipline, 4)]);
    assert_eq!(t.cadet_total(cadet_id).await, 4);
}

#[tokio::test]
async fn test_zero_point_completion_and_rejection_skip_scoring() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Zero").await;
    let first = t.publish(drill(0)).await;
    let second = t.publish(essay()).await;

    for task_id in [first.id, second.id] {
        t.engine.submissions.claim(&cadet, task_id, cadet_id).await.unwrap();
        t.engine
            .submissions
            .submit(&cadet, task_id, cadet_id, "work")
            .await
            .unwrap();
    }
    let queue = t
        .engine
        .submissions
        .review_queue(&t.reviewer, None, None)
        .await
        .unwrap();
    assert_eq!(queue.len(), 2);

    let completed = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::completed(queue[0].id, 0))
        .await
        .unwrap();
    assert_eq!(completed.scoring, ScoringOutcome::Skipped);

    let rejected = t
        .engine
        .submissions
        .review(&t.reviewer, &ReviewRequest::rejected(queue[1].id))
        .await
        .unwrap();
    assert_eq!(rejected.scoring, ScoringOutcome::Skipped);
    assert_eq!(rejected.submission.status, SubmissionStatus::Rejected);

    assert!(t.history_points(cadet_id).await.is_empty());
    assert!(t
        .engine
        .submissions
        .review_queue(&t.reviewer, None, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_permission_checks() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Owner").await;
    let (_, intruder) = t.enroll("Intruder").await;
    let task = t.publish(drill(0)).await;

    let err = t
        .engine
        .submissions
        .claim(&intruder, task.id, cadet_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CadetError::Forbidden { .. }));
    assert_eq!(t.submission_count(task.id).await, 0);

    let submission = t.engine.submissions.claim(&cadet, task.id, cadet_id).await.unwrap();
    t.engine
        .submissions
        .submit(&cadet, task.id, cadet_id, "work")
        .await
        .unwrap();

    // 学员不能审核自己的提交
    let err = t
        .engine
        .submissions
        .review(&cadet, &ReviewRequest::completed(submission.id, 4))
        .await
        .unwrap_err();
    assert_eq!(err, CadetError::forbidden("manage_tasks"));

    let err = t
        .engine
        .submissions
        .review_queue(&cadet, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CadetError::Forbidden { .. }));

    let err = t
        .engine
        .submissions
        .submissions_for_cadet(&intruder, cadet_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CadetError::Forbidden { .. }));

    let own = t
        .engine
        .submissions
        .submissions_for_cadet(&cadet, cadet_id)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].status, SubmissionStatus::Submitted);
}

#[tokio::test]
async fn test_validation_happens_before_store_access() {
    let t = TestEngine::new();
    let (cadet_id, cadet) = t.enroll("Blank").await;

    // 任务不存在，但校验错误先于 NotFound 返回
    let err = t
        .engine
        .submissions
        .submit(&cadet, 999, cadet_id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, CadetError::Validation(_)));

    let mut request = ReviewRequest::rejected(999);
    request.points_awarded = 5;
    let err = t
        .engine
        .submissions
        .review(&Principal::cadet(cadet_id), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, CadetError::Validation(_)));
}
