mod common;

use common::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lms::config::Config;
use lms::db;
use lms::domain::{BorrowingStatus, DomainError, PushMessage, PushReport, PushSender, Role};
use lms::infrastructure::AppState;
use lms::models::copy;
use lms::services::{ApproveRequest, BorrowRequest, BorrowingFilter, IssueRequest, RejectRequest};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::Notify;

fn request_for(book_id: i32) -> BorrowRequest {
    BorrowRequest {
        book_id,
        copy_id: None,
        due_date: None,
        notes: None,
    }
}

fn issue(copy_id: i32, borrower_id: i32, due: &str) -> IssueRequest {
    IssueRequest {
        copy_id,
        borrower_id,
        due_date: Some(due.to_string()),
        notes: None,
    }
}

#[tokio::test]
async fn test_request_then_approve_puts_copy_on_loan() {
    let app = setup_test_app().await;
    let db = app.db();
    let borrower = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let requested = svc
        .request(&borrower, request_for(book_id), at(2026, 3, 1))
        .await
        .expect("request should succeed");
    assert_eq!(requested.status, "REQUESTED");
    assert_eq!(requested.book_copy_id, copies[0]);
    assert_eq!(copy_status(db, copies[0]).await, "Available");
    assert_eq!(total_borrows(db, book_id).await, 0);

    let approved = svc
        .approve(&librarian, requested.id, ApproveRequest::default(), at(2026, 3, 2))
        .await
        .expect("approve should succeed");
    assert_eq!(approved.status, "ACTIVE");
    assert!(approved.issue_date.is_some());
    assert_eq!(approved.due_date.as_deref(), Some("2026-03-16"));
    assert_eq!(copy_status(db, copies[0]).await, "On Loan");
    assert_eq!(total_borrows(db, book_id).await, 1);

    assert_eq!(
        notification_kinds(db, requested.id).await,
        vec!["BORROW_REQUESTED", "BORROW_APPROVED"]
    );
}

#[tokio::test]
async fn test_approve_keeps_requested_due_date() {
    let app = setup_test_app().await;
    let db = app.db();
    let borrower = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, _) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let mut input = request_for(book_id);
    input.due_date = Some("2026-03-20".to_string());
    let requested = svc.request(&borrower, input, at(2026, 3, 1)).await.unwrap();

    let approved = svc
        .approve(&librarian, requested.id, ApproveRequest::default(), at(2026, 3, 2))
        .await
        .unwrap();
    assert_eq!(approved.due_date.as_deref(), Some("2026-03-20"));
}

#[tokio::test]
async fn test_late_return_is_fined_per_day() {
    let app = setup_test_app().await;
    let db = app.db();
    let borrower = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let loan = svc
        .issue(&librarian, issue(copies[0], borrower.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap();
    assert_eq!(loan.status, "ACTIVE");
    assert_eq!(total_borrows(db, book_id).await, 1);

    let returned = svc
        .return_borrowing(&librarian, loan.id, at(2026, 3, 13))
        .await
        .unwrap();
    assert_eq!(returned.status, "RETURNED_LATE");
    assert_eq!(returned.fine_amount, 1.5);
    assert!(returned.return_date.is_some());
    assert_eq!(copy_status(db, copies[0]).await, "Available");
    assert_eq!(total_borrows(db, book_id).await, 1);
    assert_eq!(
        notification_kinds(db, loan.id).await,
        vec!["BOOK_ISSUED", "FINE_ISSUED"]
    );
}

#[tokio::test]
async fn test_return_on_due_date_is_not_late() {
    let app = setup_test_app().await;
    let db = app.db();
    let borrower = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (_, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let loan = svc
        .issue(&librarian, issue(copies[0], borrower.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap();
    let returned = svc
        .return_borrowing(&librarian, loan.id, at(2026, 3, 10))
        .await
        .unwrap();

    assert_eq!(returned.status, "RETURNED");
    assert_eq!(returned.fine_amount, 0.0);
    assert_eq!(
        notification_kinds(db, loan.id).await,
        vec!["BOOK_ISSUED", "RETURN_CONFIRMED"]
    );
}

#[tokio::test]
async fn test_second_borrower_gets_no_copies_available() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let bob = create_user(db, "bob", Role::Borrower).await;
    let (book_id, _) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    svc.request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();

    // The only copy is held by alice's pending request
    let err = svc
        .request(&bob, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DomainError::Conflict(ref m) if m == "No copies available"),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_duplicate_open_request_is_refused() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let (book_id, _) = create_book_with_copies(db, "Dune", 2).await;
    let svc = &app.state.borrowings;

    svc.request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();
    let err = svc
        .request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)), "{err:?}");
}

#[tokio::test]
async fn test_request_validates_due_date() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let (book_id, _) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    for due in ["2026-03-01", "2026-02-20", "01/04/2026"] {
        let mut input = request_for(book_id);
        input.due_date = Some(due.to_string());
        let err = svc.request(&alice, input, at(2026, 3, 1)).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "{due}: {err:?}");
    }

    let err = svc
        .request(&alice, request_for(9999), at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_only_owner_cancels_and_only_while_requested() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let bob = create_user(db, "bob", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let requested = svc
        .request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();

    let err = svc.cancel(&bob, requested.id, at(2026, 3, 1)).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
    let err = svc
        .cancel(&librarian, requested.id, at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let cancelled = svc.cancel(&alice, requested.id, at(2026, 3, 1)).await.unwrap();
    assert_eq!(cancelled.status, "CANCELLED");
    assert_eq!(copy_status(db, copies[0]).await, "Available");

    let err = svc.cancel(&alice, requested.id, at(2026, 3, 1)).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));

    // An ACTIVE loan cannot be cancelled either
    let again = svc
        .request(&alice, request_for(book_id), at(2026, 3, 2))
        .await
        .unwrap();
    svc.approve(&librarian, again.id, ApproveRequest::default(), at(2026, 3, 2))
        .await
        .unwrap();
    let err = svc.cancel(&alice, again.id, at(2026, 3, 3)).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_approve_rejects_when_copy_was_taken() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let requested = svc
        .request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();

    // Another approval won the copy between the request and this approval
    let taken = copy::Entity::find_by_id(copies[0]).one(db).await.unwrap().unwrap();
    let mut taken: copy::ActiveModel = taken.into();
    taken.status = Set("On Loan".to_string());
    taken.update(db).await.unwrap();

    let outcome = svc
        .approve(&librarian, requested.id, ApproveRequest::default(), at(2026, 3, 2))
        .await
        .expect("approval resolves instead of failing");
    assert_eq!(outcome.status, "REJECTED");
    assert!(outcome.rejection_reason.is_some());
    assert_eq!(total_borrows(db, book_id).await, 0);
    assert_eq!(
        notification_kinds(db, requested.id).await,
        vec!["BORROW_REQUESTED", "BORROW_REJECTED"]
    );
}

#[tokio::test]
async fn test_second_approval_of_same_request_fails() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, _) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let requested = svc
        .request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();
    svc.approve(&librarian, requested.id, ApproveRequest::default(), at(2026, 3, 2))
        .await
        .unwrap();

    let err = svc
        .approve(&librarian, requested.id, ApproveRequest::default(), at(2026, 3, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));
    assert_eq!(total_borrows(db, book_id).await, 1);
}

#[tokio::test]
async fn test_reject_records_reason() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let requested = svc
        .request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();

    let err = svc
        .reject(&alice, requested.id, RejectRequest::default(), at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let rejected = svc
        .reject(
            &librarian,
            requested.id,
            RejectRequest {
                reason: Some("Reference copy".to_string()),
            },
            at(2026, 3, 1),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, "REJECTED");
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Reference copy"));
    assert_eq!(copy_status(db, copies[0]).await, "Available");
}

#[tokio::test]
async fn test_mark_lost_charges_flat_fee() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (_, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let loan = svc
        .issue(&librarian, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap();
    let lost = svc.mark_lost(&librarian, loan.id, at(2026, 3, 5)).await.unwrap();

    assert_eq!(lost.status, "LOST_BY_BORROWER");
    assert_eq!(lost.fine_amount, 25.0);
    assert_eq!(copy_status(db, copies[0]).await, "Lost");
    assert_eq!(
        notification_kinds(db, loan.id).await,
        vec!["BOOK_ISSUED", "FINE_ISSUED"]
    );
}

#[tokio::test]
async fn test_terminal_borrowings_never_transition() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (_, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let loan = svc
        .issue(&librarian, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap();
    svc.return_borrowing(&librarian, loan.id, at(2026, 3, 2))
        .await
        .unwrap();

    let now = at(2026, 3, 3);
    let attempts = vec![
        svc.approve(&librarian, loan.id, ApproveRequest::default(), now)
            .await
            .unwrap_err(),
        svc.reject(&librarian, loan.id, RejectRequest::default(), now)
            .await
            .unwrap_err(),
        svc.return_borrowing(&librarian, loan.id, now).await.unwrap_err(),
        svc.mark_lost(&librarian, loan.id, now).await.unwrap_err(),
        svc.cancel(&alice, loan.id, now).await.unwrap_err(),
    ];
    for err in attempts {
        assert!(matches!(err, DomainError::InvalidTransition { .. }), "{err:?}");
    }
    assert_eq!(copy_status(db, copies[0]).await, "Available");
}

#[tokio::test]
async fn test_issue_requires_free_copy_and_staff() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let bob = create_user(db, "bob", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (_, copies) = create_book_with_copies(db, "Dune", 1).await;
    let svc = &app.state.borrowings;

    let err = svc
        .issue(&alice, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    svc.issue(&librarian, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap();
    let err = svc
        .issue(&librarian, issue(copies[0], bob.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)), "{err:?}");
}

#[tokio::test]
async fn test_borrowers_only_list_their_own_borrowings() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let bob = create_user(db, "bob", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, _) = create_book_with_copies(db, "Dune", 2).await;
    let svc = &app.state.borrowings;

    let mine = svc
        .request(&alice, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();
    let theirs = svc
        .request(&bob, request_for(book_id), at(2026, 3, 1))
        .await
        .unwrap();

    let listed = svc
        .list(
            &alice,
            BorrowingFilter {
                user_id: Some(bob.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].borrowing.id, mine.id);
    assert_eq!(listed[0].book_title.as_deref(), Some("Dune"));

    let all = svc.list(&librarian, BorrowingFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let requested = svc
        .list(
            &librarian,
            BorrowingFilter {
                status: Some("requested".to_string()),
                book_id: Some(book_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(requested.len(), 2);

    let err = svc.get(&alice, theirs.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
    assert_eq!(
        svc.get(&librarian, theirs.id).await.unwrap().borrowing.status,
        BorrowingStatus::Requested.as_str()
    );
}

#[tokio::test]
async fn test_push_goes_to_registered_devices_and_failures_are_swallowed() {
    let app = setup_with_sender(RecordingPushSender {
        fail: true,
        ..Default::default()
    })
    .await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    register_device(db, alice.id, "ExponentPushToken[alice-phone]").await;
    let (_, copies) = create_book_with_copies(db, "Dune", 1).await;

    let loan = app
        .state
        .borrowings
        .issue(&librarian, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .expect("push failure must not fail the transition");
    assert_eq!(loan.status, "ACTIVE");

    app.state.notifications.flush().await;
    let sent = app.push.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tokens, vec!["ExponentPushToken[alice-phone]"]);
    assert_eq!(sent[0].title, "Book Issued");
    assert_eq!(sent[0].data["borrowId"], loan.id);
}

#[tokio::test]
async fn test_stats_count_circulation() {
    let app = setup_test_app().await;
    let db = app.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(db, "Dune", 2).await;
    let svc = &app.state.borrowings;

    let loan = svc
        .issue(&librarian, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1))
        .await
        .unwrap();
    svc.return_borrowing(&librarian, loan.id, at(2026, 3, 14))
        .await
        .unwrap();
    svc.request(&alice, request_for(book_id), at(2026, 3, 15))
        .await
        .unwrap();

    let stats = svc.stats(&librarian).await.unwrap();
    assert_eq!(stats.books, 1);
    assert_eq!(stats.copies, 2);
    assert_eq!(stats.available_copies, 2);
    assert_eq!(stats.requested, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total_fines, 2.0);

    assert!(matches!(
        svc.stats(&alice).await.unwrap_err(),
        DomainError::Forbidden(_)
    ));
}

/// Holds every push until the gate opens
#[derive(Default)]
struct GatedPushSender {
    gate: Notify,
    sent: Mutex<Vec<PushMessage>>,
}

#[async_trait]
impl PushSender for GatedPushSender {
    async fn send(&self, message: &PushMessage) -> Result<PushReport, DomainError> {
        self.gate.notified().await;
        self.sent.lock().unwrap().push(message.clone());
        Ok(PushReport {
            accepted: message.tokens.len(),
            invalid_tokens: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_slow_push_provider_does_not_hold_up_transitions() {
    let conn = db::init_db("sqlite::memory:").await.unwrap();
    let sender = Arc::new(GatedPushSender::default());
    let state = AppState::with_push_sender(conn, Config::default(), sender.clone());
    let db = state.db();
    let alice = create_user(db, "alice", Role::Borrower).await;
    let librarian = create_user(db, "libby", Role::Librarian).await;
    register_device(db, alice.id, "ExponentPushToken[alice-phone]").await;
    let (_, copies) = create_book_with_copies(db, "Dune", 1).await;

    let loan = tokio::time::timeout(
        Duration::from_secs(5),
        state
            .borrowings
            .issue(&librarian, issue(copies[0], alice.id, "2026-03-10"), at(2026, 3, 1)),
    )
    .await
    .expect("issue must not wait for the push provider")
    .unwrap();
    assert_eq!(loan.status, "ACTIVE");
    assert!(sender.sent.lock().unwrap().is_empty());

    sender.gate.notify_one();
    state.notifications.flush().await;

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Book Issued");
}
