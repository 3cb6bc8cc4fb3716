mod common;

use common::*;
use lms::domain::{
    AuthorInput, BatchCreateCopiesInput, BookFilter, BookInput, CategoryInput, CopyStatus,
    CreateCopyInput, DomainError, Role, UpdateCopyInput,
};
use lms::services::IssueRequest;

fn book(title: &str, isbn: Option<&str>, authors: Vec<i32>, categories: Vec<i32>) -> BookInput {
    BookInput {
        title: title.to_string(),
        isbn: isbn.map(str::to_string),
        author_ids: authors,
        category_ids: categories,
        ..Default::default()
    }
}

fn copy_of(book_id: i32) -> CreateCopyInput {
    CreateCopyInput {
        book_id,
        copy_id: None,
        status: None,
        acquisition_date: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_books_report_availability() {
    let app = setup_test_app().await;
    let state = &app.state;

    let created = state
        .book_repo
        .create(book("Dune", Some("9780441172719"), vec![], vec![]))
        .await
        .unwrap();
    assert_eq!(created.total_copies, 0);
    assert_eq!(created.available_copies_count, 0);

    state.copy_repo.create(copy_of(created.id)).await.unwrap();
    state
        .copy_repo
        .create(CreateCopyInput {
            status: Some(CopyStatus::Damaged),
            ..copy_of(created.id)
        })
        .await
        .unwrap();

    let fetched = state.book_repo.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.total_copies, 2);
    assert_eq!(fetched.available_copies_count, 1);
}

#[tokio::test]
async fn test_book_filters_and_pagination() {
    let app = setup_test_app().await;
    let state = &app.state;

    let herbert = state
        .author_repo
        .create(AuthorInput {
            name: "Frank Herbert".to_string(),
            bio: None,
        })
        .await
        .unwrap();
    let tolkien = state
        .author_repo
        .create(AuthorInput {
            name: "J.R.R. Tolkien".to_string(),
            bio: None,
        })
        .await
        .unwrap();
    let fantasy = state
        .category_repo
        .create(CategoryInput {
            name: "Fantasy".to_string(),
            description: None,
        })
        .await
        .unwrap();

    state
        .book_repo
        .create(book("Dune", Some("9780441172719"), vec![herbert.id], vec![]))
        .await
        .unwrap();
    state
        .book_repo
        .create(book("The Hobbit", None, vec![tolkien.id], vec![fantasy.id]))
        .await
        .unwrap();
    state
        .book_repo
        .create(book("The Silmarillion", None, vec![tolkien.id], vec![fantasy.id]))
        .await
        .unwrap();

    let by_author = state
        .book_repo
        .find_all(BookFilter {
            author: Some("tolkien".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_author.total, 2);
    assert_eq!(by_author.books[0].authors[0].name, "J.R.R. Tolkien");

    let by_isbn = state
        .book_repo
        .find_all(BookFilter {
            isbn: Some("9780441172719".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_isbn.total, 1);
    assert_eq!(by_isbn.books[0].title, "Dune");

    let by_category = state
        .book_repo
        .find_all(BookFilter {
            category: Some("Fantasy".to_string()),
            limit: Some(1),
            page: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_category.total, 2);
    assert_eq!(by_category.books.len(), 1);
    assert_eq!(by_category.books[0].title, "The Silmarillion");

    let free_text = state
        .book_repo
        .find_all(BookFilter {
            q: Some("hobbit".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(free_text.total, 1);
}

#[tokio::test]
async fn test_book_pagination_rejects_out_of_range_pages() {
    let app = setup_test_app().await;
    let repo = &app.state.book_repo;
    repo.create(book("Dune", None, vec![], vec![])).await.unwrap();

    for (page, limit) in [(u64::MAX / 2, 10), (u64::MAX, 1), (0, 101)] {
        let err = repo
            .find_all(BookFilter {
                page: Some(page),
                limit: Some(limit),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "page {} limit {}", page, limit);
    }

    let past_the_end = repo
        .find_all(BookFilter {
            page: Some(1_000_000),
            limit: Some(100),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(past_the_end.total, 1);
    assert!(past_the_end.books.is_empty());
}

#[tokio::test]
async fn test_catalog_uniqueness_conflicts() {
    let app = setup_test_app().await;
    let state = &app.state;

    let dune = state
        .book_repo
        .create(book("Dune", Some("9780441172719"), vec![], vec![]))
        .await
        .unwrap();
    let err = state
        .book_repo
        .create(book("Dune (again)", Some("9780441172719"), vec![], vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let first = state
        .copy_repo
        .create(CreateCopyInput {
            copy_id: Some("SHELF-1".to_string()),
            ..copy_of(dune.id)
        })
        .await
        .unwrap();
    assert_eq!(first.copy_id, "SHELF-1");
    let err = state
        .copy_repo
        .create(CreateCopyInput {
            copy_id: Some("SHELF-1".to_string()),
            ..copy_of(dune.id)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let generated = state.copy_repo.create(copy_of(dune.id)).await.unwrap();
    assert!(generated.copy_id.starts_with("CPY-"));

    state
        .category_repo
        .create(CategoryInput {
            name: "Fantasy".to_string(),
            description: None,
        })
        .await
        .unwrap();
    let err = state
        .category_repo
        .create(CategoryInput {
            name: " Fantasy ".to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    let err = state
        .book_repo
        .create(book("", None, vec![], vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_deletes_are_guarded_by_open_borrowings() {
    let app = setup_test_app().await;
    let state = &app.state;
    let alice = create_user(app.db(), "alice", Role::Borrower).await;
    let librarian = create_user(app.db(), "libby", Role::Librarian).await;
    let (book_id, copies) = create_book_with_copies(app.db(), "Dune", 1).await;

    let loan = state
        .borrowings
        .issue(
            &librarian,
            IssueRequest {
                copy_id: copies[0],
                borrower_id: alice.id,
                due_date: None,
                notes: None,
            },
            at(2026, 3, 1),
        )
        .await
        .unwrap();

    let err = state.book_repo.delete(book_id).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
    let err = state.copy_repo.delete(copies[0]).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    // Status cannot be edited while the loan holds the copy
    let err = state
        .copy_repo
        .update(
            copies[0],
            UpdateCopyInput {
                status: Some(CopyStatus::Damaged),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    state
        .borrowings
        .return_borrowing(&librarian, loan.id, at(2026, 3, 2))
        .await
        .unwrap();

    state.book_repo.delete(book_id).await.unwrap();
    assert!(state.book_repo.find_by_id(book_id).await.unwrap().is_none());
    assert!(state.copy_repo.find_by_id(copies[0]).await.unwrap().is_none());

    let err = state.book_repo.delete(book_id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn test_authors_and_categories_in_use_cannot_be_deleted() {
    let app = setup_test_app().await;
    let state = &app.state;

    let author = state
        .author_repo
        .create(AuthorInput {
            name: "Ursula K. Le Guin".to_string(),
            bio: Some("Earthsea".to_string()),
        })
        .await
        .unwrap();
    let category = state
        .category_repo
        .create(CategoryInput {
            name: "Fantasy".to_string(),
            description: None,
        })
        .await
        .unwrap();
    let created = state
        .book_repo
        .create(book("A Wizard of Earthsea", None, vec![author.id], vec![category.id]))
        .await
        .unwrap();
    assert_eq!(created.categories[0].name, "Fantasy");

    assert!(matches!(
        state.author_repo.delete(author.id).await.unwrap_err(),
        DomainError::Conflict(_)
    ));
    assert!(matches!(
        state.category_repo.delete(category.id).await.unwrap_err(),
        DomainError::Conflict(_)
    ));

    state.book_repo.delete(created.id).await.unwrap();
    state.author_repo.delete(author.id).await.unwrap();
    state.category_repo.delete(category.id).await.unwrap();

    assert!(matches!(
        state.author_repo.delete(author.id).await.unwrap_err(),
        DomainError::NotFound(_)
    ));

    let err = state
        .book_repo
        .create(book("Orphan", None, vec![author.id], vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_favorites_are_per_user_and_filterable() {
    let app = setup_test_app().await;
    let state = &app.state;
    let alice = create_user(app.db(), "alice", Role::Borrower).await;
    let bob = create_user(app.db(), "bob", Role::Borrower).await;

    let dune = state
        .book_repo
        .create(book("Dune", None, vec![], vec![]))
        .await
        .unwrap();
    let hobbit = state
        .book_repo
        .create(book("The Hobbit", None, vec![], vec![]))
        .await
        .unwrap();

    let liked = state.book_repo.add_favorite(dune.id, alice.id).await.unwrap();
    assert_eq!(liked.favorites_count, 1);
    // Favoriting twice is a no-op
    let liked = state.book_repo.add_favorite(dune.id, alice.id).await.unwrap();
    assert_eq!(liked.favorites_count, 1);
    state.book_repo.add_favorite(dune.id, bob.id).await.unwrap();
    state.book_repo.add_favorite(hobbit.id, bob.id).await.unwrap();

    let alices = state
        .book_repo
        .find_all(BookFilter {
            is_favorite: Some(true),
            favorited_by: Some(alice.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(alices.total, 1);
    assert_eq!(alices.books[0].title, "Dune");
    assert_eq!(alices.books[0].favorites_count, 2);

    // Without a caller the flag does not narrow the listing
    let anonymous = state
        .book_repo
        .find_all(BookFilter {
            is_favorite: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(anonymous.total, 2);

    state.book_repo.remove_favorite(dune.id, alice.id).await.unwrap();
    let alices = state
        .book_repo
        .find_all(BookFilter {
            is_favorite: Some(true),
            favorited_by: Some(alice.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(alices.total, 0);

    let err = state.book_repo.add_favorite(999, alice.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));

    // A favorited book can still be deleted
    state.book_repo.delete(hobbit.id).await.unwrap();
}

#[tokio::test]
async fn test_batch_copy_registration() {
    let app = setup_test_app().await;
    let state = &app.state;
    let dune = state
        .book_repo
        .create(book("Dune", None, vec![], vec![]))
        .await
        .unwrap();

    let copies = state
        .copy_repo
        .create_batch(
            dune.id,
            BatchCreateCopiesInput {
                number_of_copies: 3,
                status: None,
                acquisition_date: Some("2026-01-15".to_string()),
                copy_id_prefix: Some("MAINLIB-".to_string()),
                notes: Some("Donation".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(copies.len(), 3);
    for copy in &copies {
        assert!(copy.copy_id.starts_with("MAINLIB-"));
        assert_eq!(copy.status, "Available");
        assert_eq!(copy.acquisition_date.as_deref(), Some("2026-01-15"));
        assert_eq!(copy.book_title.as_deref(), Some("Dune"));
    }
    assert_ne!(copies[0].copy_id, copies[1].copy_id);

    let fetched = state.book_repo.find_by_id(dune.id).await.unwrap().unwrap();
    assert_eq!(fetched.total_copies, 3);
    assert_eq!(fetched.available_copies_count, 3);

    let defaults = state
        .copy_repo
        .create_batch(
            dune.id,
            BatchCreateCopiesInput {
                number_of_copies: 1,
                status: Some(CopyStatus::Damaged),
                acquisition_date: None,
                copy_id_prefix: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert!(defaults[0].copy_id.starts_with("CPY-"));
    assert_eq!(defaults[0].status, "Damaged");
    assert!(defaults[0].acquisition_date.is_some());

    for (count, status) in [(0, None), (101, None), (2, Some(CopyStatus::OnLoan))] {
        let err = state
            .copy_repo
            .create_batch(
                dune.id,
                BatchCreateCopiesInput {
                    number_of_copies: count,
                    status,
                    acquisition_date: None,
                    copy_id_prefix: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    let err = state
        .copy_repo
        .create_batch(
            999,
            BatchCreateCopiesInput {
                number_of_copies: 1,
                status: None,
                acquisition_date: None,
                copy_id_prefix: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
    assert_eq!(
        state.book_repo.find_by_id(dune.id).await.unwrap().unwrap().total_copies,
        4
    );
}
