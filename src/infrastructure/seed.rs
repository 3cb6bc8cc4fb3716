use crate::auth::hash_password;
use crate::domain::{CopyStatus, Role};
use crate::models::{author, book, book_authors, book_categories, category, copy, user};
use sea_orm::*;

const DEMO_USERS: [(&str, &str, Role); 3] = [
    ("admin", "Library Administrator", Role::Admin),
    ("librarian", "Front Desk Librarian", Role::Librarian),
    ("borrower", "Demo Borrower", Role::Borrower),
];

/// (title, isbn, author, category, copies)
const DEMO_BOOKS: [(&str, &str, &str, &str, usize); 4] = [
    ("The Hobbit", "9780261103344", "J.R.R. Tolkien", "Fantasy", 2),
    ("Foundation", "9780553293357", "Isaac Asimov", "Science Fiction", 3),
    ("Dune", "9780441172719", "Frank Herbert", "Science Fiction", 1),
    ("The Silmarillion", "9780261102736", "J.R.R. Tolkien", "Fantasy", 1),
];

/// Demo users (password = username), catalog and shelf copies.
///
/// Users are upserted by username; the catalog is only seeded into an empty database.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    let now = chrono::Utc::now().to_rfc3339();

    // 1. Users
    for (username, full_name, role) in DEMO_USERS {
        let password_hash = hash_password(username).map_err(DbErr::Custom)?;
        let account = user::ActiveModel {
            username: Set(username.to_owned()),
            password_hash: Set(password_hash),
            full_name: Set(Some(full_name.to_owned())),
            email: Set(Some(format!("{}@library.local", username))),
            role: Set(role.as_str().to_owned()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };

        user::Entity::insert(account)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(user::Column::Username)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    if book::Entity::find().count(db).await? > 0 {
        tracing::info!("Catalog already populated, skipping demo books");
        return Ok(());
    }

    let txn = db.begin().await?;

    for (index, (title, isbn, author_name, category_name, copies)) in
        DEMO_BOOKS.into_iter().enumerate()
    {
        // 2. Authors and categories, shared between books
        let author_id = match author::Entity::find()
            .filter(author::Column::Name.eq(author_name))
            .one(&txn)
            .await?
        {
            Some(existing) => existing.id,
            None => {
                author::ActiveModel {
                    name: Set(author_name.to_owned()),
                    created_at: Set(now.clone()),
                    updated_at: Set(now.clone()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
                .id
            }
        };

        let category_id = match category::Entity::find()
            .filter(category::Column::Name.eq(category_name))
            .one(&txn)
            .await?
        {
            Some(existing) => existing.id,
            None => {
                category::ActiveModel {
                    name: Set(category_name.to_owned()),
                    created_at: Set(now.clone()),
                    updated_at: Set(now.clone()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
                .id
            }
        };

        // 3. Book with its links
        let created = book::ActiveModel {
            title: Set(title.to_owned()),
            isbn: Set(Some(isbn.to_owned())),
            total_borrows: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        book_authors::Entity::insert(book_authors::ActiveModel {
            book_id: Set(created.id),
            author_id: Set(author_id),
        })
        .exec_without_returning(&txn)
        .await?;
        book_categories::Entity::insert(book_categories::ActiveModel {
            book_id: Set(created.id),
            category_id: Set(category_id),
        })
        .exec_without_returning(&txn)
        .await?;

        // 4. Shelf copies
        for n in 1..=copies {
            copy::ActiveModel {
                book_id: Set(created.id),
                copy_id: Set(format!("DEMO-{:02}-{:02}", index + 1, n)),
                status: Set(CopyStatus::Available.as_str().to_owned()),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
    }

    txn.commit().await?;
    tracing::info!("Seeded {} demo books", DEMO_BOOKS.len());

    Ok(())
}
