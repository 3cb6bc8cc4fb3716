//! SeaORM implementation of BookRepository

use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    QueryTrait, Set, TransactionTrait,
};

use crate::domain::borrowing::parse_date;
use crate::domain::{
    Book, BookFilter, BookInput, BookRepository, CopyStatus, DomainError, NamedRef,
    PaginatedBooks,
};
use crate::models::book::{ActiveModel, Column, Entity as BookEntity, Model};
use crate::models::{
    author, book_authors, book_categories, book_favorites, borrowing, category, copy,
};

/// SeaORM-based implementation of BookRepository
pub struct SeaOrmBookRepository {
    db: DatabaseConnection,
}

impl SeaOrmBookRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Attach authors, categories and copy counts to a page of books
    async fn to_dtos(&self, books: Vec<Model>) -> Result<Vec<Book>, DomainError> {
        let ids: Vec<i32> = books.iter().map(|b| b.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut authors: HashMap<i32, Vec<NamedRef>> = HashMap::new();
        for (link, author) in book_authors::Entity::find()
            .filter(book_authors::Column::BookId.is_in(ids.clone()))
            .find_also_related(author::Entity)
            .all(&self.db)
            .await?
        {
            if let Some(author) = author {
                authors.entry(link.book_id).or_default().push(NamedRef {
                    id: author.id,
                    name: author.name,
                });
            }
        }

        let mut categories: HashMap<i32, Vec<NamedRef>> = HashMap::new();
        for (link, category) in book_categories::Entity::find()
            .filter(book_categories::Column::BookId.is_in(ids.clone()))
            .find_also_related(category::Entity)
            .all(&self.db)
            .await?
        {
            if let Some(category) = category {
                categories.entry(link.book_id).or_default().push(NamedRef {
                    id: category.id,
                    name: category.name,
                });
            }
        }

        let mut favorites: HashMap<i32, u64> = HashMap::new();
        for link in book_favorites::Entity::find()
            .filter(book_favorites::Column::BookId.is_in(ids.clone()))
            .all(&self.db)
            .await?
        {
            *favorites.entry(link.book_id).or_default() += 1;
        }

        // (total, available) per book
        let mut counts: HashMap<i32, (u64, u64)> = HashMap::new();
        for c in copy::Entity::find()
            .filter(copy::Column::BookId.is_in(ids))
            .all(&self.db)
            .await?
        {
            let entry = counts.entry(c.book_id).or_default();
            entry.0 += 1;
            if c.status == CopyStatus::Available.as_str() {
                entry.1 += 1;
            }
        }

        Ok(books
            .into_iter()
            .map(|b| {
                let (total_copies, available_copies_count) =
                    counts.get(&b.id).copied().unwrap_or_default();
                Book {
                    authors: authors.remove(&b.id).unwrap_or_default(),
                    categories: categories.remove(&b.id).unwrap_or_default(),
                    total_copies,
                    available_copies_count,
                    favorites_count: favorites.get(&b.id).copied().unwrap_or_default(),
                    id: b.id,
                    title: b.title,
                    isbn: b.isbn,
                    summary: b.summary,
                    publisher: b.publisher,
                    publication_date: b.publication_date,
                    pages: b.pages,
                    cover_url: b.cover_url,
                    total_borrows: b.total_borrows,
                    created_at: b.created_at,
                    updated_at: b.updated_at,
                }
            })
            .collect())
    }

    async fn to_dto(&self, book: Model) -> Result<Book, DomainError> {
        self.to_dtos(vec![book])
            .await?
            .pop()
            .ok_or_else(|| DomainError::Internal("book vanished while loading".to_string()))
    }

    /// Validate input and return the normalized ISBN
    async fn validate<C: ConnectionTrait>(
        conn: &C,
        input: &BookInput,
        existing_id: Option<i32>,
    ) -> Result<Option<String>, DomainError> {
        if input.title.trim().is_empty() {
            return Err(DomainError::Validation("Title is required".to_string()));
        }
        if let Some(date) = &input.publication_date {
            parse_date(date)?;
        }
        if let Some(pages) = input.pages {
            if pages <= 0 {
                return Err(DomainError::Validation(
                    "Pages must be positive".to_string(),
                ));
            }
        }

        let isbn = input
            .isbn
            .as_ref()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());

        if let Some(isbn) = &isbn {
            let mut query = BookEntity::find().filter(Column::Isbn.eq(isbn.as_str()));
            if let Some(id) = existing_id {
                query = query.filter(Column::Id.ne(id));
            }
            if query.count(conn).await? > 0 {
                return Err(DomainError::Conflict(format!(
                    "A book with ISBN {} already exists",
                    isbn
                )));
            }
        }

        let author_count = author::Entity::find()
            .filter(author::Column::Id.is_in(input.author_ids.clone()))
            .count(conn)
            .await?;
        if (author_count as usize) < dedup(&input.author_ids).len() {
            return Err(DomainError::Validation(
                "Unknown author id in author_ids".to_string(),
            ));
        }

        let category_count = category::Entity::find()
            .filter(category::Column::Id.is_in(input.category_ids.clone()))
            .count(conn)
            .await?;
        if (category_count as usize) < dedup(&input.category_ids).len() {
            return Err(DomainError::Validation(
                "Unknown category id in category_ids".to_string(),
            ));
        }

        Ok(isbn)
    }

    async fn link_associations(
        txn: &DatabaseTransaction,
        book_id: i32,
        input: &BookInput,
    ) -> Result<(), DomainError> {
        let author_ids = dedup(&input.author_ids);
        if !author_ids.is_empty() {
            book_authors::Entity::insert_many(author_ids.into_iter().map(|author_id| {
                book_authors::ActiveModel {
                    book_id: Set(book_id),
                    author_id: Set(author_id),
                }
            }))
            .exec_without_returning(txn)
            .await?;
        }

        let category_ids = dedup(&input.category_ids);
        if !category_ids.is_empty() {
            book_categories::Entity::insert_many(category_ids.into_iter().map(|category_id| {
                book_categories::ActiveModel {
                    book_id: Set(book_id),
                    category_id: Set(category_id),
                }
            }))
            .exec_without_returning(txn)
            .await?;
        }

        Ok(())
    }
}

/// Largest page size a listing may ask for
pub const MAX_PAGE_SIZE: u64 = 100;

/// The paginator computes `page * limit` as the SQL offset, which must fit an i64.
fn check_page_bounds(page: u64, limit: u64) -> Result<(), DomainError> {
    if limit > MAX_PAGE_SIZE {
        return Err(DomainError::Validation(format!(
            "limit must be at most {}",
            MAX_PAGE_SIZE
        )));
    }
    match page.checked_mul(limit) {
        Some(offset) if offset <= i64::MAX as u64 => Ok(()),
        _ => Err(DomainError::Validation(format!("page {} is out of range", page))),
    }
}

fn dedup(ids: &[i32]) -> Vec<i32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl BookRepository for SeaOrmBookRepository {
    async fn find_all(&self, filter: BookFilter) -> Result<PaginatedBooks, DomainError> {
        let mut query = BookEntity::find();

        if let Some(title) = filter.title.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(Column::Title.contains(title));
        }

        if let Some(publisher) = filter.publisher.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(Column::Publisher.contains(publisher));
        }

        if let Some(isbn) = filter.isbn.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(Column::Isbn.eq(isbn));
        }

        if let Some(year) = filter.publication_year {
            query = query.filter(Column::PublicationDate.starts_with(format!("{:04}-", year)));
        }

        if let Some(name) = filter.author.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(Column::Id.in_subquery(books_by_author(name)));
        }

        if let Some(name) = filter.category.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(
                Column::Id.in_subquery(
                    book_categories::Entity::find()
                        .select_only()
                        .column(book_categories::Column::BookId)
                        .inner_join(category::Entity)
                        .filter(category::Column::Name.contains(name))
                        .into_query(),
                ),
            );
        }

        if let Some(q) = filter.q.as_deref().filter(|s| !s.is_empty()) {
            let cond = Condition::any()
                .add(Column::Title.contains(q))
                .add(Column::Isbn.contains(q))
                .add(Column::Summary.contains(q))
                .add(Column::Id.in_subquery(books_by_author(q)));
            query = query.filter(cond);
        }

        if filter.is_favorite == Some(true) {
            if let Some(user_id) = filter.favorited_by {
                query = query.filter(
                    Column::Id.in_subquery(
                        book_favorites::Entity::find()
                            .select_only()
                            .column(book_favorites::Column::BookId)
                            .filter(book_favorites::Column::UserId.eq(user_id))
                            .into_query(),
                    ),
                );
            }
        }

        query = query.order_by_asc(Column::Title);

        // Fetch with pagination and total count
        let (books, total) = if let Some(limit) = filter.limit.filter(|l| *l > 0) {
            let page = filter.page.unwrap_or(0);
            check_page_bounds(page, limit)?;
            let paginator = query.paginate(&self.db, limit);
            let total = paginator.num_items().await?;
            let items = paginator.fetch_page(page).await?;
            (items, total)
        } else {
            let items = query.all(&self.db).await?;
            let total = items.len() as u64;
            (items, total)
        };

        let books = self.to_dtos(books).await?;
        Ok(PaginatedBooks { books, total })
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Book>, DomainError> {
        match BookEntity::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(Some(self.to_dto(model).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, input: BookInput) -> Result<Book, DomainError> {
        let txn = self.db.begin().await?;
        let isbn = Self::validate(&txn, &input, None).await?;
        let now = chrono::Utc::now().to_rfc3339();

        let model = ActiveModel {
            title: Set(input.title.trim().to_string()),
            isbn: Set(isbn),
            summary: Set(input.summary.clone()),
            publisher: Set(input.publisher.clone()),
            publication_date: Set(input.publication_date.clone()),
            pages: Set(input.pages),
            cover_url: Set(input.cover_url.clone()),
            total_borrows: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        Self::link_associations(&txn, model.id, &input).await?;
        txn.commit().await?;

        tracing::info!("Catalogued book {} '{}'", model.id, model.title);
        self.to_dto(model).await
    }

    async fn update(&self, id: i32, input: BookInput) -> Result<Book, DomainError> {
        let txn = self.db.begin().await?;
        let existing = BookEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;
        let isbn = Self::validate(&txn, &input, Some(id)).await?;

        // total_borrows is owned by the borrowing workflow and never edited here
        let mut active: ActiveModel = existing.into();
        active.title = Set(input.title.trim().to_string());
        active.isbn = Set(isbn);
        active.summary = Set(input.summary.clone());
        active.publisher = Set(input.publisher.clone());
        active.publication_date = Set(input.publication_date.clone());
        active.pages = Set(input.pages);
        active.cover_url = Set(input.cover_url.clone());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let model = active.update(&txn).await?;

        book_authors::Entity::delete_many()
            .filter(book_authors::Column::BookId.eq(id))
            .exec(&txn)
            .await?;
        book_categories::Entity::delete_many()
            .filter(book_categories::Column::BookId.eq(id))
            .exec(&txn)
            .await?;
        Self::link_associations(&txn, id, &input).await?;
        txn.commit().await?;

        self.to_dto(model).await
    }

    async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let txn = self.db.begin().await?;

        BookEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;

        let open = borrowing::Entity::find()
            .inner_join(copy::Entity)
            .filter(copy::Column::BookId.eq(id))
            .filter(borrowing::Column::Status.is_in(borrowing::open_status_values()))
            .count(&txn)
            .await?;
        if open > 0 {
            return Err(DomainError::Conflict(format!(
                "Book has {} open borrowing(s) and cannot be deleted",
                open
            )));
        }

        let copy_ids: Vec<i32> = copy::Entity::find()
            .select_only()
            .column(copy::Column::Id)
            .filter(copy::Column::BookId.eq(id))
            .into_tuple()
            .all(&txn)
            .await?;

        if !copy_ids.is_empty() {
            borrowing::Entity::delete_many()
                .filter(borrowing::Column::BookCopyId.is_in(copy_ids))
                .exec(&txn)
                .await?;
        }
        copy::Entity::delete_many()
            .filter(copy::Column::BookId.eq(id))
            .exec(&txn)
            .await?;
        book_authors::Entity::delete_many()
            .filter(book_authors::Column::BookId.eq(id))
            .exec(&txn)
            .await?;
        book_categories::Entity::delete_many()
            .filter(book_categories::Column::BookId.eq(id))
            .exec(&txn)
            .await?;
        book_favorites::Entity::delete_many()
            .filter(book_favorites::Column::BookId.eq(id))
            .exec(&txn)
            .await?;
        BookEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        tracing::info!("Deleted book {} with its copies", id);
        Ok(())
    }

    async fn add_favorite(&self, book_id: i32, user_id: i32) -> Result<Book, DomainError> {
        let book = BookEntity::find_by_id(book_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;

        book_favorites::Entity::insert(book_favorites::ActiveModel {
            book_id: Set(book_id),
            user_id: Set(user_id),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
        })
        .on_conflict(
            OnConflict::columns([book_favorites::Column::BookId, book_favorites::Column::UserId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;

        tracing::debug!("User {} favorited book {}", user_id, book_id);
        self.to_dto(book).await
    }

    async fn remove_favorite(&self, book_id: i32, user_id: i32) -> Result<(), DomainError> {
        BookEntity::find_by_id(book_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;

        book_favorites::Entity::delete_many()
            .filter(book_favorites::Column::BookId.eq(book_id))
            .filter(book_favorites::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(())
    }
}

fn books_by_author(name: &str) -> sea_orm::sea_query::SelectStatement {
    book_authors::Entity::find()
        .select_only()
        .column(book_authors::Column::BookId)
        .inner_join(author::Entity)
        .filter(author::Column::Name.contains(name))
        .into_query()
}
