//! SeaORM implementation of CopyRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use crate::domain::borrowing::{DATE_FORMAT, parse_date};
use crate::domain::{
    BatchCreateCopiesInput, BorrowingStatus, Copy, CopyRepository, CopyStatus, CreateCopyInput,
    DomainError, PaginatedCopies, UpdateCopyInput,
};
use crate::models::book::{self, Entity as BookEntity};
use crate::models::borrowing;
use crate::models::copy::{ActiveModel, Column, Entity as CopyEntity, Model};

/// SeaORM-based implementation of CopyRepository
pub struct SeaOrmCopyRepository {
    db: DatabaseConnection,
}

impl SeaOrmCopyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_dto(copy: Model, book: Option<&book::Model>) -> Copy {
    Copy {
        id: copy.id,
        book_id: copy.book_id,
        copy_id: copy.copy_id,
        status: copy.status,
        acquisition_date: copy.acquisition_date,
        notes: copy.notes,
        book_title: book.map(|b| b.title.clone()),
        created_at: copy.created_at,
        updated_at: copy.updated_at,
    }
}

/// Largest batch registered in one call
pub const MAX_BATCH_COPIES: u32 = 100;

const DEFAULT_COPY_PREFIX: &str = "CPY-";

/// Shelf barcode for copies registered without one
pub fn generate_copy_id() -> String {
    generate_prefixed_copy_id(DEFAULT_COPY_PREFIX)
}

fn generate_prefixed_copy_id(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}{}", prefix, &raw[..8])
}

/// New copies cannot start out on loan: only the borrowing workflow sets that
fn initial_status(status: Option<CopyStatus>) -> Result<CopyStatus, DomainError> {
    let status = status.unwrap_or(CopyStatus::Available);
    if status == CopyStatus::OnLoan {
        return Err(DomainError::Validation(
            "A new copy cannot be created as On Loan".to_string(),
        ));
    }
    Ok(status)
}

#[async_trait]
impl CopyRepository for SeaOrmCopyRepository {
    async fn find_all(&self, status: Option<CopyStatus>) -> Result<PaginatedCopies, DomainError> {
        let mut query = CopyEntity::find();
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }

        let copies: Vec<Copy> = query
            .order_by_asc(Column::Id)
            .find_also_related(BookEntity)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|(copy, book)| to_dto(copy, book.as_ref()))
            .collect();

        let total = copies.len();
        Ok(PaginatedCopies { copies, total })
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Copy>, DomainError> {
        let result = CopyEntity::find_by_id(id)
            .find_also_related(BookEntity)
            .one(&self.db)
            .await?;

        Ok(result.map(|(copy, book)| to_dto(copy, book.as_ref())))
    }

    async fn find_by_book_id(&self, book_id: i32) -> Result<PaginatedCopies, DomainError> {
        let copies: Vec<Copy> = CopyEntity::find()
            .filter(Column::BookId.eq(book_id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|copy| to_dto(copy, None))
            .collect();

        let total = copies.len();
        Ok(PaginatedCopies { copies, total })
    }

    async fn create(&self, input: CreateCopyInput) -> Result<Copy, DomainError> {
        let book = BookEntity::find_by_id(input.book_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;

        if let Some(date) = &input.acquisition_date {
            parse_date(date)?;
        }

        let copy_id = match input.copy_id.map(|c| c.trim().to_string()) {
            Some(c) if !c.is_empty() => c,
            _ => generate_copy_id(),
        };

        let taken = CopyEntity::find()
            .filter(Column::CopyId.eq(copy_id.as_str()))
            .count(&self.db)
            .await?;
        if taken > 0 {
            return Err(DomainError::Conflict(format!(
                "Copy id {} is already in use",
                copy_id
            )));
        }

        let status = initial_status(input.status)?;

        let now = chrono::Utc::now().to_rfc3339();
        let new_copy = ActiveModel {
            book_id: Set(input.book_id),
            copy_id: Set(copy_id),
            status: Set(status.as_str().to_string()),
            acquisition_date: Set(input.acquisition_date),
            notes: Set(input.notes),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = new_copy.insert(&self.db).await?;
        tracing::info!(
            "Registered copy {} of book {} as {}",
            result.copy_id,
            book.id,
            result.status
        );

        Ok(to_dto(result, Some(&book)))
    }

    async fn create_batch(
        &self,
        book_id: i32,
        input: BatchCreateCopiesInput,
    ) -> Result<Vec<Copy>, DomainError> {
        if input.number_of_copies == 0 || input.number_of_copies > MAX_BATCH_COPIES {
            return Err(DomainError::Validation(format!(
                "number_of_copies must be between 1 and {}",
                MAX_BATCH_COPIES
            )));
        }
        let status = initial_status(input.status)?;
        let acquisition_date = match input.acquisition_date {
            Some(date) => {
                parse_date(&date)?;
                date
            }
            None => chrono::Utc::now().date_naive().format(DATE_FORMAT).to_string(),
        };
        let prefix = input
            .copy_id_prefix
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_COPY_PREFIX.to_string());

        let txn = self.db.begin().await?;
        let book = BookEntity::find_by_id(book_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Book"))?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut created = Vec::with_capacity(input.number_of_copies as usize);
        while created.len() < input.number_of_copies as usize {
            let copy_id = generate_prefixed_copy_id(&prefix);
            let taken = CopyEntity::find()
                .filter(Column::CopyId.eq(copy_id.as_str()))
                .count(&txn)
                .await?;
            if taken > 0 {
                continue;
            }

            let copy = ActiveModel {
                book_id: Set(book_id),
                copy_id: Set(copy_id),
                status: Set(status.as_str().to_string()),
                acquisition_date: Set(Some(acquisition_date.clone())),
                notes: Set(input.notes.clone()),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            created.push(to_dto(copy, Some(&book)));
        }
        txn.commit().await?;

        tracing::info!(
            "Registered {} copies of book {} with prefix {}",
            created.len(),
            book.id,
            prefix
        );
        Ok(created)
    }

    async fn update(&self, id: i32, input: UpdateCopyInput) -> Result<Copy, DomainError> {
        let txn = self.db.begin().await?;
        let existing = CopyEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Copy"))?;

        let mut active: ActiveModel = existing.clone().into();

        if let Some(status) = input.status {
            if status.as_str() != existing.status {
                let on_loan = borrowing::Entity::find()
                    .filter(borrowing::Column::BookCopyId.eq(id))
                    .filter(borrowing::Column::Status.is_in([
                        BorrowingStatus::Active.as_str(),
                        BorrowingStatus::Overdue.as_str(),
                    ]))
                    .count(&txn)
                    .await?;
                if on_loan > 0 {
                    return Err(DomainError::Conflict(
                        "Copy is on loan; close the borrowing to change its status".to_string(),
                    ));
                }
                if status == CopyStatus::OnLoan {
                    return Err(DomainError::Validation(
                        "On Loan is set by issuing or approving a borrowing".to_string(),
                    ));
                }
                active.status = Set(status.as_str().to_string());
            }
        }
        if let Some(notes) = input.notes {
            active.notes = Set(notes);
        }
        if let Some(date) = input.acquisition_date {
            if let Some(d) = &date {
                parse_date(d)?;
            }
            active.acquisition_date = Set(date);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let result = active.update(&txn).await?;
        txn.commit().await?;

        Ok(to_dto(result, None))
    }

    async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let txn = self.db.begin().await?;

        CopyEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| DomainError::not_found("Copy"))?;

        let open = borrowing::Entity::find()
            .filter(borrowing::Column::BookCopyId.eq(id))
            .filter(borrowing::Column::Status.is_in(borrowing::open_status_values()))
            .count(&txn)
            .await?;
        if open > 0 {
            return Err(DomainError::Conflict(
                "Copy has an open borrowing and cannot be deleted".to_string(),
            ));
        }

        borrowing::Entity::delete_many()
            .filter(borrowing::Column::BookCopyId.eq(id))
            .exec(&txn)
            .await?;
        CopyEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Ok(())
    }
}
