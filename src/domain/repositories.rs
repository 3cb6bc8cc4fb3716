//! Repository trait definitions
//!
//! These traits define the contract for catalog data access.
//! Implementations live in the infrastructure layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CopyStatus, DomainError};

/// Filter criteria for book queries
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub isbn: Option<String>,
    pub q: Option<String>,
    /// Only the caller's favorites; ignored for anonymous callers
    pub is_favorite: Option<bool>,
    #[serde(skip)]
    pub favorited_by: Option<i32>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Paginated result with total count
#[derive(Debug)]
pub struct PaginatedBooks {
    pub books: Vec<Book>,
    pub total: u64,
}

/// Id + name pair for authors and categories embedded in a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: i32,
    pub name: String,
}

/// Book data for API responses, with derived availability
#[derive(Debug, Clone, Serialize)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub isbn: Option<String>,
    pub summary: Option<String>,
    pub publisher: Option<String>,
    pub publication_date: Option<String>,
    pub pages: Option<i32>,
    pub cover_url: Option<String>,
    pub total_borrows: i32,
    pub authors: Vec<NamedRef>,
    pub categories: Vec<NamedRef>,
    pub total_copies: u64,
    pub available_copies_count: u64,
    pub favorites_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating or replacing a book
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookInput {
    pub title: String,
    pub isbn: Option<String>,
    pub summary: Option<String>,
    pub publisher: Option<String>,
    pub publication_date: Option<String>,
    pub pages: Option<i32>,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub author_ids: Vec<i32>,
    #[serde(default)]
    pub category_ids: Vec<i32>,
}

/// Repository trait for Book entity
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Find all books matching the filter criteria with pagination support
    async fn find_all(&self, filter: BookFilter) -> Result<PaginatedBooks, DomainError>;

    /// Find a single book by ID
    async fn find_by_id(&self, id: i32) -> Result<Option<Book>, DomainError>;

    /// Create a new book
    async fn create(&self, input: BookInput) -> Result<Book, DomainError>;

    /// Replace an existing book's fields and associations
    async fn update(&self, id: i32, input: BookInput) -> Result<Book, DomainError>;

    /// Delete a book and its copies; refused while any copy has an open borrowing
    async fn delete(&self, id: i32) -> Result<(), DomainError>;

    /// Mark a book as one of the user's favorites (idempotent)
    async fn add_favorite(&self, book_id: i32, user_id: i32) -> Result<Book, DomainError>;

    async fn remove_favorite(&self, book_id: i32, user_id: i32) -> Result<(), DomainError>;
}

/// Author data for API responses
#[derive(Debug, Clone, Serialize)]
pub struct Author {
    pub id: i32,
    pub name: String,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorInput {
    pub name: String,
    pub bio: Option<String>,
}

/// Repository trait for Author entity
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    /// Find all authors, optionally by name fragment
    async fn find_all(&self, search: Option<String>) -> Result<Vec<Author>, DomainError>;

    /// Find an author by ID
    async fn find_by_id(&self, id: i32) -> Result<Option<Author>, DomainError>;

    /// Create a new author
    async fn create(&self, input: AuthorInput) -> Result<Author, DomainError>;

    async fn update(&self, id: i32, input: AuthorInput) -> Result<Author, DomainError>;

    /// Delete an author by ID; refused while books reference it
    async fn delete(&self, id: i32) -> Result<(), DomainError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Category>, DomainError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Category>, DomainError>;

    async fn create(&self, input: CategoryInput) -> Result<Category, DomainError>;

    async fn update(&self, id: i32, input: CategoryInput) -> Result<Category, DomainError>;

    /// Refused while books reference the category
    async fn delete(&self, id: i32) -> Result<(), DomainError>;
}

/// Copy data for API responses
#[derive(Debug, Clone, Serialize)]
pub struct Copy {
    pub id: i32,
    pub book_id: i32,
    pub copy_id: String,
    pub status: String,
    pub acquisition_date: Option<String>,
    pub notes: Option<String>,
    pub book_title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Paginated copies result
#[derive(Debug)]
pub struct PaginatedCopies {
    pub copies: Vec<Copy>,
    pub total: usize,
}

/// Input for creating a copy
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCopyInput {
    pub book_id: i32,
    /// Generated when absent
    pub copy_id: Option<String>,
    pub status: Option<CopyStatus>,
    pub acquisition_date: Option<String>,
    pub notes: Option<String>,
}

/// Input for registering several copies of one book at once
#[derive(Debug, Clone, Deserialize)]
pub struct BatchCreateCopiesInput {
    pub number_of_copies: u32,
    /// Defaults to `Available`
    pub status: Option<CopyStatus>,
    /// Defaults to today
    pub acquisition_date: Option<String>,
    /// Prepended to a generated unique suffix
    pub copy_id_prefix: Option<String>,
    pub notes: Option<String>,
}

/// Input for updating a copy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCopyInput {
    pub status: Option<CopyStatus>,
    pub notes: Option<Option<String>>,
    pub acquisition_date: Option<Option<String>>,
}

/// Repository trait for Copy entity
#[async_trait]
pub trait CopyRepository: Send + Sync {
    /// Find all copies with book titles, optionally narrowed to one status
    async fn find_all(&self, status: Option<CopyStatus>) -> Result<PaginatedCopies, DomainError>;

    /// Find a copy by ID
    async fn find_by_id(&self, id: i32) -> Result<Option<Copy>, DomainError>;

    /// Find copies for a specific book
    async fn find_by_book_id(&self, book_id: i32) -> Result<PaginatedCopies, DomainError>;

    /// Create a new copy
    async fn create(&self, input: CreateCopyInput) -> Result<Copy, DomainError>;

    /// Register `number_of_copies` copies of a book in one transaction
    async fn create_batch(
        &self,
        book_id: i32,
        input: BatchCreateCopiesInput,
    ) -> Result<Vec<Copy>, DomainError>;

    /// Update a copy; status edits are refused while a loan holds the copy
    async fn update(&self, id: i32, input: UpdateCopyInput) -> Result<Copy, DomainError>;

    /// Delete a copy; refused while an open borrowing references it
    async fn delete(&self, id: i32) -> Result<(), DomainError>;
}
