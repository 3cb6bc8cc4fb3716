//! SeaORM implementation of AuthorRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::{Author, AuthorInput, AuthorRepository, DomainError};
use crate::models::author::{ActiveModel, Column, Entity as AuthorEntity, Model};
use crate::models::book_authors;

/// SeaORM-based implementation of AuthorRepository
pub struct SeaOrmAuthorRepository {
    db: DatabaseConnection,
}

impl SeaOrmAuthorRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<Model> for Author {
    fn from(a: Model) -> Self {
        Author {
            id: a.id,
            name: a.name,
            bio: a.bio,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

fn validated_name(input: &AuthorInput) -> Result<String, DomainError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation("Author name is required".to_string()));
    }
    Ok(name.to_string())
}

#[async_trait]
impl AuthorRepository for SeaOrmAuthorRepository {
    async fn find_all(&self, search: Option<String>) -> Result<Vec<Author>, DomainError> {
        let mut query = AuthorEntity::find().order_by_asc(Column::Name);
        if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(Column::Name.contains(search.trim()));
        }

        let authors = query.all(&self.db).await?;
        Ok(authors.into_iter().map(Author::from).collect())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Author>, DomainError> {
        let author = AuthorEntity::find_by_id(id).one(&self.db).await?;
        Ok(author.map(Author::from))
    }

    async fn create(&self, input: AuthorInput) -> Result<Author, DomainError> {
        let now = chrono::Utc::now().to_rfc3339();

        let author = ActiveModel {
            name: Set(validated_name(&input)?),
            bio: Set(input.bio),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = author.insert(&self.db).await?;
        Ok(Author::from(result))
    }

    async fn update(&self, id: i32, input: AuthorInput) -> Result<Author, DomainError> {
        let existing = AuthorEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Author"))?;

        let mut active: ActiveModel = existing.into();
        active.name = Set(validated_name(&input)?);
        active.bio = Set(input.bio);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let result = active.update(&self.db).await?;
        Ok(Author::from(result))
    }

    async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let books = book_authors::Entity::find()
            .filter(book_authors::Column::AuthorId.eq(id))
            .count(&self.db)
            .await?;
        if books > 0 {
            return Err(DomainError::Conflict(format!(
                "Author is credited on {} book(s) and cannot be deleted",
                books
            )));
        }

        let result = AuthorEntity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(DomainError::not_found("Author"));
        }

        Ok(())
    }
}
