//! SeaORM implementation of CategoryRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::{Category, CategoryInput, CategoryRepository, DomainError};
use crate::models::book_categories;
use crate::models::category::{ActiveModel, Column, Entity as CategoryEntity, Model};

pub struct SeaOrmCategoryRepository {
    db: DatabaseConnection,
}

impl SeaOrmCategoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Names are unique, compared after trimming
    async fn ensure_name_free(&self, name: &str, except: Option<i32>) -> Result<(), DomainError> {
        let mut query = CategoryEntity::find().filter(Column::Name.eq(name));
        if let Some(id) = except {
            query = query.filter(Column::Id.ne(id));
        }
        if query.count(&self.db).await? > 0 {
            return Err(DomainError::Conflict(format!(
                "Category '{}' already exists",
                name
            )));
        }
        Ok(())
    }
}

impl From<Model> for Category {
    fn from(c: Model) -> Self {
        Category {
            id: c.id,
            name: c.name,
            description: c.description,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

fn validated_name(input: &CategoryInput) -> Result<String, DomainError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation("Category name is required".to_string()));
    }
    Ok(name.to_string())
}

#[async_trait]
impl CategoryRepository for SeaOrmCategoryRepository {
    async fn find_all(&self) -> Result<Vec<Category>, DomainError> {
        let categories = CategoryEntity::find()
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?;
        Ok(categories.into_iter().map(Category::from).collect())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Category>, DomainError> {
        let category = CategoryEntity::find_by_id(id).one(&self.db).await?;
        Ok(category.map(Category::from))
    }

    async fn create(&self, input: CategoryInput) -> Result<Category, DomainError> {
        let name = validated_name(&input)?;
        self.ensure_name_free(&name, None).await?;
        let now = chrono::Utc::now().to_rfc3339();

        let result = ActiveModel {
            name: Set(name),
            description: Set(input.description),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(Category::from(result))
    }

    async fn update(&self, id: i32, input: CategoryInput) -> Result<Category, DomainError> {
        let existing = CategoryEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::not_found("Category"))?;
        let name = validated_name(&input)?;
        self.ensure_name_free(&name, Some(id)).await?;

        let mut active: ActiveModel = existing.into();
        active.name = Set(name);
        active.description = Set(input.description);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        Ok(Category::from(active.update(&self.db).await?))
    }

    async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let books = book_categories::Entity::find()
            .filter(book_categories::Column::CategoryId.eq(id))
            .count(&self.db)
            .await?;
        if books > 0 {
            return Err(DomainError::Conflict(format!(
                "Category is assigned to {} book(s) and cannot be deleted",
                books
            )));
        }

        let result = CategoryEntity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(DomainError::not_found("Category"));
        }

        Ok(())
    }
}
