use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A person credited on one or more books
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "authors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Searched with a case-insensitive contains
    pub name: String,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Deleting an author is refused while any of these rows exist
    #[sea_orm(has_many = "super::book_authors::Entity")]
    Credits,
}

impl Related<super::book_authors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credits.def()
    }
}

// Books reach their authors through the `book_authors` junction
impl Related<super::book::Entity> for Entity {
    fn via() -> Option<RelationDef> {
        Some(super::book_authors::Relation::Author.def().rev())
    }

    fn to() -> RelationDef {
        super::book_authors::Relation::Book.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
