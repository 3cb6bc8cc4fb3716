use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{CopyStatus, DomainError};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "copies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub book_id: i32,
    /// Shelf barcode, unique across the library
    #[sea_orm(unique)]
    pub copy_id: String,
    /// Availability status of this physical copy.
    /// Valid values: `Available`, `On Loan`, `Reserved`, `Lost`, `Damaged`,
    /// `In Repair`, `Withdrawn`.
    pub status: String,
    pub acquisition_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Model {
    pub fn copy_status(&self) -> Result<CopyStatus, DomainError> {
        self.status.parse().map_err(|_| {
            DomainError::Internal(format!(
                "copy {} has unknown status '{}'",
                self.id, self.status
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Book,
    #[sea_orm(has_many = "super::borrowing::Entity")]
    Borrowings,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::borrowing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrowings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
