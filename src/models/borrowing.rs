use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{BorrowingStatus, DomainError};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrowings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub book_copy_id: i32,
    pub borrower_id: i32,
    /// One of the `BorrowingStatus` strings (`REQUESTED`, `ACTIVE`, ...)
    pub status: String,
    pub request_date: String,
    pub issue_date: Option<String>,
    /// `YYYY-MM-DD`
    pub due_date: Option<String>,
    pub return_date: Option<String>,
    pub fine_amount: f64,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub updated_at: String,
}

impl Model {
    pub fn borrowing_status(&self) -> Result<BorrowingStatus, DomainError> {
        self.status.parse().map_err(|_| {
            DomainError::Internal(format!(
                "borrowing {} has unknown status '{}'",
                self.id, self.status
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::copy::Entity",
        from = "Column::BookCopyId",
        to = "super::copy::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Copy,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BorrowerId",
        to = "super::user::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Borrower,
}

impl Related<super::copy::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Copy.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrower.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Status strings of borrowings that still hold their copy, for `is_in` filters
pub fn open_status_values() -> Vec<&'static str> {
    BorrowingStatus::OPEN.iter().map(|s| s.as_str()).collect()
}
