pub mod author;
pub mod book;
pub mod book_authors;
pub mod book_categories;
pub mod book_favorites;
pub mod borrowing;
pub mod category;
pub mod copy;
pub mod notification;
pub mod user;
pub mod user_device;
