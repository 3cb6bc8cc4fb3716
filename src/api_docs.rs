use crate::api;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::books::list_books,
        api::books::get_book,
        api::books::create_book,
        api::books::update_book,
        api::books::delete_book,
        api::books::add_favorite,
        api::books::remove_favorite,
        api::borrowing::list_borrowings,
        api::borrowing::request_borrowing,
        api::borrowing::issue_borrowing,
        api::borrowing::approve_borrowing,
        api::borrowing::reject_borrowing,
        api::borrowing::cancel_borrowing,
        api::borrowing::return_borrowing,
        api::borrowing::mark_lost,
        api::borrowing::get_stats,
    ),
    tags(
        (name = "lms", description = "Library circulation API")
    )
)]
pub struct ApiDoc;
