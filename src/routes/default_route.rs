use actix_web::{get, HttpResponse};
use askama::Template;

#[derive(Template)]
#[template(path = "upload.html")]
struct UploadTemplate<'a> {
    upload_path: &'a str,
}

#[get("/")]
pub async fn default() -> HttpResponse {
    match (UploadTemplate {
        upload_path: "/upload",
    })
    .render()
    {
        Ok(page) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(page),
        Err(e) => {
            log::error!("Failed to render upload page: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
