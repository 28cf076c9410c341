use actix_files::NamedFile;
use actix_web::{
    error::ErrorNotFound,
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web,
};

use crate::services::AuditService;

#[get("/download/{file_name}")]
pub async fn download(
    file_name: web::Path<String>,
    audit_service: web::Data<AuditService>,
) -> actix_web::Result<NamedFile> {
    let file_name = file_name.into_inner();
    let path = audit_service
        .exporter()
        .locate(&file_name)
        .ok_or_else(|| ErrorNotFound("Report not found"))?;

    let report = NamedFile::open_async(path).await?;
    Ok(report.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(file_name)],
    }))
}
