use std::net::TcpListener;

use actix_files::Files;
use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};

use crate::{
    routes::{default_route, download_route, upload_route},
    services::AuditService,
};

pub fn run(listener: TcpListener, audit_service: AuditService) -> Result<Server, std::io::Error> {
    let audit_service = web::Data::new(audit_service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(Files::new("/static", "./templates/static").prefer_utf8(true))
            .service(default_route::default)
            .service(upload_route::upload)
            .service(download_route::download)
            .app_data(audit_service.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
