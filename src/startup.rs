use actix_files as fs;
use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::configuration::JwtSettings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, profile, refresh, register};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())
            .route("/health_check", web::get().to(health_check))
            // Credential endpoints; the refresh cookie is scoped to this
            // path prefix and never travels elsewhere.
            .service(
                web::scope("/api/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Protected routes (require a valid access token)
                    .service(
                        web::resource("/profile")
                            .wrap(JwtMiddleware::new(jwt_config.clone()))
                            .route(web::get().to(profile)),
                    ),
            )
            // Profile images
            .service(fs::Files::new("/media", "./media"))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
