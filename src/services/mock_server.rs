// src/services/mock_server.rs
use actix_web::{App, HttpServer, web};

/// Starts an in-process HTTP server on an ephemeral port and returns its
/// base URL. Must be called from within an actix system.
pub fn spawn_mock<F>(configure: F) -> String
where
    F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
{
    let server = HttpServer::new(move || App::new().configure(configure.clone()))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind mock server");
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{}", addr)
}
