use actix_web::{dev::Server, web, App, HttpResponse, HttpServer};
use blockscout_service_launcher::launcher::MetricsSettings;
use prometheus::{Encoder, TextEncoder};

/// Serves the default prometheus registry on `settings.route`.
pub fn run_server(settings: &MetricsSettings) -> Result<Server, std::io::Error> {
    tracing::info!(addr = %settings.addr, route = %settings.route, "starting metrics server");
    let route = settings.route.clone();
    let server = HttpServer::new(move || App::new().configure(configure(route.clone())))
        .workers(1)
        .bind(settings.addr)?
        .run();
    Ok(server)
}

fn configure(route: String) -> impl FnOnce(&mut web::ServiceConfig) {
    move |config| {
        config.route(&route, web::get().to(gather));
    }
}

async fn gather() -> HttpResponse {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&prometheus::gather()) {
        Ok(body) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(body),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
