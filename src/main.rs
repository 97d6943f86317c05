use std::env;
use std::io;
use std::time::Instant;

use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use telemetry_facade::{init_subscriber, Fields, LogFormat, Observability, TelemetryConfig};
use thiserror::Error;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Deserialize)]
struct HelloQuery {
    user: Option<String>,
}

#[derive(Deserialize)]
struct ChargeQuery {
    amount: i64,
}

#[derive(Debug, Error)]
enum ChargeError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
}

fn record_metric(result: Result<(), telemetry_facade::TelemetryError>) {
    if let Err(e) = result {
        warn!(error = %e, "Failed to record metric");
    }
}

#[get("/")]
#[tracing::instrument(skip(query, obs), fields(user))]
async fn hello(query: web::Query<HelloQuery>, obs: web::Data<Observability>) -> impl Responder {
    let user = query.user.as_deref().unwrap_or("anonymous");
    tracing::Span::current().record("user", user);

    let parent = tracing::Span::current().context();
    let (_, span) = obs.start_span(&parent, "greet");
    let fields = Fields::from([("user".to_string(), user.to_string())]);

    obs.info("http", "hello", "Hello endpoint called", fields.clone());
    record_metric(obs.counter("http.hello.requests", 1, &fields));
    span.end();

    HttpResponse::Ok().body(format!("Hello, {}!", user))
}

#[get("/charge")]
#[tracing::instrument(skip(query, obs))]
async fn charge(query: web::Query<ChargeQuery>, obs: web::Data<Observability>) -> impl Responder {
    let started = Instant::now();
    let parent = tracing::Span::current().context();
    let (cx, span) = obs.start_span(&parent, "charge");
    let fields = Fields::from([("amount".to_string(), query.amount.to_string())]);
    obs.set_attributes(&cx, &fields);

    let response = if query.amount <= 0 {
        let err = ChargeError::InvalidAmount(query.amount);
        obs.add_event(&cx, "charge.rejected", &fields);
        obs.error("billing", "charge", "Charge rejected", &err, fields.clone());
        HttpResponse::BadRequest().body(err.to_string())
    } else {
        obs.info("billing", "charge", "Charge accepted", fields.clone());
        record_metric(obs.counter("billing.charges", 1, &fields));
        HttpResponse::Ok().body("charged")
    };

    record_metric(obs.histogram(
        "billing.charge.duration_ms",
        started.elapsed().as_secs_f64() * 1000.0,
        &Fields::new(),
    ));
    span.end();
    response
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let obs = Observability::new(TelemetryConfig::from_env()).map_err(io::Error::other)?;

    let format = match env::var("LOG_FORMAT") {
        Ok(value) => value.parse().map_err(io::Error::other)?,
        Err(_) => LogFormat::default(),
    };
    init_subscriber(&obs, format).map_err(io::Error::other)?;

    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("PORT: {e}")))?;

    info!(mode = %obs.config().mode(), "Starting server on port {}", port);

    let obs = web::Data::new(obs);
    let app_obs = obs.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(app_obs.clone())
            .wrap(TracingLogger::default())
            .service(hello)
            .service(charge)
            .service(health)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    obs.shutdown().map_err(io::Error::other)
}
