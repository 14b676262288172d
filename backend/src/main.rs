use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use skinguard_backend::assessment::AssessmentService;
use skinguard_backend::config::AppConfig;
use skinguard_backend::logging;
use skinguard_backend::inference::Classifier;
use skinguard_backend::routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info", None);

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load()?;
    log::info!(
        "Model variant {:?} at {}",
        config.model.variant,
        config.model.path.display()
    );

    let classifier = Classifier::from_config(&config.model)?;
    match classifier.session().ensure_loaded() {
        Ok(_) => log::info!("Model preloaded at startup"),
        Err(e) => log::error!(
            "Failed to preload model at startup: {}. /predict will answer 503 until it loads",
            e
        ),
    }

    let assessor = AssessmentService::from_config(&config.assessment);
    if assessor.is_enabled() {
        log::info!("AI assessment enabled using {}", config.assessment.model);
    }

    let classifier = web::Data::new(classifier);
    let assessor = web::Data::new(assessor);
    let cors_max_age = config.server.cors_max_age;
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allow_any_header()
                    .max_age(cors_max_age),
            )
            .app_data(classifier.clone())
            .app_data(assessor.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
