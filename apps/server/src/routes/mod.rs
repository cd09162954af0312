use actix_web::web;

pub mod health;
pub mod monitors;

/// Register every route and the shared JSON extractor config.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(monitors::json_config());
    health::routes(cfg);
    monitors::routes(cfg);
}
