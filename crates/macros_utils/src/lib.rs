//! Small declarative helpers shared by the HTTP apps.

/// Generates a `pub fn routes(cfg: &mut ServiceConfig)` registering every
/// listed actix service, so each route module exposes the same entry point.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut ::actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}
