// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, directory, reports, student, teacher},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * One sub-router per audience (auth, directory, teacher, student, admin).
/// * Role checks are layered inside the authentication layer.
/// * Applies global middleware (Trace, CORS) and injects the shared state.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    // Credentials rule out wildcard headers, so list them explicitly.
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(auth_layer.clone()),
        );

    let directory_routes = Router::new()
        .route("/faculties", get(directory::list_faculties))
        .route("/departments", get(directory::list_departments))
        .route("/groups", get(directory::list_groups))
        .route("/subjects", get(directory::list_subjects))
        .route("/levels", get(directory::list_levels))
        .route("/achievements", get(directory::list_achievements))
        .layer(auth_layer.clone());

    let teacher_routes = Router::new()
        .route("/classes", get(teacher::list_classes).post(teacher::create_class))
        .route("/classes/{id}", get(teacher::get_class))
        .route("/classes/{id}/qr", post(teacher::generate_qr))
        .route("/classes/{id}/end", put(teacher::end_class))
        .route("/classes/{id}/attendance", get(teacher::class_attendance))
        .route("/classes/{id}/roster", get(teacher::class_roster))
        .layer(middleware::from_fn(teacher_middleware))
        .layer(auth_layer.clone());

    let student_routes = Router::new()
        .route(
            "/attendance",
            get(student::list_my_attendance).post(student::submit_attendance),
        )
        .route("/classes", get(student::list_my_classes))
        .route("/progress", get(student::get_my_progress))
        .route("/achievements", get(student::get_my_achievements))
        .layer(middleware::from_fn(student_middleware))
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route(
            "/faculties",
            get(directory::list_faculties).post(directory::create_faculty),
        )
        .route(
            "/faculties/{id}",
            put(directory::update_faculty).delete(directory::delete_faculty),
        )
        .route(
            "/departments",
            get(directory::list_departments).post(directory::create_department),
        )
        .route(
            "/departments/{id}",
            put(directory::update_department).delete(directory::delete_department),
        )
        .route(
            "/groups",
            get(directory::list_groups).post(directory::create_group),
        )
        .route(
            "/groups/{id}",
            put(directory::update_group).delete(directory::delete_group),
        )
        .route(
            "/subjects",
            get(directory::list_subjects).post(directory::create_subject),
        )
        .route(
            "/subjects/{id}",
            put(directory::update_subject).delete(directory::delete_subject),
        )
        .route(
            "/reports",
            get(reports::list_reports).post(reports::create_report),
        )
        .route(
            "/reports/{id}",
            get(reports::get_report).delete(reports::delete_report),
        )
        .route("/reports/{id}/download", get(reports::download_report))
        // Auth first, then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/directory", directory_routes)
        .nest("/api/teacher", teacher_routes)
        .nest("/api/student", student_routes)
        .nest("/api/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
