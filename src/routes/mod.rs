pub mod admin;
pub mod assessment;
pub mod auth;
pub mod docs;
pub mod health;
pub mod lecturer;
pub mod notes;
pub mod profile;
pub mod submission;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, MethodRouter},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{
    auth::{
        require_admin, require_authenticated, require_lecturer, require_lecturer_or_student,
        require_student,
    },
    cors::cors_for_origins,
    request_id::request_id,
};
use crate::AppState;

/// Role gates sit on each method so one path can serve several roles.
fn admin(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(state.clone(), require_admin))
}

fn lecturer(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(state.clone(), require_lecturer))
}

fn student(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(state.clone(), require_student))
}

fn lecturer_or_student(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(state.clone(), require_lecturer_or_student))
}

fn authenticated(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(state.clone(), require_authenticated))
}

fn identity_routes(s: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/logout", authenticated(s, post(auth::logout)))
        .route("/auth/me", authenticated(s, get(auth::me)))
        .route("/auth/reset-password", authenticated(s, post(auth::reset_password)))
        .route(
            "/admin/lecturers",
            admin(s, post(admin::create_lecturer).get(admin::list_lecturers)),
        )
        .route(
            "/admin/lecturers/:id",
            admin(
                s,
                get(admin::get_lecturer)
                    .put(admin::update_lecturer)
                    .delete(admin::delete_lecturer),
            ),
        )
        .route("/admin/lecturers/:id/units", admin(s, post(admin::assign_unit)))
        .route("/admin/users/:id", admin(s, delete(admin::delete_user)))
        .route("/admin/analytics", admin(s, get(admin::analytics)))
        .route(
            "/lecturer/courses",
            lecturer(s, post(lecturer::create_course).get(lecturer::list_courses)),
        )
        .route(
            "/lecturer/courses/:id",
            lecturer(
                s,
                get(lecturer::get_course)
                    .put(lecturer::update_course)
                    .delete(lecturer::delete_course),
            ),
        )
        .route(
            "/lecturer/units",
            lecturer(s, post(lecturer::create_unit).get(lecturer::list_units)),
        )
        .route(
            "/lecturer/units/:id",
            lecturer(
                s,
                get(lecturer::get_unit)
                    .put(lecturer::update_unit)
                    .delete(lecturer::delete_unit),
            ),
        )
        .route(
            "/lecturer/units/:id/students",
            lecturer(s, post(lecturer::enroll_student)),
        )
        .route(
            "/lecturer/students",
            lecturer(s, post(lecturer::create_student).get(lecturer::list_students)),
        )
        .route(
            "/lecturer/students/:id",
            lecturer(
                s,
                get(lecturer::get_student)
                    .put(lecturer::update_student)
                    .delete(lecturer::delete_student),
            ),
        )
        .route(
            "/profile",
            authenticated(s, get(profile::get_profile).put(profile::update_profile)),
        )
        .route("/student/units/join", student(s, post(profile::join_unit)))
        .route("/docs/openapi.json", get(docs::openapi_json))
}

fn backend_routes(s: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/assessments", lecturer(s, post(assessment::create_assessment)))
        .route(
            "/ai/generate-assessments",
            lecturer(s, post(assessment::generate_assessment)),
        )
        .route(
            "/ai/generate-assessments/upload",
            lecturer(s, post(assessment::generate_assessment_upload)),
        )
        .route(
            "/assessments/:id",
            lecturer_or_student(s, get(assessment::get_assessment))
                .merge(lecturer(s, delete(assessment::delete_assessment))),
        )
        .route(
            "/assessments/:id/verify",
            lecturer(s, get(assessment::verify_assessment)),
        )
        .route(
            "/assessments/:id/questions",
            lecturer_or_student(s, get(assessment::list_questions))
                .merge(lecturer(s, post(assessment::add_question))),
        )
        .route(
            "/lecturer/assessments",
            lecturer(s, get(assessment::list_lecturer_assessments)),
        )
        .route(
            "/student/assessments",
            student(s, get(assessment::list_student_assessments)),
        )
        .route(
            "/questions/:id/answer",
            student(s, post(submission::submit_answer)),
        )
        .route(
            "/answers/:id/image",
            lecturer_or_student(s, get(submission::answer_image)),
        )
        .route(
            "/assessments/:id/submit",
            student(
                s,
                get(submission::submit_assessment).post(submission::submit_assessment),
            ),
        )
        .route(
            "/student/submissions",
            student(s, get(submission::list_student_submissions)),
        )
        .route(
            "/assessments/:id/my-results",
            student(s, get(submission::my_results)),
        )
        .route("/results/:id", lecturer(s, patch(submission::correct_result)))
        .route(
            "/assessments/:id/results",
            lecturer(s, get(submission::list_assessment_results)),
        )
        .route(
            "/assessments/:id/results/export",
            lecturer(s, get(submission::export_assessment_results)),
        )
        .route(
            "/units/:id/notes",
            lecturer_or_student(s, get(notes::list_unit_notes))
                .merge(lecturer(s, post(notes::upload_note))),
        )
        .route("/lecturer/notes", lecturer(s, get(notes::list_lecturer_notes)))
        .route(
            "/notes/:id/download",
            lecturer_or_student(s, get(notes::download_note)),
        )
        .route("/notes/:id", lecturer(s, delete(notes::delete_note)))
}

/// The whole HTTP surface with its middleware stack.
pub fn router(state: AppState) -> Router {
    let config = crate::config::get_config();

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", identity_routes(&state))
        .nest("/api/v1/bd", backend_routes(&state))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes + 1024 * 1024))
        .layer(cors_for_origins(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id))
}
