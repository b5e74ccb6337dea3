pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::resumes::extract::MAX_RESUME_BYTES;
use crate::state::AppState;
use crate::{
    audit, auth, avatar, candidates, interview, jobs, relay, reports, resumes, rooms, screening,
    users,
};

/// Multipart framing on top of the largest accepted file.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .nest("/api", api_routes())
        .route("/ws/gemini-proxy", get(relay::proxy::handle_gemini_proxy))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Auth & users
        .route("/auth/signup", post(auth::handlers::handle_signup))
        .route("/auth/login", post(auth::handlers::handle_login))
        .route("/auth/me", get(auth::handlers::handle_me))
        .route("/users", get(users::handlers::handle_list_users))
        .route(
            "/users/:id",
            get(users::handlers::handle_get_user).patch(users::handlers::handle_update_user),
        )
        // Jobs
        .route(
            "/jobs",
            get(jobs::handlers::handle_list_jobs).post(jobs::handlers::handle_create_job),
        )
        .route(
            "/jobs/:id",
            get(jobs::handlers::handle_get_job)
                .patch(jobs::handlers::handle_update_job)
                .delete(jobs::handlers::handle_delete_job),
        )
        // Applications & screening
        .route(
            "/candidates",
            get(candidates::handlers::handle_list_applications)
                .post(candidates::handlers::handle_apply),
        )
        .route("/candidates/mine", get(candidates::handlers::handle_my_applications))
        .route("/candidates/:id", get(candidates::handlers::handle_get_application))
        .route(
            "/candidates/:id/status",
            patch(candidates::handlers::handle_update_status),
        )
        .route(
            "/candidates/:id/screen",
            post(screening::handlers::handle_screen_application),
        )
        .route(
            "/candidates/:id/assessments",
            get(screening::handlers::handle_list_assessments),
        )
        // Resumes
        .route(
            "/resumes",
            get(resumes::handlers::handle_resume_history)
                .post(resumes::handlers::handle_upload_resume)
                .layer(DefaultBodyLimit::max(MAX_RESUME_BYTES + UPLOAD_OVERHEAD_BYTES)),
        )
        .route("/resumes/current", get(resumes::handlers::handle_current_resume))
        .route("/resumes/:id", get(resumes::handlers::handle_get_resume))
        // Interview sessions
        .route(
            "/interview/sessions",
            get(interview::handlers::handle_list_sessions)
                .post(interview::handlers::handle_create_session),
        )
        .route(
            "/interview/sessions/:id",
            get(interview::handlers::handle_get_session)
                .patch(interview::handlers::handle_update_session),
        )
        .route(
            "/interview/sessions/:id/transcript",
            post(interview::handlers::handle_append_transcript),
        )
        .route(
            "/interview/sessions/:id/complete",
            post(interview::handlers::handle_complete_session),
        )
        .route(
            "/interview/sessions/:id/report",
            post(reports::handlers::handle_request_report),
        )
        .route("/interview/screen", post(interview::handlers::handle_screen_text))
        // Reports
        .route("/reports/:id", get(reports::handlers::handle_report_status))
        .route(
            "/reports/:id/download",
            get(reports::handlers::handle_download_report),
        )
        // Rooms
        .route(
            "/rooms",
            get(rooms::handlers::handle_list_rooms).post(rooms::handlers::handle_create_room),
        )
        .route(
            "/rooms/:name",
            get(rooms::handlers::handle_get_room).delete(rooms::handlers::handle_close_room),
        )
        .route("/rooms/:name/heartbeat", post(rooms::handlers::handle_heartbeat))
        .route("/rooms/:name/token", post(rooms::handlers::handle_room_token))
        // Avatar & audit
        .route("/avatar/render", post(avatar::handlers::handle_render_avatar))
        .route("/audit", get(audit::handle_list_audit))
}
