use utoipa::OpenApi;

use crate::routes::{admin, health, scripts, tasks};

#[derive(OpenApi)]
#[openapi(info(
    title = "sloppy-server",
    description = "Script, audio and video pipeline API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(tasks::TasksApi::openapi());
    root.merge(scripts::ScriptsApi::openapi());
    root.merge(admin::AdminApi::openapi());
    root
}
