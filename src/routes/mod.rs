pub mod files;
pub mod home;
pub mod local;
pub mod upload;
pub mod web;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::middleware::api_key::api_key_auth;
use crate::middleware::auth::{auth_middleware, optional_auth_middleware};
use crate::services::cache::FileInfoCache;
use crate::services::files::FileService;
use crate::services::policy::{ConfigUploadPolicy, UploadPolicy};
use crate::services::signer::TokenSigner;
use crate::services::storage::{StorageDrivers, StorageError};
use crate::services::upload::UploadService;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub signer: TokenSigner,
    pub drivers: Arc<StorageDrivers>,
    pub files: FileService,
    pub uploads: UploadService,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<Config>,
        drivers: Arc<StorageDrivers>,
        policy: Arc<dyn UploadPolicy>,
    ) -> Self {
        let settings = Arc::new(config.storage.clone());
        let files = FileService::new(
            db.clone(),
            drivers.clone(),
            FileInfoCache::default(),
            settings.clone(),
        );
        let uploads = UploadService::new(
            db.clone(),
            drivers.clone(),
            files.clone(),
            policy,
            settings,
        );

        Self {
            db,
            signer: TokenSigner::new(config.app_key.clone()),
            config,
            drivers,
            files,
            uploads,
        }
    }

    /// Builds the drivers and the config-driven upload policy.
    pub async fn from_config(
        db: DatabaseConnection,
        config: Arc<Config>,
    ) -> Result<Self, StorageError> {
        let signer = TokenSigner::new(config.app_key.clone());
        let drivers = Arc::new(StorageDrivers::from_settings(&config.storage, &signer).await?);
        let policy = Arc::new(ConfigUploadPolicy::new(config.storage.upload.clone()));
        Ok(Self::new(db, config, drivers, policy))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        home::root,
        home::healthz,
        upload::upload_token,
        upload::uploaded,
        files::file_info,
        files::info_list,
        files::original_url,
        files::logical_deletion,
        files::physical_deletion,
        local::download,
        local::upload,
    ),
    components(
        schemas(
            home::HealthResponse,
            upload::UploadedRequest,
            files::FileIdsRequest,
            files::OriginalUrlResponse,
            local::StoredObjectResponse,
            crate::services::upload::UploadTokenRequest,
            crate::services::upload::UploadTokenResponse,
            crate::services::storage::UploadCredential,
            crate::models::file_info::FileInfo,
            crate::models::rendition::Rendition,
            crate::entities::file::FileType,
            crate::entities::file::WarningType,
            crate::entities::file::TranscodingState,
        )
    ),
    tags(
        (name = "General", description = "Service banner and health"),
        (name = "Upload", description = "Upload credentials and confirmation"),
        (name = "Files", description = "File info, rendition URLs and deletion"),
        (name = "Local Storage", description = "Signed downloads and uploads for the local driver")
    ),
    info(
        title = "Storage Gateway API",
        version = "0.1.0",
        description = "Anti-link URLs, upload credentials and file lifecycle over Cloudinary, S3 and local storage",
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{
            ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme,
        };

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-api-key"))),
        );
    }
}

pub fn create_routes(state: AppState) -> Router {
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    // Upload lifecycle needs a user
    let upload_routes = Router::new()
        .route("/api/files/upload-token", post(upload::upload_token))
        .route("/api/files/uploaded", patch(upload::uploaded))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Reads see the caller's own pending files when a user is present
    let read_routes = Router::new()
        .route("/api/files/info-list", post(files::info_list))
        .route("/api/files/{id}", get(files::file_info))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let platform_routes = Router::new()
        .route("/api/files/{id}/original-url", get(files::original_url))
        .route("/api/files/logical-deletion", post(files::logical_deletion))
        .route("/api/files/physical-deletion", post(files::physical_deletion));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(read_routes)
        .merge(platform_routes)
        .layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    let local_routes = Router::new()
        .route("/api/file-storage/file", get(local::download))
        .route("/api/file-storage/upload", put(local::upload));

    let web_routes = Router::new()
        .route("/upload", get(web::upload_page))
        .route("/upload/api/upload-token", get(web::upload_token))
        .route("/upload/api/uploaded", patch(web::uploaded));

    let app_routes = Router::new()
        .route("/", get(home::root))
        .route("/healthz", get(home::healthz))
        .merge(api_routes)
        .merge(local_routes)
        .merge(web_routes)
        .with_state(state);

    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
