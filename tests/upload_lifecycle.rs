mod common;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use common::*;
use storage_gateway::entities::file::{self, FileType, TranscodingState};
use storage_gateway::entities::file_usage::{self, UsageType};
use storage_gateway::error::codes;
use storage_gateway::models::rendition::Rendition;
use storage_gateway::models::settings::StorageSettings;
use storage_gateway::services::upload::UploadTokenRequest;

async fn stored(state: &storage_gateway::routes::AppState, fid: &str) -> file::Model {
    file::Entity::find()
        .filter(file::Column::Fid.eq(fid))
        .one(&state.db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn credential_records_a_pending_file_and_its_usage() {
    let (state, _) = fake_state(StorageSettings::default()).await;

    let token = state
        .uploads
        .request_upload_credential(uploader(7), image_request())
        .await
        .unwrap();

    assert_eq!(token.fid.len(), 12);
    assert_eq!(token.credential.method, "PUT");
    assert_eq!(token.active_minutes, 10);

    let file = stored(&state, &token.fid).await;
    assert_eq!(file.file_type, FileType::Image);
    assert!(file.is_enabled);
    assert!(!file.is_uploaded);
    assert_eq!(file.transcoding_state, TranscodingState::Wait);
    assert!(file.path.starts_with("images/posts/"));
    assert!(file.path.ends_with(".jpg"));
    assert!(token.credential.url.contains(&file.path));

    let usage = file_usage::Entity::find()
        .filter(file_usage::Column::FileId.eq(file.id))
        .one(&state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.usage_type, UsageType::Post);
    assert_eq!(usage.platform_id, PLATFORM_ID);
    assert_eq!(usage.user_id, Some(7));
    assert_eq!(usage.table_key.as_deref(), Some("pAbc"));
}

#[tokio::test]
async fn confirmed_image_exposes_every_image_rendition() {
    let (state, _) = fake_state(StorageSettings::default()).await;

    let token = state
        .uploads
        .request_upload_credential(uploader(7), image_request())
        .await
        .unwrap();
    let info = state.uploads.confirm_upload(&token.fid, 7).await.unwrap();

    assert!(info.uploaded);
    assert!(info.status);
    for rendition in [
        Rendition::ImageConfig,
        Rendition::ImageRatio,
        Rendition::ImageSquare,
        Rendition::ImageBig,
    ] {
        let url = info.url(rendition).unwrap();
        assert!(url.starts_with("https://fake.example.com/images/"), "{url}");
    }
    assert_eq!(info.url(Rendition::Video), None);
}

#[tokio::test]
async fn confirming_twice_is_harmless() {
    let (state, _) = fake_state(StorageSettings::default()).await;
    let fid = uploaded_file(&state, 7, image_request()).await;

    let again = state.uploads.confirm_upload(&fid, 7).await.unwrap();
    assert!(again.uploaded);
    assert!(stored(&state, &fid).await.is_uploaded);
}

#[tokio::test]
async fn only_the_uploader_can_confirm() {
    let (state, _) = fake_state(StorageSettings::default()).await;
    let token = state
        .uploads
        .request_upload_credential(uploader(7), image_request())
        .await
        .unwrap();

    let err = state.uploads.confirm_upload(&token.fid, 8).await.unwrap_err();
    assert_eq!(err.code(), codes::NOT_UPLOADER);
    assert!(!stored(&state, &token.fid).await.is_uploaded);
}

#[tokio::test]
async fn confirming_unknown_or_disabled_files_fails() {
    let (state, _) = fake_state(StorageSettings::default()).await;

    let err = state.uploads.confirm_upload("nosuchfid123", 7).await.unwrap_err();
    assert_eq!(err.code(), codes::FILE_NOT_FOUND);

    let token = state
        .uploads
        .request_upload_credential(uploader(7), image_request())
        .await
        .unwrap();
    state
        .files
        .logical_delete(&[token.fid.clone()])
        .await
        .unwrap();

    let err = state.uploads.confirm_upload(&token.fid, 7).await.unwrap_err();
    assert_eq!(err.code(), codes::FILE_DISABLED);
    assert!(!stored(&state, &token.fid).await.is_uploaded);
}

#[tokio::test]
async fn pending_files_are_visible_to_their_uploader_only() {
    let (state, _) = fake_state(StorageSettings::default()).await;
    let token = state
        .uploads
        .request_upload_credential(uploader(7), image_request())
        .await
        .unwrap();

    assert!(state.files.file_info(&token.fid, None).await.unwrap().is_none());
    assert!(state.files.file_info(&token.fid, Some(8)).await.unwrap().is_none());

    let own = state.files.file_info(&token.fid, Some(7)).await.unwrap().unwrap();
    assert!(!own.uploaded);
    assert!(state.files.cache().get(&token.fid).await.is_none());
    assert_eq!(state.files.original_url(&token.fid).await.unwrap(), None);
}

#[tokio::test]
async fn backend_failure_leaves_no_rows() {
    let (state, driver) = fake_state(StorageSettings::default()).await;
    driver.fail_credentials();

    let err = state
        .uploads
        .request_upload_credential(uploader(7), image_request())
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::UPLOAD_CREDENTIAL);

    assert_eq!(file::Entity::find().count(&state.db).await.unwrap(), 0);
    assert_eq!(file_usage::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_declarations_are_rejected_before_any_write() {
    let (state, _) = fake_state(StorageSettings::default()).await;

    let cases = [
        UploadTokenRequest {
            file_type: "hologram".to_string(),
            ..image_request()
        },
        UploadTokenRequest {
            extension: "exe".to_string(),
            ..image_request()
        },
        UploadTokenRequest {
            size: 0,
            ..image_request()
        },
        UploadTokenRequest {
            name: "  ".to_string(),
            ..image_request()
        },
    ];
    for request in cases {
        let err = state
            .uploads
            .request_upload_credential(uploader(7), request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION);
    }

    assert_eq!(file::Entity::find().count(&state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn usage_types_outside_the_allow_list_are_denied() {
    let (state, _) = fake_state(StorageSettings::default()).await;

    let err = state
        .uploads
        .request_upload_credential(
            uploader(7),
            UploadTokenRequest {
                usage_type: "sticker".to_string(),
                ..image_request()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::UPLOAD_DENIED);
}

#[tokio::test]
async fn video_uploads_record_a_poster_path_when_the_backend_issues_one() {
    let (state, _) = fake_state_with(StorageSettings::default(), FakeDriver::with_posters()).await;
    let fid = uploaded_file(&state, 7, video_request()).await;

    let file = stored(&state, &fid).await;
    let poster = file.video_poster_path.clone().unwrap();
    assert!(poster.ends_with(".jpg"));
    assert_eq!(poster.trim_end_matches(".jpg"), file.path.trim_end_matches(".mp4"));

    let info = state.files.file_info(&fid, None).await.unwrap().unwrap();
    assert!(info.url(Rendition::Video).is_some());
    assert!(info.url(Rendition::VideoPoster).is_some());
}
