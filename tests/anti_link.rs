mod common;

use std::time::Duration;

use common::*;
use storage_gateway::entities::file::FileType;
use storage_gateway::models::rendition::Rendition;
use storage_gateway::models::settings::StorageSettings;

#[tokio::test]
async fn signed_urls_change_with_time() {
    let (state, _) = fake_state(StorageSettings::default()).await;
    let fid = uploaded_file(&state, 7, image_request()).await;

    let first = state.files.original_url(&fid).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = state.files.original_url(&fid).await.unwrap().unwrap();

    assert_ne!(first, second);
    assert!(first.contains("expires="));
}

#[tokio::test]
async fn public_urls_are_stable_without_anti_link() {
    let mut storage = StorageSettings::default();
    storage.image.anti_link_status = false;
    let (state, _) = fake_state(storage).await;
    let fid = uploaded_file(&state, 7, image_request()).await;

    let first = state.files.original_url(&fid).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = state.files.original_url(&fid).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert!(!first.contains("expires="));
}

#[tokio::test]
async fn cached_projections_expire_before_their_signatures() {
    let mut storage = StorageSettings::default();
    storage.image.anti_link_expire = Some(10);
    storage.video.anti_link_status = false;
    storage.audio.anti_link_status = false;
    storage.audio.cache_minutes = Some(5);
    let (state, _) = fake_state(storage).await;

    assert_eq!(state.files.cache_ttl(FileType::Image), Duration::from_secs(8 * 60));
    assert_eq!(state.files.cache_ttl(FileType::Video), Duration::from_secs(120 * 60));
    assert_eq!(state.files.cache_ttl(FileType::Audio), Duration::from_secs(5 * 60));
}

#[tokio::test]
async fn repeated_reads_serve_the_cached_projection() {
    let (state, _) = fake_state(StorageSettings::default()).await;
    let fid = uploaded_file(&state, 7, image_request()).await;

    let first = state.files.file_info(&fid, None).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = state.files.file_info(&fid, None).await.unwrap().unwrap();

    assert_eq!(first.url(Rendition::ImageConfig), second.url(Rendition::ImageConfig));
}
