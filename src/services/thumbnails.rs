use crate::entities::file::{self, FileType};
use crate::models::rendition::Rendition;
use crate::models::settings::{StorageSettings, VariantConfig};
use crate::services::storage::{plan_rendition, LocalStore, StorageError};
use crate::utils::image_processor::process_image;

fn variant(settings: &StorageSettings, rendition: Rendition) -> Option<&VariantConfig> {
    let thumbnails = &settings.thumbnails;
    match rendition {
        Rendition::ImageConfig => Some(&thumbnails.config),
        Rendition::ImageRatio => Some(&thumbnails.ratio),
        Rendition::ImageSquare => Some(&thumbnails.square),
        Rendition::ImageBig => Some(&thumbnails.big),
        _ => None,
    }
}

/// Writes the image thumbnails of a locally stored file next to it, at the
/// paths the rendition rules derive. Returns how many were written.
///
/// A thumbnail that fails to render is skipped; the upload itself stands.
pub async fn generate_local_thumbnails(
    store: &LocalStore,
    file: &file::Model,
    settings: &StorageSettings,
) -> Result<usize, StorageError> {
    if file.file_type != FileType::Image || !settings.thumbnails.enabled {
        return Ok(0);
    }

    let source = store.read(&file.path).await?;
    let mut written = 0;

    for rendition in Rendition::projected_for(FileType::Image) {
        let Some(plan) = plan_rendition(file, *rendition, &settings.renditions) else {
            continue;
        };
        let Some(config) = variant(settings, *rendition).cloned() else {
            continue;
        };
        if plan.object_path == file.path {
            continue;
        }

        let data = source.clone();
        let rendered = tokio::task::spawn_blocking(move || process_image(&data, &config)).await;
        match rendered {
            Ok(Ok(bytes)) => {
                store.write_bytes(&plan.object_path, bytes).await?;
                written += 1;
            }
            Ok(Err(e)) => {
                tracing::warn!(fid = %file.fid, rendition = rendition.code(), error = %e, "thumbnail skipped");
            }
            Err(e) => {
                tracing::error!(fid = %file.fid, error = %e, "thumbnail task failed");
            }
        }
    }

    tracing::debug!(fid = %file.fid, written, "thumbnails generated");
    Ok(written)
}
