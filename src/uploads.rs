//! Image upload handling.
//!
//! Uploaded files are streamed into a staging area under a generated,
//! collision-resistant name and only published (renamed) into the public
//! image directory once the corresponding database write has committed.
//! A startup sweep clears staged files left behind by a crash between the
//! two steps.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::multipart::Field;
use axum::extract::{FromRef, FromRequest, Multipart, Request};
use axum::http::HeaderMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::{ApiError, ServiceError};

/// Subdirectory of the image root that holds not-yet-published uploads.
/// Dot-prefixed so it is not addressable through `/images/:filename`.
const STAGING_DIR: &str = ".staging";

/// Multipart field name carrying the image file.
pub const IMAGE_FIELD: &str = "image";

/// Maps an original filename to its on-disk storage name: the current
/// wall-clock epoch milliseconds, an underscore, then the original name
/// with every whitespace character replaced by an underscore.
///
/// Two uploads of the same name within one millisecond collide; the
/// granularity is accepted as-is.
pub fn generate_image_filename(original_name: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let normalized: String = original_name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{millis}_{normalized}")
}

/// Builds the public URL of a stored image from the inbound request's
/// scheme and host.
pub fn generate_image_url(scheme: &str, host: &str, stored_name: &str) -> String {
    format!("{scheme}://{host}/images/{stored_name}")
}

/// Scheme of the inbound request: `x-forwarded-proto` when present
/// (reverse-proxy deployments), otherwise plain `http`.
pub fn request_scheme(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http")
}

/// Final path segment of an image URL, i.e. the stored filename.
pub fn image_basename(image_url: &str) -> &str {
    image_url.rsplit('/').next().unwrap_or(image_url)
}

/// A file written to the staging area, not yet published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    /// Absolute path of the staged file
    pub path: PathBuf,
    /// Generated storage filename (also the name it will be published under)
    pub filename: String,
}

/// Owns the public image directory and its staging area.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Opens the store rooted at `root`, creating the directory tree as
    /// needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let root = root.into();
        fs::create_dir_all(root.join(STAGING_DIR)).await?;
        Ok(Self { root })
    }

    /// The public image directory, served at `/images`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path of a published file.
    pub fn path_of(&self, stored_name: &str) -> PathBuf {
        self.root.join(stored_name)
    }

    /// On-disk path of a staged file.
    pub fn staging_path(&self, stored_name: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(stored_name)
    }

    /// Streams a multipart file field into the staging area under a
    /// generated name. Write errors propagate to the caller.
    pub async fn stage_field(&self, field: &mut Field<'_>) -> Result<StagedImage, ServiceError> {
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let filename = generate_image_filename(&original_name);
        let path = self.staging_path(&filename);

        let mut file = fs::File::create(&path).await?;
        loop {
            let chunk = field
                .chunk()
                .await
                .map_err(|e| ServiceError::Validation(e.to_string()))?;
            match chunk {
                Some(bytes) => file.write_all(&bytes).await?,
                None => break,
            }
        }
        file.flush().await?;

        debug!(%filename, "staged uploaded image");
        Ok(StagedImage { path, filename })
    }

    /// Publishes a staged file into the public directory. Called only
    /// after the row referencing it has committed.
    pub async fn publish(&self, staged: &StagedImage) -> Result<(), ServiceError> {
        fs::rename(&staged.path, self.path_of(&staged.filename)).await?;
        Ok(())
    }

    /// Best-effort removal of a staged file after a failed request.
    pub async fn discard(&self, staged: &StagedImage) {
        match fs::remove_file(&staged.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %staged.path.display(),
                "failed to discard staged upload: {e}"
            ),
        }
    }

    /// Removes a published file by stored name. A file that is already
    /// absent is a no-op, which also absorbs racing removals.
    pub async fn remove(&self, stored_name: &str) -> Result<(), ServiceError> {
        match fs::remove_file(self.path_of(stored_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Startup reconciliation: deletes every file left in the staging
    /// area by a crash between stage and publish. Returns the number of
    /// files removed.
    pub async fn sweep_staging(&self) -> Result<usize, ServiceError> {
        let mut removed = 0;
        let mut entries = fs::read_dir(self.root.join(STAGING_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "swept stale staged uploads");
        }
        Ok(removed)
    }
}

/// Parsed multipart body of a product create/update request: the `name`
/// form field plus an optionally staged `image` file. The file is already
/// on disk (staged) by the time the handler body runs; every handler exit
/// path after extraction must either publish or discard it.
#[derive(Debug)]
pub struct ProductForm {
    pub name: Option<String>,
    pub image: Option<StagedImage>,
}

impl ProductForm {
    async fn read_fields(
        store: &ImageStore,
        multipart: &mut Multipart,
        form: &mut ProductForm,
    ) -> Result<(), ApiError> {
        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ServiceError::Validation(e.to_string()))?
        {
            let field_name = field.name().map(|s| s.to_string());
            match field_name.as_deref() {
                Some("name") => {
                    form.name = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| ServiceError::Validation(e.to_string()))?,
                    );
                }
                Some(IMAGE_FIELD) if field.file_name().is_some() => {
                    if form.image.is_none() {
                        form.image = Some(store.stage_field(&mut field).await?);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[axum::async_trait]
impl<S> FromRequest<S> for ProductForm
where
    ImageStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let store = ImageStore::from_ref(state);
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let mut form = ProductForm {
            name: None,
            image: None,
        };

        // a decode error mid-stream must not leak an already staged file
        if let Err(err) = Self::read_fields(&store, &mut multipart, &mut form).await {
            if let Some(staged) = form.image.take() {
                store.discard(&staged).await;
            }
            return Err(err);
        }

        Ok(form)
    }
}
