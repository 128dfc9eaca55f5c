//! Background images for printable sheets.
//!
//! Validation order: size, sniffed format, decodable header, dimension
//! bounds. Stored per `(game, record, sheet type)`; a location-scoped lookup
//! falls back to the game-level image.

use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;
use uuid::Uuid;

use playbymail_domain::{
    DimensionFit, GameId, GameImage, GameImageId, ImageBounds, LocationId, MimeType, SheetType,
    SubscriptionKind, MAX_IMAGE_BYTES,
};

use crate::infrastructure::ports::{ClockPort, RepoError, Store, StoreTx};
use crate::use_cases::context::{AccessError, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};

/// Identify the image format from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<MimeType> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];

    if bytes.starts_with(PNG) {
        Some(MimeType::Png)
    } else if bytes.starts_with(JPEG) {
        Some(MimeType::Jpeg)
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(MimeType::Webp)
    } else {
        None
    }
}

/// An image that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedImage {
    pub mime_type: MimeType,
    pub width: u32,
    pub height: u32,
    pub file_size: u32,
    /// Set when the dimensions are accepted but below the recommended size.
    pub warning: Option<String>,
}

/// Run the size, format, decode and bounds checks in that order.
pub fn check_image(bytes: &[u8], bounds: &ImageBounds) -> Result<CheckedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyImage);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::ImageTooLarge {
            size: bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    let mime_type = sniff_mime(bytes).ok_or(ImageError::UnsupportedImageFormat)?;
    let format = match mime_type {
        MimeType::Png => ImageFormat::Png,
        MimeType::Jpeg => ImageFormat::Jpeg,
        MimeType::Webp => ImageFormat::WebP,
    };
    let (width, height) = image::io::Reader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| ImageError::UnreadableImage(e.to_string()))?;

    let warning = match bounds.classify(width, height) {
        DimensionFit::Fits => None,
        DimensionFit::Suboptimal(message) => Some(message),
        DimensionFit::OutOfBounds(message) => return Err(ImageError::BadDimensions(message)),
    };

    Ok(CheckedImage {
        mime_type,
        width,
        height,
        file_size: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
        warning,
    })
}

/// Result of a background upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub image: GameImage,
    pub warning: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image body is empty")]
    EmptyImage,
    #[error("Image is {size} bytes; the limit is {max}")]
    ImageTooLarge { size: usize, max: usize },
    #[error("Image is not WebP, PNG or JPEG")]
    UnsupportedImageFormat,
    #[error("Image could not be decoded: {0}")]
    UnreadableImage(String),
    #[error("Image dimensions rejected: {0}")]
    BadDimensions(String),
    #[error("Game {0} is published and its images can no longer change")]
    GameNotEditable(GameId),
    #[error("Location {0} is not part of the game")]
    UnknownRecord(Uuid),
    #[error("No background image for {sheet_type} sheets of game {game_id}")]
    NoImage {
        game_id: GameId,
        sheet_type: SheetType,
    },
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyImage
            | Self::ImageTooLarge { .. }
            | Self::UnsupportedImageFormat
            | Self::UnreadableImage(_)
            | Self::BadDimensions(_) => ErrorKind::BadRequest,
            Self::GameNotEditable(_) => ErrorKind::Conflict,
            Self::UnknownRecord(_) | Self::NoImage { .. } => ErrorKind::NotFound,
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::EmptyImage => "EmptyImage",
            Self::ImageTooLarge { .. } => "ImageTooLarge",
            Self::UnsupportedImageFormat => "UnsupportedImageFormat",
            Self::UnreadableImage(_) => "UnreadableImage",
            Self::BadDimensions(_) => "BadDimensions",
            Self::GameNotEditable(_) => "GameNotEditable",
            Self::UnknownRecord(_) | Self::NoImage { .. } => "NotFound",
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }
}

/// Look up a background, falling back from the record to the game level.
pub(crate) async fn find_background(
    tx: &mut dyn StoreTx,
    game_id: GameId,
    sheet_type: SheetType,
    record_id: Option<Uuid>,
) -> Result<Option<GameImage>, RepoError> {
    if record_id.is_some() {
        if let Some(image) = tx.find_image(game_id, sheet_type, record_id).await? {
            return Ok(Some(image));
        }
    }
    tx.find_image(game_id, sheet_type, None).await
}

/// Upload and fetch sheet backgrounds.
pub struct SheetImages {
    store: Arc<dyn Store>,
    clock: Arc<dyn ClockPort>,
    bounds: ImageBounds,
}

impl SheetImages {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn ClockPort>, bounds: ImageBounds) -> Self {
        Self {
            store,
            clock,
            bounds,
        }
    }

    /// Validate and store a background, replacing any image in the same slot.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
        bytes: Vec<u8>,
    ) -> Result<ImageUpload, ImageError> {
        ctx.require(game_id, &[SubscriptionKind::Designer], "upload a background")?;
        let checked = check_image(&bytes, &self.bounds)?;

        let mut tx = self.store.begin(&ctx.scope).await?;
        let game = tx.get_game(game_id).await?;
        if game.is_published() {
            return Err(ImageError::GameNotEditable(game_id));
        }
        if let Some(record) = record_id {
            let world = tx.load_world(game_id).await?;
            if world.location(LocationId::from(record)).is_none() {
                return Err(ImageError::UnknownRecord(record));
            }
        }

        let now = self.clock.now();
        let stored = tx
            .upsert_image(&GameImage {
                id: GameImageId::new(),
                game_id,
                record_id,
                sheet_type,
                mime_type: checked.mime_type,
                width: checked.width,
                height: checked.height,
                file_size: checked.file_size,
                bytes,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            game_id = %game_id,
            sheet_type = %sheet_type,
            record_id = ?record_id,
            width = checked.width,
            height = checked.height,
            suboptimal = checked.warning.is_some(),
            "Stored sheet background"
        );

        Ok(ImageUpload {
            image: stored,
            warning: checked.warning,
        })
    }

    /// The background used for a record, or the game-level one.
    pub async fn background(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<GameImage, ImageError> {
        if !ctx.scope.can_see(game_id) {
            return Err(AccessError::NotVisible(game_id).into());
        }
        let mut tx = self.store.begin(&ctx.scope).await?;
        find_background(tx.as_mut(), game_id, sheet_type, record_id)
            .await?
            .ok_or(ImageError::NoImage {
                game_id,
                sheet_type,
            })
    }
}
