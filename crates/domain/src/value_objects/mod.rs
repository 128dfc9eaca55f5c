//! Value objects - Immutable objects defined by their attributes

mod image;
mod names;
mod region;
mod scan_quality;
mod sheet_code;
mod sheet_type;
mod spawn_chance;

pub use image::{DimensionFit, ImageBounds, MimeType, MAX_IMAGE_BYTES};
pub use names::{
    CharacterName, CreatureName, Description, GameName, ItemName, LinkName, LocationName,
};
pub use region::Region;
pub use scan_quality::ScanQuality;
pub use sheet_code::{SheetCode, SheetCodeError, SheetToken, SHEET_CODE_LEN};
pub use sheet_type::SheetType;
pub use spawn_chance::SpawnChance;
