use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::catalog::{Category, Condition, ItemStatus, ItemType, ParseEnumError, Size, SwapKind, SwapStatus};

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 2000;
pub const TAGS_MAX: usize = 10;
pub const IMAGES_MAX: usize = 5;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub points: i64,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// A user together with the stored password hash. Only the auth flow sees this.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    #[sqlx(flatten)]
    pub user: User,
    pub pwd_hash: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub item_type: ItemType,
    pub size: Size,
    pub condition: Condition,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub points: i64,
    pub status: ItemStatus,
    pub redeemed_by: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `items` row; enum and list columns are still text.
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub item_type: String,
    pub size: String,
    pub condition: String,
    pub tags: String,
    pub images: String,
    pub points: i64,
    pub status: String,
    pub redeemed_by: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Enum(#[from] ParseEnumError),
    #[error("malformed list column: {0}")]
    List(#[from] serde_json::Error),
}

impl TryFrom<ItemRow> for Item {
    type Error = RowError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            category: row.category.parse()?,
            item_type: row.item_type.parse()?,
            size: row.size.parse()?,
            condition: row.condition.parse()?,
            status: row.status.parse()?,
            tags: serde_json::from_str(&row.tags)?,
            images: serde_json::from_str(&row.images)?,
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            points: row.points,
            redeemed_by: row.redeemed_by,
            redeemed_at: row.redeemed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A swap request or a points redemption.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SwapRecord {
    pub id: String,
    pub item_id: String,
    pub item_title: String,
    pub owner_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub status: SwapStatus,
    pub kind: SwapKind,
    pub points: Option<i64>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SwapRow {
    pub id: String,
    pub item_id: String,
    pub item_title: String,
    pub owner_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub status: String,
    pub kind: String,
    pub points: Option<i64>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SwapRow> for SwapRecord {
    type Error = RowError;

    fn try_from(row: SwapRow) -> Result<Self, Self::Error> {
        Ok(SwapRecord {
            status: row.status.parse()?,
            kind: row.kind.parse()?,
            id: row.id,
            item_id: row.item_id,
            item_title: row.item_title,
            owner_id: row.owner_id,
            requester_id: row.requester_id,
            requester_name: row.requester_name,
            points: row.points,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("title must be at most {} characters", TITLE_MAX)]
    TitleTooLong,
    #[error("description must be at most {} characters", DESCRIPTION_MAX)]
    DescriptionTooLong,
    #[error("{item_type} is not a {category} type")]
    TypeOutsideCategory { item_type: ItemType, category: Category },
    #[error("size {size} does not fit {category}")]
    SizeOutsideCategory { size: Size, category: Category },
    #[error("at most {} tags are allowed", TAGS_MAX)]
    TooManyTags,
    #[error("at most {} images are allowed", IMAGES_MAX)]
    TooManyImages,
    #[error("image {0} was not uploaded to ReWear")]
    ForeignImage(String),
}

/// A listing that passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    title: String,
    description: String,
    category: Category,
    item_type: ItemType,
    size: Size,
    condition: Condition,
    tags: Vec<String>,
    images: Vec<String>,
}

impl NewItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: &str,
        description: &str,
        category: Category,
        item_type: ItemType,
        size: Size,
        condition: Condition,
        tags: Vec<String>,
        images: Vec<String>,
    ) -> Result<Self, ItemValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ItemValidationError::EmptyTitle);
        }
        if title.chars().count() > TITLE_MAX {
            return Err(ItemValidationError::TitleTooLong);
        }
        let description = description.trim();
        if description.chars().count() > DESCRIPTION_MAX {
            return Err(ItemValidationError::DescriptionTooLong);
        }
        if item_type.category() != category {
            return Err(ItemValidationError::TypeOutsideCategory { item_type, category });
        }
        if !size.fits(category) {
            return Err(ItemValidationError::SizeOutsideCategory { size, category });
        }
        let mut normalised: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !normalised.contains(&tag) {
                normalised.push(tag);
            }
        }
        let tags = normalised;
        if tags.len() > TAGS_MAX {
            return Err(ItemValidationError::TooManyTags);
        }
        if images.len() > IMAGES_MAX {
            return Err(ItemValidationError::TooManyImages);
        }
        Ok(NewItem {
            title: title.to_owned(),
            description: description.to_owned(),
            category,
            item_type,
            size,
            condition,
            tags,
            images,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn category(&self) -> Category {
        self.category
    }
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }
    pub fn size(&self) -> Size {
        self.size
    }
    pub fn condition(&self) -> Condition {
        self.condition
    }
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
    pub fn images(&self) -> &[String] {
        &self.images
    }
}

/// Equality filters applied to an item listing read.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    pub category: Option<Category>,
    pub owner_id: Option<String>,
}

impl ItemFilter {
    pub fn available() -> Self {
        ItemFilter {
            status: Some(ItemStatus::Available),
            ..Default::default()
        }
    }

    pub fn owned_by(owner_id: &str) -> Self {
        ItemFilter {
            owner_id: Some(owner_id.to_owned()),
            ..Default::default()
        }
    }
}

/// Equality filters applied to a swap or redemption read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapFilter {
    pub owner_id: Option<String>,
    pub requester_id: Option<String>,
    pub status: Option<SwapStatus>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformStats {
    pub users: i64,
    pub items: i64,
    pub available_items: i64,
    pub pending_swaps: i64,
    pub completed_exchanges: i64,
}
