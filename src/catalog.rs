//! Enumerated attribute domains for listings and exchange records.
//!
//! Every enum round-trips through its lowercase text form, which is what the
//! database columns and the HTML forms carry.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_owned() }),
                }
            }
        }
    };
}

text_enum!(
    /// Top-level clothing category.
    Category, "category", {
        Tops => "tops",
        Bottoms => "bottoms",
        Dresses => "dresses",
        Outerwear => "outerwear",
        Accessories => "accessories",
        Shoes => "shoes",
    }
);

text_enum!(
    /// Garment type. Each type belongs to exactly one [`Category`].
    ItemType, "item type", {
        TShirt => "t-shirt",
        Shirt => "shirt",
        Blouse => "blouse",
        Sweater => "sweater",
        Hoodie => "hoodie",
        Jeans => "jeans",
        Trousers => "trousers",
        Shorts => "shorts",
        Skirt => "skirt",
        Leggings => "leggings",
        CasualDress => "casual dress",
        EveningDress => "evening dress",
        MaxiDress => "maxi dress",
        Jacket => "jacket",
        Coat => "coat",
        Blazer => "blazer",
        Vest => "vest",
        Bag => "bag",
        Hat => "hat",
        Scarf => "scarf",
        Belt => "belt",
        Jewelry => "jewelry",
        Sneakers => "sneakers",
        Boots => "boots",
        Sandals => "sandals",
        Heels => "heels",
    }
);

impl ItemType {
    pub fn category(&self) -> Category {
        use ItemType::*;
        match self {
            TShirt | Shirt | Blouse | Sweater | Hoodie => Category::Tops,
            Jeans | Trousers | Shorts | Skirt | Leggings => Category::Bottoms,
            CasualDress | EveningDress | MaxiDress => Category::Dresses,
            Jacket | Coat | Blazer | Vest => Category::Outerwear,
            Bag | Hat | Scarf | Belt | Jewelry => Category::Accessories,
            Sneakers | Boots | Sandals | Heels => Category::Shoes,
        }
    }

    pub fn for_category(category: Category) -> impl Iterator<Item = ItemType> {
        Self::ALL
            .iter()
            .copied()
            .filter(move |t| t.category() == category)
    }
}

text_enum!(
    /// Wear condition, from best to worst.
    Condition, "condition", {
        New => "new",
        LikeNew => "like new",
        Good => "good",
        Fair => "fair",
    }
);

text_enum!(
    /// Lifecycle of a listing.
    ItemStatus, "item status", {
        Available => "available",
        Pending => "pending",
        Rejected => "rejected",
        Redeemed => "redeemed",
    }
);

impl ItemStatus {
    /// Listings only ever leave `available`; every other state is terminal.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        *self == ItemStatus::Available && next != ItemStatus::Available
    }
}

text_enum!(
    /// Lifecycle of a swap or redemption record.
    SwapStatus, "swap status", {
        Pending => "pending",
        Completed => "completed",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
);

impl SwapStatus {
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        *self == SwapStatus::Pending && next != SwapStatus::Pending
    }
}

text_enum!(
    /// Whether a record is a peer swap or a points redemption.
    SwapKind, "swap kind", {
        Swap => "swap",
        Points => "points",
    }
);

impl SwapKind {
    /// Table holding records of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            SwapKind::Swap => "swaps",
            SwapKind::Points => "purchases",
        }
    }
}

pub const SHOE_SIZE_MIN: u8 = 35;
pub const SHOE_SIZE_MAX: u8 = 47;

/// Letter size for garments, EU number for shoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Size {
    Xs,
    S,
    M,
    L,
    Xl,
    Xxl,
    Shoe(u8),
}

impl Size {
    pub const LETTERS: &'static [Size] = &[Size::Xs, Size::S, Size::M, Size::L, Size::Xl, Size::Xxl];

    /// Sizes a listing in `category` may use.
    pub fn options_for(category: Category) -> Vec<Size> {
        match category {
            Category::Shoes => (SHOE_SIZE_MIN..=SHOE_SIZE_MAX).map(Size::Shoe).collect(),
            _ => Self::LETTERS.to_vec(),
        }
    }

    pub fn fits(&self, category: Category) -> bool {
        match (category, self) {
            (Category::Shoes, Size::Shoe(n)) => (SHOE_SIZE_MIN..=SHOE_SIZE_MAX).contains(n),
            (Category::Shoes, _) => false,
            (_, Size::Shoe(_)) => false,
            _ => true,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Xs => f.write_str("XS"),
            Size::S => f.write_str("S"),
            Size::M => f.write_str("M"),
            Size::L => f.write_str("L"),
            Size::Xl => f.write_str("XL"),
            Size::Xxl => f.write_str("XXL"),
            Size::Shoe(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Size {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "XS" => Ok(Size::Xs),
            "S" => Ok(Size::S),
            "M" => Ok(Size::M),
            "L" => Ok(Size::L),
            "XL" => Ok(Size::Xl),
            "XXL" => Ok(Size::Xxl),
            other => other.parse::<u8>().map(Size::Shoe).map_err(|_| ParseEnumError {
                kind: "size",
                value: trimmed.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for Size {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Size> for String {
    fn from(value: Size) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn every_type_belongs_to_one_category() {
        for category in Category::ALL {
            assert!(ItemType::for_category(*category).count() > 0, "{category}");
        }
        let total: usize = Category::ALL
            .iter()
            .map(|c| ItemType::for_category(*c).count())
            .sum();
        assert_eq!(total, ItemType::ALL.len());
    }

    #[rstest]
    #[case("like new", Condition::LikeNew)]
    #[case(" fair ", Condition::Fair)]
    fn condition_parses_form_text(#[case] raw: &str, #[case] expected: Condition) {
        assert_eq!(raw.parse::<Condition>().unwrap(), expected);
    }

    #[test]
    fn unknown_text_reports_kind() {
        let err = "gown".parse::<Category>().unwrap_err();
        assert_eq!(err.kind, "category");
        assert_eq!(err.to_string(), "unknown category: \"gown\"");
    }

    #[rstest]
    #[case(ItemStatus::Available, ItemStatus::Pending, true)]
    #[case(ItemStatus::Available, ItemStatus::Redeemed, true)]
    #[case(ItemStatus::Available, ItemStatus::Rejected, true)]
    #[case(ItemStatus::Available, ItemStatus::Available, false)]
    #[case(ItemStatus::Pending, ItemStatus::Available, false)]
    #[case(ItemStatus::Redeemed, ItemStatus::Rejected, false)]
    fn item_status_only_leaves_available(
        #[case] from: ItemStatus,
        #[case] to: ItemStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case("xs", Size::Xs)]
    #[case("XXL", Size::Xxl)]
    #[case("42", Size::Shoe(42))]
    fn size_parses(#[case] raw: &str, #[case] expected: Size) {
        assert_eq!(raw.parse::<Size>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<Size>().unwrap(), expected);
    }

    #[rstest]
    #[case(Category::Shoes, Size::Shoe(40), true)]
    #[case(Category::Shoes, Size::Shoe(60), false)]
    #[case(Category::Shoes, Size::M, false)]
    #[case(Category::Tops, Size::Shoe(40), false)]
    #[case(Category::Dresses, Size::Xxl, true)]
    fn size_fits_category(#[case] category: Category, #[case] size: Size, #[case] fits: bool) {
        assert_eq!(size.fits(category), fits);
    }

    #[test]
    fn records_of_each_kind_have_their_own_table() {
        assert_eq!(SwapKind::Swap.table(), "swaps");
        assert_eq!(SwapKind::Points.table(), "purchases");
    }
}
