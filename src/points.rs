use serde::Deserialize;

use crate::catalog::{Category, Condition, Size};

pub const BASE_POINTS: i64 = 10;
pub const MIN_POINTS: i64 = 5;

/// Which scoring rule new listings are priced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsRule {
    Basic,
    #[default]
    SizeAdjusted,
}

impl std::str::FromStr for PointsRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "basic" => Ok(PointsRule::Basic),
            "size_adjusted" => Ok(PointsRule::SizeAdjusted),
            other => Err(format!("unknown points rule {other:?}")),
        }
    }
}

impl PointsRule {
    pub fn score(&self, condition: Condition, category: Category, size: Size) -> i64 {
        match self {
            PointsRule::Basic => calculate_points(condition, category),
            PointsRule::SizeAdjusted => calculate_points_with_size(condition, category, size),
        }
    }
}

fn condition_bonus(condition: Condition) -> i64 {
    match condition {
        Condition::New => 5,
        Condition::LikeNew => 3,
        Condition::Good => 1,
        Condition::Fair => 0,
    }
}

fn category_bonus(category: Category) -> i64 {
    match category {
        Category::Outerwear | Category::Dresses => 2,
        _ => 0,
    }
}

fn size_penalty(size: Size) -> i64 {
    match size {
        Size::Xs | Size::Xxl => 1,
        _ => 0,
    }
}

/// Point value of a listing from its condition and category.
pub fn calculate_points(condition: Condition, category: Category) -> i64 {
    BASE_POINTS + condition_bonus(condition) + category_bonus(category)
}

/// Like [`calculate_points`], minus one for the extreme letter sizes, never
/// below [`MIN_POINTS`].
pub fn calculate_points_with_size(condition: Condition, category: Category, size: Size) -> i64 {
    floor_points(calculate_points(condition, category) - size_penalty(size))
}

pub fn floor_points(raw: i64) -> i64 {
    raw.max(MIN_POINTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Category::Outerwear)]
    #[case(Category::Dresses)]
    fn new_premium_categories_score_seventeen(#[case] category: Category) {
        assert_eq!(calculate_points(Condition::New, category), 17);
    }

    #[test]
    fn fair_tops_score_base() {
        assert_eq!(calculate_points(Condition::Fair, Category::Tops), 10);
    }

    #[rstest]
    #[case(Condition::Good, Category::Tops, Size::Xs, 10)]
    #[case(Condition::Good, Category::Tops, Size::M, 11)]
    #[case(Condition::New, Category::Dresses, Size::Xxl, 16)]
    #[case(Condition::Fair, Category::Bottoms, Size::Xs, 9)]
    #[case(Condition::LikeNew, Category::Shoes, Size::Shoe(40), 13)]
    fn size_adjusted_scores(
        #[case] condition: Condition,
        #[case] category: Category,
        #[case] size: Size,
        #[case] expected: i64,
    ) {
        assert_eq!(calculate_points_with_size(condition, category, size), expected);
        assert_eq!(PointsRule::SizeAdjusted.score(condition, category, size), expected);
    }

    #[rstest]
    #[case(-3, 5)]
    #[case(4, 5)]
    #[case(5, 5)]
    #[case(12, 12)]
    fn floor_clamps_low_scores(#[case] raw: i64, #[case] expected: i64) {
        assert_eq!(floor_points(raw), expected);
    }

    #[test]
    fn every_combination_is_at_least_the_floor() {
        for condition in Condition::ALL {
            for category in Category::ALL {
                for size in Size::options_for(*category) {
                    let points = calculate_points_with_size(*condition, *category, size);
                    assert!(points >= MIN_POINTS);
                    assert!(calculate_points(*condition, *category) >= points);
                }
            }
        }
    }

    #[test]
    fn basic_rule_ignores_size() {
        assert_eq!(
            PointsRule::Basic.score(Condition::Good, Category::Tops, Size::Xs),
            11
        );
    }
}
