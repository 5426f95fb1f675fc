use std::collections::BTreeSet;

use serde::Deserialize;

use crate::{
    dates,
    models::{Achievement, AchievementCategory, WallFacets, WallResponse},
};

pub const EMPTY_WALL_MESSAGE: &str = "No achievements found";

/// WallFilter
///
/// Query parameters of `GET /wall`. Blank values are treated as absent so an
/// unselected dropdown does not filter anything.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct WallFilter {
    /// student (default), faculty or college
    pub category: Option<AchievementCategory>,
    /// Exact achievement type.
    #[serde(rename = "type")]
    pub achievement_type: Option<String>,
    /// Calendar year of the achievement date, e.g. `2024`.
    pub year: Option<String>,
    /// Exact department.
    pub department: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl WallFilter {
    fn matches(&self, achievement: &Achievement) -> bool {
        if let Some(wanted) = present(&self.achievement_type) {
            if achievement.achievement_type != wanted {
                return false;
            }
        }
        if let Some(wanted) = present(&self.year) {
            match dates::calendar_year(&achievement.date) {
                Some(year) if year.to_string() == wanted => {}
                _ => return false,
            }
        }
        if let Some(wanted) = present(&self.department) {
            if achievement.department.as_deref() != Some(wanted) {
                return false;
            }
        }
        true
    }
}

/// Sorts newest first by the entered date. Malformed dates sink to the bottom.
pub fn sort_newest_first(achievements: &mut [Achievement]) {
    achievements.sort_by_key(|a| std::cmp::Reverse(dates::sort_key(&a.date)));
}

/// Filter values offered for the unfiltered set: types ascending, years
/// descending and departments ascending.
pub fn facets(achievements: &[Achievement]) -> WallFacets {
    let types: BTreeSet<&str> = achievements
        .iter()
        .map(|a| a.achievement_type.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    let years: BTreeSet<i32> = achievements
        .iter()
        .filter_map(|a| dates::calendar_year(&a.date))
        .collect();
    let departments: BTreeSet<&str> = achievements
        .iter()
        .filter_map(|a| a.department.as_deref())
        .filter(|d| !d.is_empty())
        .collect();

    WallFacets {
        types: types.into_iter().map(String::from).collect(),
        years: years.into_iter().rev().map(|y| y.to_string()).collect(),
        departments: departments.into_iter().map(String::from).collect(),
    }
}

/// build_wall
///
/// Turns the stored records of one category into the public wall: drops
/// everything that is not publicly visible, computes facets, applies the
/// filters and sorts newest first. An empty result carries a message rather
/// than being an error.
pub fn build_wall(
    category: AchievementCategory,
    records: Vec<Achievement>,
    filter: &WallFilter,
) -> WallResponse {
    let visible: Vec<Achievement> = records
        .into_iter()
        .filter(Achievement::is_publicly_visible)
        .collect();
    let facets = facets(&visible);

    let mut achievements: Vec<Achievement> =
        visible.into_iter().filter(|a| filter.matches(a)).collect();
    sort_newest_first(&mut achievements);

    let message = achievements
        .is_empty()
        .then(|| EMPTY_WALL_MESSAGE.to_string());

    WallResponse {
        category,
        achievements,
        facets,
        message,
    }
}
