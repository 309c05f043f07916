use crate::analysis::flatten::FlattenedRecord;
use crate::analysis::stats::{deviation_value, mean_and_std};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Category assigned to records whose question carries no tags.
pub const NO_TAG_CATEGORY: &str = "NoTag";

/// Flattened record with its per-question deviation score attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: FlattenedRecord,
    pub question_deviation: Option<f64>,
}

/// Tag-expanded record: one clone per tag, carrying the tag as its category.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    #[serde(flatten)]
    pub scored: ScoredRecord,
    pub category: String,
    pub category_deviation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCategoryGroup {
    pub user_id: Uuid,
    pub category: String,
    pub count: usize,
    pub avg_numeric: Option<f64>,
    pub avg_category_deviation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotCell {
    pub question_name: String,
    pub numeric_value: Option<f64>,
    pub question_deviation: Option<f64>,
    pub category_deviation: Option<f64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPivot {
    pub user_id: Uuid,
    pub employee_number: Option<String>,
    pub categories: BTreeMap<String, Vec<PivotCell>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverallDeviation {
    pub user_id: Uuid,
    pub avg_score: Option<f64>,
    pub overall_deviation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgHeatmapCell {
    /// Organization id as a string, or "Unknown" for targets without one.
    pub organization: String,
    pub category: String,
    pub question_name: String,
    pub count: usize,
    pub avg_numeric: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHeatmapCell {
    pub user_id: Uuid,
    pub category: String,
    pub question_name: String,
    pub count: usize,
    pub avg_numeric: Option<f64>,
}

fn mean_opt(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Step 1: per-question population mean/std over non-null numeric values,
/// deviation attached to every record of that question. Null values pass
/// through; std 0 means 50 for every member.
pub fn attach_question_deviation(records: Vec<FlattenedRecord>) -> Vec<ScoredRecord> {
    let mut by_question: BTreeMap<Uuid, Vec<f64>> = BTreeMap::new();
    for record in &records {
        if let Some(value) = record.numeric_value {
            by_question.entry(record.question_id).or_default().push(value);
        }
    }
    let stats: BTreeMap<Uuid, (f64, f64)> = by_question
        .into_iter()
        .map(|(question_id, values)| (question_id, mean_and_std(&values)))
        .collect();

    records
        .into_iter()
        .map(|record| {
            let question_deviation = record.numeric_value.and_then(|value| {
                stats
                    .get(&record.question_id)
                    .map(|(mean, std)| deviation_value(value, *mean, *std))
            });
            ScoredRecord {
                record,
                question_deviation,
            }
        })
        .collect()
}

/// Step 2: fan out each record once per tag; tagless records get the
/// placeholder category. A question tagged A and B contributes the same
/// answer to both category aggregates — intentionally not deduplicated.
pub fn expand_by_tags(records: Vec<ScoredRecord>, placeholder: &str) -> Vec<CategoryRecord> {
    let mut expanded = Vec::with_capacity(records.len());
    for scored in records {
        if scored.record.tags.is_empty() {
            expanded.push(CategoryRecord {
                scored,
                category: placeholder.to_string(),
                category_deviation: None,
            });
        } else {
            for tag in scored.record.tags.clone() {
                expanded.push(CategoryRecord {
                    scored: scored.clone(),
                    category: tag,
                    category_deviation: None,
                });
            }
        }
    }
    expanded
}

/// Step 3: same standardization as step 1, grouped by expanded category.
pub fn attach_category_deviation(mut records: Vec<CategoryRecord>) -> Vec<CategoryRecord> {
    let mut by_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in &records {
        if let Some(value) = record.scored.record.numeric_value {
            by_category.entry(record.category.clone()).or_default().push(value);
        }
    }
    let stats: BTreeMap<String, (f64, f64)> = by_category
        .into_iter()
        .map(|(category, values)| (category, mean_and_std(&values)))
        .collect();

    for record in &mut records {
        record.category_deviation = record.scored.record.numeric_value.and_then(|value| {
            stats
                .get(&record.category)
                .map(|(mean, std)| deviation_value(value, *mean, *std))
        });
    }
    records
}

/// Step 4: (user, category) groups with average numeric value and average
/// category deviation (nulls excluded; empty -> null).
pub fn group_by_user_and_category(records: &[CategoryRecord]) -> Vec<UserCategoryGroup> {
    let mut groups: BTreeMap<(Uuid, String), (usize, Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for record in records {
        let entry = groups
            .entry((record.scored.record.user_id, record.category.clone()))
            .or_default();
        entry.0 += 1;
        if let Some(value) = record.scored.record.numeric_value {
            entry.1.push(value);
        }
        if let Some(deviation) = record.category_deviation {
            entry.2.push(deviation);
        }
    }
    groups
        .into_iter()
        .map(|((user_id, category), (count, numerics, deviations))| UserCategoryGroup {
            user_id,
            category,
            count,
            avg_numeric: mean_opt(&numerics),
            avg_category_deviation: mean_opt(&deviations),
        })
        .collect()
}

/// Step 5: wide per-user table, bucketed by category.
pub fn pivot_by_user(records: &[CategoryRecord]) -> Vec<UserPivot> {
    let mut pivots: BTreeMap<Uuid, UserPivot> = BTreeMap::new();
    for record in records {
        let flat = &record.scored.record;
        let pivot = pivots.entry(flat.user_id).or_insert_with(|| UserPivot {
            user_id: flat.user_id,
            employee_number: flat.employee_number.clone(),
            categories: BTreeMap::new(),
        });
        pivot
            .categories
            .entry(record.category.clone())
            .or_default()
            .push(PivotCell {
                question_name: flat.question_name.clone(),
                numeric_value: flat.numeric_value,
                question_deviation: record.scored.question_deviation,
                category_deviation: record.category_deviation,
                tags: flat.tags.clone(),
            });
    }
    pivots.into_values().collect()
}

/// Step 6: per-user average of non-null numeric values at pre-expansion
/// granularity (one contribution per question, no tag fan-out), standardized
/// across users.
pub fn overall_user_deviation(records: &[ScoredRecord]) -> Vec<UserOverallDeviation> {
    let mut by_user: BTreeMap<Uuid, Vec<f64>> = BTreeMap::new();
    for scored in records {
        let values = by_user.entry(scored.record.user_id).or_default();
        if let Some(value) = scored.record.numeric_value {
            values.push(value);
        }
    }

    let averages: BTreeMap<Uuid, Option<f64>> = by_user
        .into_iter()
        .map(|(user_id, values)| (user_id, mean_opt(&values)))
        .collect();
    let population: Vec<f64> = averages.values().filter_map(|avg| *avg).collect();
    let (mean, std) = mean_and_std(&population);

    averages
        .into_iter()
        .map(|(user_id, avg_score)| UserOverallDeviation {
            user_id,
            avg_score,
            overall_deviation: avg_score.map(|avg| deviation_value(avg, mean, std)),
        })
        .collect()
}

/// Step 7a: (organization | "Unknown", category, question) buckets with the
/// mean numeric value, null when the bucket has no numeric members.
pub fn heatmap_by_organization(records: &[CategoryRecord]) -> Vec<OrgHeatmapCell> {
    let mut buckets: BTreeMap<(String, String, String), (usize, Vec<f64>)> = BTreeMap::new();
    for record in records {
        let flat = &record.scored.record;
        let organization = flat
            .organization_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let entry = buckets
            .entry((organization, record.category.clone(), flat.question_name.clone()))
            .or_default();
        entry.0 += 1;
        if let Some(value) = flat.numeric_value {
            entry.1.push(value);
        }
    }
    buckets
        .into_iter()
        .map(|((organization, category, question_name), (count, values))| OrgHeatmapCell {
            organization,
            category,
            question_name,
            count,
            avg_numeric: mean_opt(&values),
        })
        .collect()
}

/// Step 7b: same projection keyed by user.
pub fn heatmap_by_user(records: &[CategoryRecord]) -> Vec<UserHeatmapCell> {
    let mut buckets: BTreeMap<(Uuid, String, String), (usize, Vec<f64>)> = BTreeMap::new();
    for record in records {
        let flat = &record.scored.record;
        let entry = buckets
            .entry((flat.user_id, record.category.clone(), flat.question_name.clone()))
            .or_default();
        entry.0 += 1;
        if let Some(value) = flat.numeric_value {
            entry.1.push(value);
        }
    }
    buckets
        .into_iter()
        .map(|((user_id, category, question_name), (count, values))| UserHeatmapCell {
            user_id,
            category,
            question_name,
            count,
            avg_numeric: mean_opt(&values),
        })
        .collect()
}
