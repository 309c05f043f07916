use crate::analysis::flatten::{flatten_survey, FlattenedRecord};
use crate::analysis::stats::{compute_stats, score_label, standardize_scores, Stats};
use crate::domain::survey::{QuestionRole, Survey};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Allowed option keys per attribute question. BTreeMap gives the
/// deterministic (lexicographic by question id) iteration order used for
/// attribute tie-breaks.
pub type AttrFilters = BTreeMap<Uuid, Vec<String>>;

#[derive(Debug, Clone, Default)]
pub struct FilterParams {
    pub attr_filters: AttrFilters,
    pub question_category_ids: Vec<Uuid>,
    pub organization_id: Option<Uuid>,
}

/// Parses the `attr` query parameter: comma-separated
/// `questionId:key1|key2` clauses. Malformed fragments are skipped.
pub fn parse_attr_param(raw: &str) -> AttrFilters {
    let mut filters = AttrFilters::new();
    for clause in raw.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let Some((question_part, keys_part)) = clause.split_once(':') else {
            continue;
        };
        let Ok(question_id) = Uuid::parse_str(question_part.trim()) else {
            continue;
        };
        let keys: Vec<String> = keys_part
            .split('|')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            continue;
        }
        filters.entry(question_id).or_default().extend(keys);
    }
    filters
}

/// Parses the `qcat` query parameter: comma-separated category ids.
pub fn parse_qcat_param(raw: &str) -> Vec<Uuid> {
    raw.split(',')
        .filter_map(|part| Uuid::parse_str(part.trim()).ok())
        .collect()
}

/// Filter key for one answer: the option id, or the `null-<label>` sentinel
/// for answers (e.g. free text) that carry no option id. The sentinel must
/// stay byte-identical because it round-trips through URL-encoded state.
pub fn option_key(option_id: Option<Uuid>, option_label: Option<&str>) -> String {
    match option_id {
        Some(id) => id.to_string(),
        None => format!("null-{}", option_label.unwrap_or("")),
    }
}

/// Derived statistics carried by every aggregation bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketStats {
    pub count: usize,
    pub scores: Vec<f64>,
    pub standardized_scores: Vec<f64>,
    pub labels: Vec<String>,
    pub user_ids: Vec<Uuid>,
    pub raw_stats: Stats,
    pub standardized_stats: Stats,
}

#[derive(Debug, Clone, Default)]
struct Accum {
    scores: Vec<f64>,
    user_ids: Vec<Uuid>,
}

impl Accum {
    fn push(&mut self, score: f64, user_id: Uuid) {
        self.scores.push(score);
        if !self.user_ids.contains(&user_id) {
            self.user_ids.push(user_id);
        }
    }

    fn finalize(self) -> BucketStats {
        let standardized = standardize_scores(&self.scores);
        BucketStats {
            count: self.scores.len(),
            labels: self.scores.iter().map(|s| score_label(*s).to_string()).collect(),
            raw_stats: compute_stats(&self.scores),
            standardized_stats: compute_stats(&standardized),
            standardized_scores: standardized,
            user_ids: self.user_ids,
            scores: self.scores,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRow {
    pub question_id: Uuid,
    pub question_name: String,
    pub category_id: Option<Uuid>,
    #[serde(flatten)]
    pub stats: BucketStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryOptionQuestionRow {
    pub attribute_question_id: Uuid,
    pub attribute_question_name: String,
    pub option_key: String,
    pub option_label: Option<String>,
    pub question_id: Uuid,
    pub question_name: String,
    #[serde(flatten)]
    pub stats: BucketStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCategoryRow {
    pub category_id: Uuid,
    pub category_path: String,
    #[serde(flatten)]
    pub stats: BucketStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCategoryUserRow {
    pub category_id: Uuid,
    pub category_path: String,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub question_name: String,
    pub attribute_question_id: Option<Uuid>,
    pub attribute_option_key: Option<String>,
    pub score: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredAnalysis {
    pub respondent_count: usize,
    pub overall: Vec<OverallRow>,
    pub category_option_question: Vec<CategoryOptionQuestionRow>,
    pub question_category: Vec<QuestionCategoryRow>,
    pub question_category_user: Vec<QuestionCategoryUserRow>,
}

fn passes_filters(records: &[&FlattenedRecord], filters: &AttrFilters) -> bool {
    // AND across attribute questions, OR within one question's allowed keys.
    // A respondent with no answer to a filtered question fails that clause.
    filters.iter().all(|(question_id, allowed)| {
        records.iter().any(|r| {
            r.question_id == *question_id
                && allowed.contains(&option_key(r.option_id, r.option_label.as_deref()))
        })
    })
}

pub fn run_filtered_analysis(survey: &Survey, params: &FilterParams) -> FilteredAnalysis {
    let records = flatten_survey(survey, params.organization_id);

    let category_paths: BTreeMap<Uuid, String> = survey
        .questions()
        .filter_map(|q| q.category.as_ref())
        .map(|c| (c.id, c.path()))
        .collect();
    let question_names: BTreeMap<Uuid, &str> =
        survey.questions().map(|q| (q.id, q.name.as_str())).collect();
    let question_categories: BTreeMap<Uuid, Option<Uuid>> =
        survey.questions().map(|q| (q.id, q.category_id)).collect();

    // group per target, preserving target iteration order
    let mut target_order: Vec<Uuid> = Vec::new();
    let mut by_target: HashMap<Uuid, Vec<&FlattenedRecord>> = HashMap::new();
    for record in &records {
        let group = by_target.entry(record.target_id).or_default();
        if group.is_empty() {
            target_order.push(record.target_id);
        }
        group.push(record);
    }

    let retained: Vec<&Vec<&FlattenedRecord>> = target_order
        .iter()
        .filter_map(|target_id| by_target.get(target_id))
        .filter(|target_records| passes_filters(target_records, &params.attr_filters))
        .collect();

    let mut overall: BTreeMap<Uuid, Accum> = BTreeMap::new();
    let mut cross: BTreeMap<(Uuid, String, Uuid), Accum> = BTreeMap::new();
    let mut cross_labels: BTreeMap<(Uuid, String), Option<String>> = BTreeMap::new();
    let mut by_category: BTreeMap<Uuid, Accum> = BTreeMap::new();
    let mut per_user: BTreeMap<(Uuid, Uuid, Uuid), QuestionCategoryUserRow> = BTreeMap::new();

    for target_records in &retained {
        let mut attribute_answers: Vec<(&FlattenedRecord, String)> = target_records
            .iter()
            .filter(|r| r.question_role == QuestionRole::Category)
            .map(|r| (*r, option_key(r.option_id, r.option_label.as_deref())))
            .collect();
        attribute_answers.sort_by(|a, b| {
            (a.0.question_id, a.1.as_str()).cmp(&(b.0.question_id, b.1.as_str()))
        });

        // Deterministic "first match wins" attribution for the per-user tier:
        // scan in (question id, option key) order, break on the first answer
        // the filter accepts (any answer when no filter is set).
        let chosen_attribute = attribute_answers.iter().find(|(r, key)| {
            if params.attr_filters.is_empty() {
                true
            } else {
                params
                    .attr_filters
                    .get(&r.question_id)
                    .map(|allowed| allowed.contains(key))
                    .unwrap_or(false)
            }
        });

        for record in target_records
            .iter()
            .filter(|r| r.question_role == QuestionRole::Normal)
        {
            let Some(score) = record.numeric_value else {
                continue;
            };

            overall.entry(record.question_id).or_default().push(score, record.user_id);

            for (attr, key) in &attribute_answers {
                cross
                    .entry((attr.question_id, key.clone(), record.question_id))
                    .or_default()
                    .push(score, record.user_id);
                cross_labels
                    .entry((attr.question_id, key.clone()))
                    .or_insert_with(|| attr.option_label.clone());
            }

            if let Some(category_id) = record.category_id {
                by_category.entry(category_id).or_default().push(score, record.user_id);
                per_user
                    .entry((category_id, record.user_id, record.question_id))
                    .or_insert_with(|| QuestionCategoryUserRow {
                        category_id,
                        category_path: category_paths.get(&category_id).cloned().unwrap_or_default(),
                        user_id: record.user_id,
                        question_id: record.question_id,
                        question_name: record.question_name.clone(),
                        attribute_question_id: chosen_attribute.map(|(a, _)| a.question_id),
                        attribute_option_key: chosen_attribute.map(|(_, key)| key.clone()),
                        score,
                        label: score_label(score).to_string(),
                    });
            }
        }
    }

    let qcat: BTreeSet<Uuid> = params.question_category_ids.iter().copied().collect();
    let keep_question = |question_id: &Uuid| {
        qcat.is_empty()
            || question_categories
                .get(question_id)
                .copied()
                .flatten()
                .map(|c| qcat.contains(&c))
                .unwrap_or(false)
    };

    let overall_rows: Vec<OverallRow> = overall
        .into_iter()
        .filter(|(question_id, _)| keep_question(question_id))
        .map(|(question_id, accum)| OverallRow {
            question_id,
            question_name: question_names.get(&question_id).unwrap_or(&"").to_string(),
            category_id: question_categories.get(&question_id).copied().flatten(),
            stats: accum.finalize(),
        })
        .collect();

    let cross_rows: Vec<CategoryOptionQuestionRow> = cross
        .into_iter()
        .filter(|((_, _, question_id), _)| keep_question(question_id))
        .map(|((attribute_question_id, key, question_id), accum)| CategoryOptionQuestionRow {
            attribute_question_id,
            attribute_question_name: question_names
                .get(&attribute_question_id)
                .unwrap_or(&"")
                .to_string(),
            option_label: cross_labels
                .get(&(attribute_question_id, key.clone()))
                .cloned()
                .flatten(),
            option_key: key,
            question_id,
            question_name: question_names.get(&question_id).unwrap_or(&"").to_string(),
            stats: accum.finalize(),
        })
        .collect();

    let category_rows: Vec<QuestionCategoryRow> = by_category
        .into_iter()
        .filter(|(category_id, _)| qcat.is_empty() || qcat.contains(category_id))
        .map(|(category_id, accum)| QuestionCategoryRow {
            category_id,
            category_path: category_paths.get(&category_id).cloned().unwrap_or_default(),
            stats: accum.finalize(),
        })
        .collect();

    let per_user_rows: Vec<QuestionCategoryUserRow> = per_user
        .into_values()
        .filter(|row| qcat.is_empty() || qcat.contains(&row.category_id))
        .collect();

    FilteredAnalysis {
        respondent_count: retained.len(),
        overall: overall_rows,
        category_option_question: cross_rows,
        question_category: category_rows,
        question_category_user: per_user_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{
        answer, attr_answer, id_for, survey_with, target, SurveyQuestionSpec,
    };
    use crate::domain::survey::Category;

    #[test]
    fn test_parse_attr_param() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let raw = format!("{q1}:opt1|opt2, {q2}:null-20代 ,");
        let filters = parse_attr_param(&raw);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[&q1], vec!["opt1".to_string(), "opt2".to_string()]);
        assert_eq!(filters[&q2], vec!["null-20代".to_string()]);
    }

    #[test]
    fn test_parse_attr_param_skips_malformed() {
        assert!(parse_attr_param("").is_empty());
        assert!(parse_attr_param("not-a-uuid:opt1").is_empty());
        assert!(parse_attr_param("missing-separator").is_empty());
        let q = Uuid::new_v4();
        assert!(parse_attr_param(&format!("{q}:")).is_empty());
    }

    #[test]
    fn test_option_key_sentinel() {
        let id = Uuid::new_v4();
        assert_eq!(option_key(Some(id), Some("label")), id.to_string());
        assert_eq!(option_key(None, Some("その他")), "null-その他");
        assert_eq!(option_key(None, None), "null-");
    }

    fn fixture() -> (Survey, Uuid, Uuid, Uuid, Category) {
        let attr_q = id_for("attr-q");
        let normal_q = id_for("normal-q");
        let other_q = id_for("other-q");
        let category = Category {
            id: id_for("cat-engagement"),
            name: "エンゲージメント".to_string(),
            parent: Some(Box::new(Category {
                id: id_for("cat-root"),
                name: "組織".to_string(),
                parent: None,
            })),
        };
        let survey = survey_with(
            vec![
                SurveyQuestionSpec::attribute(attr_q, "年代"),
                SurveyQuestionSpec::normal_in_category(normal_q, "満足度", &[], category.clone()),
                SurveyQuestionSpec::normal(other_q, "推奨度", &[]),
            ],
            vec![
                target(
                    id_for("user-1"),
                    Some(("E001", "営業部")),
                    vec![
                        attr_answer(attr_q, Some(id_for("opt-20s")), "20代"),
                        answer(normal_q, "2"),
                        answer(other_q, "3"),
                    ],
                ),
                target(
                    id_for("user-2"),
                    Some(("E002", "開発部")),
                    vec![
                        attr_answer(attr_q, Some(id_for("opt-30s")), "30代"),
                        answer(normal_q, "4"),
                    ],
                ),
                // answered with free text: option key falls back to the sentinel
                target(
                    id_for("user-3"),
                    None,
                    vec![attr_answer(attr_q, None, "40代"), answer(normal_q, "5")],
                ),
                // never answered the attribute question at all
                target(id_for("user-4"), None, vec![answer(normal_q, "1")]),
            ],
        );
        (survey, attr_q, normal_q, other_q, category)
    }

    #[test]
    fn test_population_filter_by_option_id() {
        let (survey, attr_q, _, _, _) = fixture();
        let mut params = FilterParams::default();
        params.attr_filters.insert(attr_q, vec![id_for("opt-20s").to_string()]);
        let analysis = run_filtered_analysis(&survey, &params);
        assert_eq!(analysis.respondent_count, 1);
        let row = analysis
            .overall
            .iter()
            .find(|r| r.question_name == "満足度")
            .expect("満足度 row");
        assert_eq!(row.stats.scores, vec![2.0]);
        assert_eq!(row.stats.user_ids, vec![id_for("user-1")]);
    }

    #[test]
    fn test_population_filter_sentinel_and_or_semantics() {
        let (survey, attr_q, _, _, _) = fixture();
        let mut params = FilterParams::default();
        params.attr_filters.insert(
            attr_q,
            vec![id_for("opt-30s").to_string(), "null-40代".to_string()],
        );
        let analysis = run_filtered_analysis(&survey, &params);
        // OR within a question: users 2 and 3 pass; user 4 (no answer) fails
        assert_eq!(analysis.respondent_count, 2);
        let row = analysis
            .overall
            .iter()
            .find(|r| r.question_name == "満足度")
            .expect("満足度 row");
        assert_eq!(row.stats.scores, vec![4.0, 5.0]);
    }

    #[test]
    fn test_unfiltered_includes_everyone() {
        let (survey, _, _, _, _) = fixture();
        let analysis = run_filtered_analysis(&survey, &FilterParams::default());
        assert_eq!(analysis.respondent_count, 4);
        let row = analysis
            .overall
            .iter()
            .find(|r| r.question_name == "満足度")
            .expect("満足度 row");
        assert_eq!(row.stats.count, 4);
        assert_eq!(row.stats.raw_stats.mean, 3.0);
        // labels follow the raw-score buckets
        assert_eq!(row.stats.labels[0], "そう思わない");
    }

    #[test]
    fn test_cross_tier_rows() {
        let (survey, attr_q, normal_q, other_q, _) = fixture();
        let analysis = run_filtered_analysis(&survey, &FilterParams::default());
        // user-1 holds one attribute answer and two normal scores, users 2-3
        // one each; user-4 has no attribute answer so contributes no cross rows
        assert_eq!(analysis.category_option_question.len(), 4);
        let row = analysis
            .category_option_question
            .iter()
            .find(|r| r.option_key == id_for("opt-20s").to_string() && r.question_id == other_q)
            .expect("20代 x 推奨度 row");
        assert_eq!(row.attribute_question_id, attr_q);
        assert_eq!(row.attribute_question_name, "年代");
        assert_eq!(row.option_label.as_deref(), Some("20代"));
        assert_eq!(row.stats.scores, vec![3.0]);
        let sentinel = analysis
            .category_option_question
            .iter()
            .find(|r| r.option_key == "null-40代")
            .expect("sentinel row");
        assert_eq!(sentinel.question_id, normal_q);
    }

    #[test]
    fn test_question_category_tier_uses_parent_path() {
        let (survey, _, _, _, category) = fixture();
        let analysis = run_filtered_analysis(&survey, &FilterParams::default());
        assert_eq!(analysis.question_category.len(), 1);
        let row = &analysis.question_category[0];
        assert_eq!(row.category_id, category.id);
        assert_eq!(row.category_path, "組織>エンゲージメント");
        // only 満足度 belongs to the category; 推奨度 has none
        assert_eq!(row.stats.scores, vec![2.0, 4.0, 5.0, 1.0]);
        assert_eq!(row.stats.user_ids.len(), 4);
    }

    #[test]
    fn test_question_category_user_tier_caps_one_row() {
        let (mut survey, attr_q, normal_q, _, category) = fixture();
        // user-1 answers the attribute question twice; attribution must pick
        // the lexicographically first option key deterministically
        survey.survey_targets[0]
            .responses
            .push(attr_answer(attr_q, Some(id_for("opt-20s-second")), "20代後半"));
        let analysis = run_filtered_analysis(&survey, &FilterParams::default());

        let user1_rows: Vec<&QuestionCategoryUserRow> = analysis
            .question_category_user
            .iter()
            .filter(|r| r.user_id == id_for("user-1") && r.question_id == normal_q)
            .collect();
        assert_eq!(user1_rows.len(), 1);
        assert_eq!(user1_rows[0].category_id, category.id);
        assert_eq!(user1_rows[0].score, 2.0);
        let expected_key = std::cmp::min(
            id_for("opt-20s").to_string(),
            id_for("opt-20s-second").to_string(),
        );
        assert_eq!(user1_rows[0].attribute_option_key.as_deref(), Some(expected_key.as_str()));

        // user-4 has no attribute answer but still gets a category row
        let user4 = analysis
            .question_category_user
            .iter()
            .find(|r| r.user_id == id_for("user-4"))
            .expect("user-4 row");
        assert_eq!(user4.attribute_question_id, None);
    }

    #[test]
    fn test_qcat_post_filter_narrows_all_tiers() {
        let (survey, _, normal_q, _, category) = fixture();
        let params = FilterParams {
            question_category_ids: vec![category.id],
            ..Default::default()
        };
        let analysis = run_filtered_analysis(&survey, &params);
        assert!(analysis.overall.iter().all(|r| r.question_id == normal_q));
        assert!(analysis
            .category_option_question
            .iter()
            .all(|r| r.question_id == normal_q));
        assert_eq!(analysis.question_category.len(), 1);
        assert!(analysis
            .question_category_user
            .iter()
            .all(|r| r.category_id == category.id));

        // an unknown category id empties the category tiers
        let params = FilterParams {
            question_category_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        let analysis = run_filtered_analysis(&survey, &params);
        assert!(analysis.overall.is_empty());
        assert!(analysis.question_category.is_empty());
        assert!(analysis.question_category_user.is_empty());
    }
}
