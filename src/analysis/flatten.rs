use crate::domain::survey::{Question, QuestionRole, Survey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// One row per (survey target, question, response detail). Rebuilt on every
/// request, never persisted. `numeric_value` is None for TEXT/FILE answers and
/// malformed numeric strings; such rows stay visible in raw/table views but are
/// excluded from every numeric aggregate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedRecord {
    pub target_id: Uuid,
    pub user_id: Uuid,
    pub employee_number: Option<String>,
    pub organization_id: Option<Uuid>,
    pub organization_name: Option<String>,
    pub question_id: Uuid,
    pub question_name: String,
    pub question_role: QuestionRole,
    pub category_id: Option<Uuid>,
    pub option_id: Option<Uuid>,
    pub option_label: Option<String>,
    pub option_value: Option<String>,
    pub tags: Vec<String>,
    pub numeric_value: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Numeric coercion for option values. Empty/whitespace strings and anything
/// that does not parse as a finite number become None.
pub fn parse_numeric(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Flattens the survey aggregate in target x response x detail iteration
/// order. `organization_id` drops non-matching targets before flattening.
pub fn flatten_survey(survey: &Survey, organization_id: Option<Uuid>) -> Vec<FlattenedRecord> {
    let questions: HashMap<Uuid, &Question> = survey.questions().map(|q| (q.id, q)).collect();

    let mut records = Vec::new();
    for target in &survey.survey_targets {
        let employee = target.user.employee.as_ref();
        let organization = employee.and_then(|e| e.organization.as_ref());
        if let Some(filter) = organization_id {
            if organization.map(|o| o.id) != Some(filter) {
                continue;
            }
        }
        for response in &target.responses {
            let Some(question) = questions.get(&response.question_id) else {
                continue;
            };
            for detail in &response.response_details {
                records.push(FlattenedRecord {
                    target_id: target.id,
                    user_id: target.user.id,
                    employee_number: employee.and_then(|e| e.number.clone()),
                    organization_id: organization.map(|o| o.id),
                    organization_name: organization.map(|o| o.name.clone()),
                    question_id: question.id,
                    question_name: question.name.clone(),
                    question_role: question.role,
                    category_id: question.category_id,
                    option_id: detail.question_option_id,
                    option_label: detail.option_label.clone(),
                    option_value: detail.option_value.clone(),
                    tags: question.tags.iter().map(|t| t.name.clone()).collect(),
                    numeric_value: parse_numeric(detail.option_value.as_deref()),
                    created_at: response.created_at,
                });
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{answer, attr_answer, survey_with, target, SurveyQuestionSpec};

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(Some("4")), Some(4.0));
        assert_eq!(parse_numeric(Some(" 3.5 ")), Some(3.5));
        assert_eq!(parse_numeric(Some("abc")), None);
        assert_eq!(parse_numeric(Some("")), None);
        assert_eq!(parse_numeric(Some("   ")), None);
        assert_eq!(parse_numeric(None), None);
    }

    #[test]
    fn test_flatten_one_row_per_detail() {
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();
        let survey = survey_with(
            vec![
                SurveyQuestionSpec::normal(q1, "満足度", &["A"]),
                SurveyQuestionSpec::normal(q2, "自由記述", &[]),
            ],
            vec![target(
                Uuid::new_v4(),
                Some(("E001", "営業部")),
                vec![answer(q1, "4"), answer(q2, "text answer isn't numeric")],
            )],
        );

        let records = flatten_survey(&survey, None);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].numeric_value, Some(4.0));
        assert_eq!(records[0].tags, vec!["A".to_string()]);
        assert_eq!(records[0].employee_number.as_deref(), Some("E001"));
        assert_eq!(records[0].organization_name.as_deref(), Some("営業部"));
        assert_eq!(records[1].numeric_value, None);
    }

    #[test]
    fn test_flatten_skips_unknown_questions() {
        let q1 = Uuid::new_v4();
        let survey = survey_with(
            vec![SurveyQuestionSpec::normal(q1, "満足度", &[])],
            vec![target(
                Uuid::new_v4(),
                None,
                vec![answer(q1, "3"), answer(Uuid::new_v4(), "5")],
            )],
        );
        let records = flatten_survey(&survey, None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].organization_id, None);
    }

    #[test]
    fn test_organization_filter() {
        let q1 = Uuid::new_v4();
        let mut survey = survey_with(
            vec![SurveyQuestionSpec::normal(q1, "満足度", &[])],
            vec![
                target(Uuid::new_v4(), Some(("E001", "営業部")), vec![answer(q1, "3")]),
                target(Uuid::new_v4(), Some(("E002", "開発部")), vec![answer(q1, "5")]),
            ],
        );
        let org_id = survey.survey_targets[0]
            .user
            .employee
            .as_ref()
            .and_then(|e| e.organization.as_ref())
            .map(|o| o.id)
            .unwrap();
        // a target with no employee record never matches a filter
        survey.survey_targets.push(target(Uuid::new_v4(), None, vec![answer(q1, "1")]));

        let records = flatten_survey(&survey, Some(org_id));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].numeric_value, Some(3.0));
    }

    #[test]
    fn test_attribute_answers_are_flattened_too() {
        let attr_q = Uuid::new_v4();
        let survey = survey_with(
            vec![SurveyQuestionSpec::attribute(attr_q, "年代")],
            vec![target(
                Uuid::new_v4(),
                None,
                vec![attr_answer(attr_q, Some(Uuid::new_v4()), "20代")],
            )],
        );
        let records = flatten_survey(&survey, None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_role, QuestionRole::Category);
        assert_eq!(records[0].numeric_value, None);
    }
}
