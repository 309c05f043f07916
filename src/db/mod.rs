use crate::domain::survey::{
    Category, Employee, OrganizationRef, Question, QuestionGroup, QuestionGroupQuestion,
    QuestionRole, Response, ResponseDetail, Survey, SurveyTarget, SurveyUser, Tag,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

// categories are a shallow tree; the guard only stops pathological data
const MAX_CATEGORY_DEPTH: usize = 32;

#[derive(Debug, FromRow)]
struct SurveyRow {
    id: Uuid,
    name: String,
    question_group_id: Uuid,
}

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: Uuid,
    name: String,
    role: String,
    category_id: Option<Uuid>,
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    parent_id: Option<Uuid>,
}

#[derive(Debug, FromRow)]
struct TagRow {
    question_id: Uuid,
    name: String,
}

#[derive(Debug, FromRow)]
struct TargetRow {
    target_id: Uuid,
    user_id: Uuid,
    employee_number: Option<String>,
    organization_id: Option<Uuid>,
    organization_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct DetailRow {
    survey_target_id: Uuid,
    question_id: Uuid,
    created_at: DateTime<Utc>,
    question_option_id: Option<Uuid>,
    option_label: Option<String>,
    option_value: Option<String>,
    text_value: Option<String>,
}

/// Loads the full survey aggregate the analysis engine consumes: question
/// group with categories and tags, plus targets with their responses.
pub async fn load_survey(pool: &PgPool, survey_id: Uuid) -> Result<Option<Survey>> {
    let survey: Option<SurveyRow> = sqlx::query_as(
        r#"
        SELECT id, name, question_group_id
        FROM surveys
        WHERE id = $1
        "#,
    )
    .bind(survey_id)
    .fetch_optional(pool)
    .await?;
    let Some(survey) = survey else {
        return Ok(None);
    };

    let question_rows: Vec<QuestionRow> = sqlx::query_as(
        r#"
        SELECT q.id, q.name, q.role, q.category_id
        FROM question_group_questions qgq
        JOIN questions q ON q.id = qgq.question_id
        WHERE qgq.question_group_id = $1
        ORDER BY qgq.position ASC
        "#,
    )
    .bind(survey.question_group_id)
    .fetch_all(pool)
    .await?;

    let category_rows: Vec<CategoryRow> =
        sqlx::query_as("SELECT id, name, parent_id FROM categories")
            .fetch_all(pool)
            .await?;
    let categories: HashMap<Uuid, CategoryRow> =
        category_rows.into_iter().map(|row| (row.id, row)).collect();

    let question_ids: Vec<Uuid> = question_rows.iter().map(|q| q.id).collect();
    let tag_rows: Vec<TagRow> = sqlx::query_as(
        r#"
        SELECT qt.question_id, t.name
        FROM question_tags qt
        JOIN tags t ON t.id = qt.tag_id
        WHERE qt.question_id = ANY($1)
        ORDER BY t.name ASC
        "#,
    )
    .bind(&question_ids)
    .fetch_all(pool)
    .await?;
    let mut tags_by_question: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for row in tag_rows {
        tags_by_question
            .entry(row.question_id)
            .or_default()
            .push(Tag { name: row.name });
    }

    let questions: Vec<QuestionGroupQuestion> = question_rows
        .into_iter()
        .map(|row| {
            let role = QuestionRole::try_from(row.role.as_str()).unwrap_or_else(|_| {
                tracing::warn!(
                    "question {} has unknown role '{}', treating as NORMAL",
                    row.id,
                    row.role
                );
                QuestionRole::Normal
            });
            QuestionGroupQuestion {
                question: Question {
                    id: row.id,
                    name: row.name,
                    role,
                    category_id: row.category_id,
                    category: row
                        .category_id
                        .and_then(|id| build_category(id, &categories, MAX_CATEGORY_DEPTH)),
                    tags: tags_by_question.remove(&row.id).unwrap_or_default(),
                },
            }
        })
        .collect();

    let target_rows: Vec<TargetRow> = sqlx::query_as(
        r#"
        SELECT st.id AS target_id,
               u.id AS user_id,
               e.employee_number,
               o.id AS organization_id,
               o.name AS organization_name
        FROM survey_targets st
        JOIN users u ON u.id = st.user_id
        LEFT JOIN employees e ON e.user_id = u.id
        LEFT JOIN organizations o ON o.id = e.organization_id AND o.deleted_at IS NULL
        WHERE st.survey_id = $1
        ORDER BY st.created_at ASC
        "#,
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await?;

    let target_ids: Vec<Uuid> = target_rows.iter().map(|t| t.target_id).collect();
    let detail_rows: Vec<DetailRow> = sqlx::query_as(
        r#"
        SELECT r.survey_target_id,
               r.question_id,
               r.created_at,
               rd.question_option_id,
               rd.option_label,
               rd.option_value,
               rd.text_value
        FROM responses r
        JOIN response_details rd ON rd.response_id = r.id
        WHERE r.survey_target_id = ANY($1)
        ORDER BY r.created_at ASC, rd.id ASC
        "#,
    )
    .bind(&target_ids)
    .fetch_all(pool)
    .await?;

    // one Response per (target, question); detail rows append in query order
    let mut responses_by_target: HashMap<Uuid, Vec<Response>> = HashMap::new();
    let mut response_index: HashMap<(Uuid, Uuid), usize> = HashMap::new();
    for row in detail_rows {
        let detail = ResponseDetail {
            question_option_id: row.question_option_id,
            option_label: row.option_label,
            option_value: row.option_value,
            text_value: row.text_value,
        };
        let responses = responses_by_target.entry(row.survey_target_id).or_default();
        match response_index.get(&(row.survey_target_id, row.question_id)) {
            Some(index) => responses[*index].response_details.push(detail),
            None => {
                response_index.insert((row.survey_target_id, row.question_id), responses.len());
                responses.push(Response {
                    question_id: row.question_id,
                    created_at: row.created_at,
                    response_details: vec![detail],
                });
            }
        }
    }

    let survey_targets: Vec<SurveyTarget> = target_rows
        .into_iter()
        .map(|row| SurveyTarget {
            id: row.target_id,
            user: SurveyUser {
                id: row.user_id,
                employee: if row.employee_number.is_some() || row.organization_id.is_some() {
                    Some(Employee {
                        number: row.employee_number,
                        organization: match (row.organization_id, row.organization_name) {
                            (Some(id), Some(name)) => Some(OrganizationRef { id, name }),
                            _ => None,
                        },
                    })
                } else {
                    None
                },
            },
            responses: responses_by_target.remove(&row.target_id).unwrap_or_default(),
        })
        .collect();

    Ok(Some(Survey {
        id: survey.id,
        name: survey.name,
        question_group: QuestionGroup {
            question_group_questions: questions,
        },
        survey_targets,
    }))
}

fn build_category(
    id: Uuid,
    rows: &HashMap<Uuid, CategoryRow>,
    depth_guard: usize,
) -> Option<Category> {
    if depth_guard == 0 {
        return None;
    }
    let row = rows.get(&id)?;
    Some(Category {
        id: row.id,
        name: row.name.clone(),
        parent: row
            .parent_id
            .and_then(|parent_id| build_category(parent_id, rows, depth_guard - 1))
            .map(Box::new),
    })
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationNode {
    pub id: Uuid,
    pub name: String,
    pub leader_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

/// Flat company listing; parent comes from the depth-1 closure row.
pub async fn list_organizations(pool: &PgPool, company_id: Uuid) -> Result<Vec<OrganizationNode>> {
    let rows: Vec<OrganizationNode> = sqlx::query_as(
        r#"
        SELECT o.id, o.name, o.leader_id, rel.ancestor_id AS parent_id
        FROM organizations o
        LEFT JOIN organization_relationships rel
          ON rel.descendant_id = o.id AND rel.depth = 1 AND rel.deleted_at IS NULL
        WHERE o.company_id = $1 AND o.deleted_at IS NULL
        ORDER BY o.created_at ASC
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
