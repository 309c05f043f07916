use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionRole {
    /// Measured item (Likert-scale etc.), feeds numeric aggregates.
    Normal,
    /// Attribute/demographic question; its options segment respondents.
    Category,
}

impl QuestionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionRole::Normal => "NORMAL",
            QuestionRole::Category => "CATEGORY",
        }
    }
}

impl TryFrom<&str> for QuestionRole {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "NORMAL" => Ok(QuestionRole::Normal),
            "CATEGORY" => Ok(QuestionRole::Category),
            _ => Err(()),
        }
    }
}

/// Topic category with an optional parent chain (distinct from the CATEGORY
/// question role above).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub parent: Option<Box<Category>>,
}

impl Category {
    /// Names from the root ancestor down to this category, joined with ">".
    pub fn path(&self) -> String {
        let mut names = vec![self.name.clone()];
        let mut current = self.parent.as_deref();
        while let Some(parent) = current {
            names.push(parent.name.clone());
            current = parent.parent.as_deref();
        }
        names.reverse();
        names.join(">")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub name: String,
    pub role: QuestionRole,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGroupQuestion {
    pub question: Question,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGroup {
    pub question_group_questions: Vec<QuestionGroupQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub number: Option<String>,
    #[serde(default)]
    pub organization: Option<OrganizationRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyUser {
    pub id: Uuid,
    #[serde(default)]
    pub employee: Option<Employee>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetail {
    pub question_option_id: Option<Uuid>,
    pub option_label: Option<String>,
    pub option_value: Option<String>,
    pub text_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub question_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub response_details: Vec<ResponseDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyTarget {
    pub id: Uuid,
    pub user: SurveyUser,
    pub responses: Vec<Response>,
}

/// The full survey aggregate consumed by the analysis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: Uuid,
    pub name: String,
    pub question_group: QuestionGroup,
    pub survey_targets: Vec<SurveyTarget>,
}

impl Survey {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.question_group
            .question_group_questions
            .iter()
            .map(|qgq| &qgq.question)
    }
}
