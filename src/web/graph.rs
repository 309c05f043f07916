use crate::analysis::aggregate::{
    attach_category_deviation, attach_question_deviation, expand_by_tags, group_by_user_and_category,
    heatmap_by_organization, heatmap_by_user, overall_user_deviation, pivot_by_user, OrgHeatmapCell,
    UserCategoryGroup, UserHeatmapCell, UserOverallDeviation, UserPivot, NO_TAG_CATEGORY,
};
use crate::analysis::flatten::{flatten_survey, FlattenedRecord};
use crate::db;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphFormat {
    Raw,
    Grouped,
    Pivoted,
    Heatmap,
    UserHeatmap,
    #[default]
    All,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQuery {
    #[serde(default)]
    format: GraphFormat,
    organization_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphResponse {
    survey_id: Uuid,
    survey_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<Vec<FlattenedRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouped: Option<Vec<UserCategoryGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pivoted: Option<Vec<UserPivot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<Vec<OrgHeatmapCell>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_heatmap: Option<Vec<UserHeatmapCell>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overall: Option<Vec<UserOverallDeviation>>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/surveys/:id/graph", get(survey_graph))
        .with_state(state)
}

async fn survey_graph(
    Path(survey_id): Path<Uuid>,
    Query(query): Query<GraphQuery>,
    State(state): State<SharedState>,
) -> Result<Json<GraphResponse>, StatusCode> {
    let survey = db::load_survey(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let flattened = flatten_survey(&survey, query.organization_id);
    tracing::debug!(
        "survey_graph: survey={}, format={:?}, {} flattened records",
        survey_id,
        query.format,
        flattened.len()
    );

    let mut response = GraphResponse {
        survey_id: survey.id,
        survey_name: survey.name.clone(),
        raw: None,
        grouped: None,
        pivoted: None,
        heatmap: None,
        user_heatmap: None,
        overall: None,
    };

    if query.format == GraphFormat::Raw {
        response.raw = Some(flattened);
        return Ok(Json(response));
    }

    let raw = matches!(query.format, GraphFormat::All).then(|| flattened.clone());
    let scored = attach_question_deviation(flattened);
    let expanded = attach_category_deviation(expand_by_tags(scored.clone(), NO_TAG_CATEGORY));

    match query.format {
        GraphFormat::Raw => unreachable!("handled above"),
        GraphFormat::Grouped => response.grouped = Some(group_by_user_and_category(&expanded)),
        GraphFormat::Pivoted => response.pivoted = Some(pivot_by_user(&expanded)),
        GraphFormat::Heatmap => response.heatmap = Some(heatmap_by_organization(&expanded)),
        GraphFormat::UserHeatmap => response.user_heatmap = Some(heatmap_by_user(&expanded)),
        GraphFormat::All => {
            response.raw = raw;
            response.grouped = Some(group_by_user_and_category(&expanded));
            response.pivoted = Some(pivot_by_user(&expanded));
            response.heatmap = Some(heatmap_by_organization(&expanded));
            response.user_heatmap = Some(heatmap_by_user(&expanded));
            response.overall = Some(overall_user_deviation(&scored));
        }
    }

    Ok(Json(response))
}
