use crate::analysis::filter::{
    parse_attr_param, parse_qcat_param, run_filtered_analysis, FilterParams, FilteredAnalysis,
};
use crate::db;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisQuery {
    /// Comma-separated `questionId:optionKey1|optionKey2` clauses.
    attr: Option<String>,
    /// Comma-separated question-category ids.
    qcat: Option<String>,
    organization_id: Option<Uuid>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/surveys/:id/analysis", get(survey_analysis))
        .with_state(state)
}

async fn survey_analysis(
    Path(survey_id): Path<Uuid>,
    Query(query): Query<AnalysisQuery>,
    State(state): State<SharedState>,
) -> Result<Json<FilteredAnalysis>, StatusCode> {
    let survey = db::load_survey(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let params = FilterParams {
        attr_filters: query.attr.as_deref().map(parse_attr_param).unwrap_or_default(),
        question_category_ids: query.qcat.as_deref().map(parse_qcat_param).unwrap_or_default(),
        organization_id: query.organization_id,
    };
    tracing::debug!(
        "survey_analysis: survey={}, {} attribute filters, {} category filters",
        survey_id,
        params.attr_filters.len(),
        params.question_category_ids.len()
    );

    Ok(Json(run_filtered_analysis(&survey, &params)))
}
