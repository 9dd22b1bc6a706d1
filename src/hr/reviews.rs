use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::performance_reviews;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = performance_reviews)]
#[diesel(treat_none_as_null = true)]
pub struct PerformanceReview {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub reviewer_id: Option<Uuid>,
    pub period: String,
    pub productivity_score: i32,
    pub quality_score: i32,
    pub teamwork_score: i32,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub employee_id: Uuid,
    pub period: String,
    pub productivity_score: i32,
    pub quality_score: i32,
    pub teamwork_score: i32,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub productivity_score: Option<i32>,
    pub quality_score: Option<i32>,
    pub teamwork_score: Option<i32>,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub employee_id: Option<Uuid>,
    pub period: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReviewSummary {
    pub employee_id: Uuid,
    pub review_count: i64,
    pub avg_productivity: f64,
    pub avg_quality: f64,
    pub avg_teamwork: f64,
    pub avg_overall: f64,
}

fn check_score(name: &str, value: i32) -> Result<(), ApiError> {
    if !(1..=5).contains(&value) {
        return Err(ApiError::Validation(format!("{name} must be between 1 and 5")));
    }
    Ok(())
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateReviewRequest>,
) -> Result<Json<ApiResponse<PerformanceReview>>, ApiError> {
    let reviewer_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("only managers write reviews".into()))?;
    check_score("productivity_score", req.productivity_score)?;
    check_score("quality_score", req.quality_score)?;
    check_score("teamwork_score", req.teamwork_score)?;

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let review = PerformanceReview {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        employee_id: req.employee_id,
        reviewer_id: Some(reviewer_id),
        period: req.period,
        productivity_score: req.productivity_score,
        quality_score: req.quality_score,
        teamwork_score: req.teamwork_score,
        comments: req.comments,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(performance_reviews::table)
        .values(&review)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(review)))
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<PerformanceReview>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = performance_reviews::table
        .filter(performance_reviews::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(own) = ctx.employee_id() {
        q = q.filter(performance_reviews::employee_id.eq(own));
    } else if let Some(employee_id) = query.employee_id {
        q = q.filter(performance_reviews::employee_id.eq(employee_id));
    }
    if let Some(period) = query.period {
        q = q.filter(performance_reviews::period.eq(period));
    }

    let list: Vec<PerformanceReview> = q
        .order(performance_reviews::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<ApiResponse<PerformanceReview>>, ApiError> {
    ctx.user_id()
        .ok_or_else(|| ApiError::Authorization("only managers edit reviews".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut review: PerformanceReview = performance_reviews::table
        .filter(performance_reviews::id.eq(id))
        .filter(performance_reviews::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("performance review".into()))?;

    if let Some(score) = req.productivity_score {
        check_score("productivity_score", score)?;
        review.productivity_score = score;
    }
    if let Some(score) = req.quality_score {
        check_score("quality_score", score)?;
        review.quality_score = score;
    }
    if let Some(score) = req.teamwork_score {
        check_score("teamwork_score", score)?;
        review.teamwork_score = score;
    }
    if let Some(comments) = req.comments {
        review.comments = Some(comments);
    }
    review.updated_at = Utc::now();

    diesel::update(performance_reviews::table.filter(performance_reviews::id.eq(id)))
        .set(&review)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(review)))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    ctx.require_admin()?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        performance_reviews::table
            .filter(performance_reviews::id.eq(id))
            .filter(performance_reviews::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("performance review".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub async fn employee_summary(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(employee_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReviewSummary>>, ApiError> {
    ctx.require_employee_access(employee_id)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let scores: Vec<(i32, i32, i32)> = performance_reviews::table
        .filter(performance_reviews::company_id.eq(ctx.company_id))
        .filter(performance_reviews::employee_id.eq(employee_id))
        .select((
            performance_reviews::productivity_score,
            performance_reviews::quality_score,
            performance_reviews::teamwork_score,
        ))
        .load(&mut conn)?;

    let count = scores.len() as i64;
    let (avg_productivity, avg_quality, avg_teamwork) = if count > 0 {
        let n = count as f64;
        (
            scores.iter().map(|(p, _, _)| *p as f64).sum::<f64>() / n,
            scores.iter().map(|(_, q, _)| *q as f64).sum::<f64>() / n,
            scores.iter().map(|(_, _, t)| *t as f64).sum::<f64>() / n,
        )
    } else {
        (0.0, 0.0, 0.0)
    };
    let avg_overall = if count > 0 {
        (avg_productivity + avg_quality + avg_teamwork) / 3.0
    } else {
        0.0
    };

    Ok(Json(ApiResponse::ok(ReviewSummary {
        employee_id,
        review_count: count,
        avg_productivity,
        avg_quality,
        avg_teamwork,
        avg_overall,
    })))
}

pub fn configure_reviews_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/hr/reviews", get(list_reviews).post(create_review))
        .route(
            "/api/hr/reviews/:id",
            put(update_review).delete(delete_review),
        )
        .route("/api/hr/reviews/summary/:employee_id", get(employee_summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        assert!(check_score("x", 1).is_ok());
        assert!(check_score("x", 5).is_ok());
        assert!(check_score("x", 0).is_err());
        assert!(check_score("x", 6).is_err());
    }
}
