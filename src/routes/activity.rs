/**
 * Activity Routes
 * Daily activity calendar: month view, CSV export, streaks and admin edits
 */
use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Days, NaiveDate};
use std::future::Future;
use serde::{Deserialize, Serialize};

use crate::calendar::{self, Streaks};
use crate::config::CONFIG;
use crate::db::{self, models::ActivityDay};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::require_admin;
use crate::routes::OkResponse;

/// Header carrying the shared secret of the external daily trigger
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Initial number of days read when counting the current streak
const STREAK_WINDOW_DAYS: u64 = 62;

// ============================================================================
// Request/Response Types
// ============================================================================

/// `?year=YYYY&month=M`, kept as raw strings so bad input maps to our 400
#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub year: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BulkRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SetDayRequest {
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkTodayResponse {
    pub ok: bool,
    pub date: NaiveDate,
}

// ============================================================================
// Validation
// ============================================================================

impl MonthQuery {
    /// Validated (year, month) with month in 1..=12.
    pub fn parse(&self) -> ApiResult<(i32, u32)> {
        let invalid = || ApiError::bad_request("year and month (1-12) are required");

        let year = self
            .year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
            .filter(|y| *y > 0)
            .ok_or_else(invalid)?;
        let month = self
            .month
            .as_deref()
            .and_then(|m| m.trim().parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(invalid)?;

        Ok((year, month))
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    let well_formed = raw.len() == 10
        && raw
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });

    if !well_formed {
        return Err(ApiError::bad_request("date must be YYYY-MM-DD"));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("date must be YYYY-MM-DD"))
}

/// Admin token, or the cron secret when one is configured.
fn authorize_trigger(headers: &HeaderMap) -> ApiResult<()> {
    if let Some(expected) = CONFIG.cron_secret.as_deref() {
        let presented = headers
            .get(CRON_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented == Some(expected) {
            return Ok(());
        }
    }
    require_admin(headers).map(|_| ())
}

async fn month_rows(pool: &sqlx::PgPool, year: i32, month: u32) -> ApiResult<Vec<ActivityDay>> {
    let (start, end) =
        calendar::month_bounds(year, month).ok_or_else(|| ApiError::bad_request("Invalid month"))?;

    let rows = sqlx::query_as::<_, ActivityDay>(
        "SELECT date, active FROM activity WHERE date >= $1 AND date < $2 ORDER BY date ASC",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts the streak ending on `today`, reading the active dates of a
/// window ending on `today` and doubling it only while the streak fills it.
async fn current_streak_windowed<F, Fut>(today: NaiveDate, mut fetch: F) -> ApiResult<u32>
where
    F: FnMut(NaiveDate, NaiveDate) -> Fut,
    Fut: Future<Output = ApiResult<Vec<ActivityDay>>>,
{
    let mut window = STREAK_WINDOW_DAYS;
    loop {
        let from = today
            .checked_sub_days(Days::new(window - 1))
            .unwrap_or(NaiveDate::MIN);
        let rows = fetch(from, today).await?;
        let streak = calendar::current_streak(&calendar::active_dates(&rows), today);

        if u64::from(streak) < window || from == NaiveDate::MIN {
            return Ok(streak);
        }
        window = window.saturating_mul(2);
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/activity?year&month
pub async fn get_month(Query(query): Query<MonthQuery>) -> ApiResult<Json<Vec<ActivityDay>>> {
    let (year, month) = query.parse()?;
    let pool = db::pool()?;
    Ok(Json(month_rows(pool.as_ref(), year, month).await?))
}

/// GET /api/activity/export?year&month - CSV download
pub async fn export_month(Query(query): Query<MonthQuery>) -> ApiResult<impl IntoResponse> {
    let (year, month) = query.parse()?;
    let pool = db::pool()?;
    let rows = month_rows(pool.as_ref(), year, month).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    calendar::csv_filename(year, month)
                ),
            ),
        ],
        calendar::activity_csv(&rows),
    ))
}

/// GET /api/activity/streaks?year&month
pub async fn get_streaks(Query(query): Query<MonthQuery>) -> ApiResult<Json<Streaks>> {
    let (year, month) = query.parse()?;
    let pool = db::pool()?;
    let today = calendar::today(CONFIG.site_offset);

    let month_active = calendar::active_dates(&month_rows(pool.as_ref(), year, month).await?);

    let current = current_streak_windowed(today, |from, to| {
        let pool = pool.clone();
        async move {
            let rows = sqlx::query_as::<_, ActivityDay>(
                "SELECT date, active FROM activity WHERE active = TRUE AND date BETWEEN $1 AND $2",
            )
            .bind(from)
            .bind(to)
            .fetch_all(pool.as_ref())
            .await?;
            Ok::<_, ApiError>(rows)
        }
    })
    .await?;

    Ok(Json(Streaks {
        current,
        longest: calendar::longest_streak_in_month(&month_active, year, month),
    }))
}

/// POST /api/activity/bulk - Set every day in [start, end] (admin)
pub async fn bulk_set(
    headers: HeaderMap,
    Json(payload): Json<BulkRequest>,
) -> ApiResult<Json<OkResponse>> {
    require_admin(&headers)?;

    let (Some(start), Some(end), Some(active)) = (payload.start, payload.end, payload.active) else {
        return Err(ApiError::bad_request("start, end, active required"));
    };
    let start = parse_date(&start)?;
    let end = parse_date(&end)?;
    if start > end {
        return Err(ApiError::bad_request("start must not be after end"));
    }

    let pool = db::pool()?;

    let result = sqlx::query(
        r#"
        INSERT INTO activity (date, active)
        SELECT d::date, $3 FROM generate_series($1::date, $2::date, '1 day') AS g(d)
        ON CONFLICT (date) DO UPDATE SET active = EXCLUDED.active
        "#,
    )
    .bind(start)
    .bind(end)
    .bind(active)
    .execute(pool.as_ref())
    .await?;

    tracing::info!(%start, %end, active, days = result.rows_affected(), "activity bulk update");
    Ok(Json(OkResponse::ok()))
}

/// PUT /api/activity/{date} (admin)
pub async fn set_day(
    headers: HeaderMap,
    Path(date): Path<String>,
    Json(payload): Json<SetDayRequest>,
) -> ApiResult<Json<ActivityDay>> {
    require_admin(&headers)?;
    let date = parse_date(&date)?;
    let active = payload
        .active
        .ok_or_else(|| ApiError::bad_request("active must be boolean"))?;

    let pool = db::pool()?;

    let row = sqlx::query_as::<_, ActivityDay>(
        r#"
        INSERT INTO activity (date, active)
        VALUES ($1, $2)
        ON CONFLICT (date) DO UPDATE SET active = EXCLUDED.active
        RETURNING date, active
        "#,
    )
    .bind(date)
    .bind(active)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(Json(row))
}

/// POST /api/activity/mark-today - Admin or external scheduler
pub async fn mark_today(headers: HeaderMap) -> ApiResult<(StatusCode, Json<MarkTodayResponse>)> {
    authorize_trigger(&headers)?;
    let pool = db::pool()?;

    let date = calendar::today(CONFIG.site_offset);
    db::mark_active(pool.as_ref(), date).await?;

    tracing::info!(%date, "marked today active");
    Ok((StatusCode::OK, Json(MarkTodayResponse { ok: true, date })))
}
