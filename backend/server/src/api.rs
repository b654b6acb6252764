//! Axum REST API handlers.
//!
//! Every handler delegates to [`FundingService`]; the only logic here is
//! request parsing and mapping [`FundingError`] onto HTTP statuses.

use std::str::FromStr;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use gated_funding::discovery::{CampaignOverview, CreatorDashboard, ExploreFilter, SortOrder};
use gated_funding::ledger::{DonorSummary, LeaderboardEntry, LedgerTotals};
use gated_funding::{
    Campaign, CampaignId, CampaignUpdate, Category, Contribution, ContributionReceipt,
    ContributionRequest, CreatorId, DonorId, FundingError, FundingService, NewCampaign,
    UnlockReport, ValidationError,
};

#[derive(Clone)]
pub struct ApiState {
    pub service: FundingService,
}

/// Build the full route table.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/campaigns", post(create_campaign).get(list_campaigns))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/:id/archive", post(archive_campaign))
        .route("/campaigns/:id/checkpoints", post(add_checkpoint))
        .route("/campaigns/:id/checkpoints/percentages", put(set_percentages))
        .route("/campaigns/:id/checkpoints/:index", delete(remove_checkpoint))
        .route(
            "/campaigns/:id/checkpoints/:index/percentage",
            put(update_percentage),
        )
        .route("/campaigns/:id/checkpoints/:index/proof", post(submit_proof))
        .route(
            "/campaigns/:id/checkpoints/:index/approve",
            post(approve_checkpoint),
        )
        .route("/campaigns/:id/unlock", get(unlock_status))
        .route(
            "/campaigns/:id/contributions",
            post(record_contribution).get(list_contributions),
        )
        .route("/campaigns/:id/leaderboard", get(leaderboard))
        .route("/campaigns/:id/updates", post(post_update).get(list_updates))
        .route("/donors/:id", get(donor_summary))
        .route("/creators/:id/dashboard", get(creator_dashboard))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    /// Actual percentage sum, present on `percentage_mismatch`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

/// [`FundingError`] rendered as a JSON response.
pub struct ApiError(FundingError);

impl From<FundingError> for ApiError {
    fn from(err: FundingError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            FundingError::Validation(_) | FundingError::PercentageMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            FundingError::StateTransition(_) => StatusCode::CONFLICT,
            FundingError::CampaignNotFound(_) | FundingError::CheckpointNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            FundingError::InvariantViolation(_) | FundingError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(kind = self.0.kind(), "request failed: {}", self.0);
        }
        let total = match &self.0 {
            FundingError::PercentageMismatch { total } => Some(*total),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind(),
            total,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ─────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────
//
// axum's own rejections answer in plain text; these wrappers turn them into
// `validation_error` responses so every failure shares one JSON shape.

/// JSON body extractor that rejects with [`ApiError`].
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::Request(rejection.body_text()).into()),
        }
    }
}

/// Query-string extractor that rejects with [`ApiError`].
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::Request(rejection.body_text()).into()),
        }
    }
}

/// Path extractor that rejects with [`ApiError`].
pub struct ValidPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::Request(rejection.body_text()).into()),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Query string for `GET /campaigns`.
#[derive(Debug, Default, Deserialize)]
pub struct ExploreQuery {
    /// Comma-separated category list.
    pub category: Option<String>,
    pub min_funded: Option<Decimal>,
    pub max_funded: Option<Decimal>,
    pub q: Option<String>,
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_archived: bool,
}

impl ExploreQuery {
    fn into_filter(self) -> Result<ExploreFilter, ValidationError> {
        let categories = match self.category.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Category::parse(s).ok_or_else(|| ValidationError::Malformed {
                        field: "category",
                        value: s.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(ExploreFilter {
            categories,
            min_percent_funded: self.min_funded,
            max_percent_funded: self.max_funded,
            search: self.q,
            include_archived: self.include_archived,
            sort: self.sort.unwrap_or_default(),
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCheckpointBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct PercentageBody {
    /// Wider than the stored `u8` so out-of-range values get a domain error.
    pub percentage: u32,
}

#[derive(Debug, Deserialize)]
pub struct PercentagesBody {
    pub percentages: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ProofBody {
    pub uri: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContributionBody {
    pub donor: Option<String>,
    /// Decimal string, e.g. `"25.50"`.
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ContributionsResponse {
    pub totals: LedgerTotals,
    pub contributions: Vec<Contribution>,
}

#[derive(Serialize)]
pub struct UnlockResponse {
    pub campaign_id: CampaignId,
    pub checked_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: UnlockReport,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /campaigns`
async fn create_campaign(
    State(state): State<ApiState>,
    ValidJson(body): ValidJson<NewCampaign>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let campaign = state.service.create_campaign(body).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// `GET /campaigns`
///
/// Explore listing: `?category=education,arts&min_funded=50&q=water&sort=most_funded`.
async fn list_campaigns(
    State(state): State<ApiState>,
    ValidQuery(query): ValidQuery<ExploreQuery>,
) -> ApiResult<ListResponse<CampaignOverview>> {
    let filter = query.into_filter()?;
    Ok(Json(state.service.explore(&filter).await?.into()))
}

/// `GET /campaigns/:id`
async fn get_campaign(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
) -> ApiResult<CampaignOverview> {
    Ok(Json(state.service.overview(CampaignId(id)).await?))
}

/// `POST /campaigns/:id/archive`
async fn archive_campaign(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
) -> ApiResult<Campaign> {
    Ok(Json(state.service.archive_campaign(CampaignId(id)).await?))
}

/// `POST /campaigns/:id/checkpoints`
async fn add_checkpoint(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
    ValidJson(body): ValidJson<AddCheckpointBody>,
) -> ApiResult<Campaign> {
    let campaign = state
        .service
        .add_checkpoint(CampaignId(id), body.title, body.description)
        .await?;
    Ok(Json(campaign))
}

/// `DELETE /campaigns/:id/checkpoints/:index`
async fn remove_checkpoint(
    State(state): State<ApiState>,
    ValidPath((id, index)): ValidPath<(u64, usize)>,
) -> ApiResult<Campaign> {
    Ok(Json(
        state.service.remove_checkpoint(CampaignId(id), index).await?,
    ))
}

/// `PUT /campaigns/:id/checkpoints/:index/percentage`
async fn update_percentage(
    State(state): State<ApiState>,
    ValidPath((id, index)): ValidPath<(u64, usize)>,
    ValidJson(body): ValidJson<PercentageBody>,
) -> ApiResult<Campaign> {
    let campaign = state
        .service
        .update_checkpoint_percentage(CampaignId(id), index, narrow_percentage(index, body.percentage)?)
        .await?;
    Ok(Json(campaign))
}

fn narrow_percentage(index: usize, value: u32) -> Result<u8, ApiError> {
    u8::try_from(value)
        .map_err(|_| ValidationError::PercentageOutOfRange { index, value }.into())
}

/// `PUT /campaigns/:id/checkpoints/percentages`
async fn set_percentages(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
    ValidJson(body): ValidJson<PercentagesBody>,
) -> ApiResult<Campaign> {
    let percentages = body
        .percentages
        .into_iter()
        .enumerate()
        .map(|(index, value)| narrow_percentage(index, value))
        .collect::<Result<Vec<_>, _>>()?;
    let campaign = state
        .service
        .set_checkpoint_percentages(CampaignId(id), percentages)
        .await?;
    Ok(Json(campaign))
}

/// `GET /campaigns/:id/unlock`
async fn unlock_status(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
) -> ApiResult<UnlockResponse> {
    let report = state.service.unlock_status(CampaignId(id)).await?;
    Ok(Json(UnlockResponse {
        campaign_id: CampaignId(id),
        checked_at: Utc::now(),
        report,
    }))
}

/// `POST /campaigns/:id/checkpoints/:index/proof`
async fn submit_proof(
    State(state): State<ApiState>,
    ValidPath((id, index)): ValidPath<(u64, usize)>,
    ValidJson(body): ValidJson<ProofBody>,
) -> ApiResult<Campaign> {
    let campaign = state
        .service
        .submit_proof(CampaignId(id), index, body.uri, body.note)
        .await?;
    Ok(Json(campaign))
}

/// `POST /campaigns/:id/checkpoints/:index/approve`
async fn approve_checkpoint(
    State(state): State<ApiState>,
    ValidPath((id, index)): ValidPath<(u64, usize)>,
) -> ApiResult<Campaign> {
    Ok(Json(
        state.service.approve_checkpoint(CampaignId(id), index).await?,
    ))
}

/// `POST /campaigns/:id/contributions`
async fn record_contribution(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
    ValidJson(body): ValidJson<ContributionBody>,
) -> Result<(StatusCode, Json<ContributionReceipt>), ApiError> {
    let amount =
        Decimal::from_str(body.amount.trim()).map_err(|_| ValidationError::Malformed {
            field: "amount",
            value: body.amount.clone(),
        })?;
    let donor = body
        .donor
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(DonorId);
    let receipt = state
        .service
        .record_contribution(CampaignId(id), ContributionRequest::direct(donor, amount))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /campaigns/:id/contributions`
async fn list_contributions(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
) -> ApiResult<ContributionsResponse> {
    let contributions = state.service.contributions(CampaignId(id)).await?;
    let totals = state.service.totals(CampaignId(id)).await?;
    Ok(Json(ContributionsResponse {
        totals,
        contributions,
    }))
}

/// `GET /campaigns/:id/leaderboard?limit=10`
async fn leaderboard(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
    ValidQuery(query): ValidQuery<LimitQuery>,
) -> ApiResult<ListResponse<LeaderboardEntry>> {
    let limit = query.limit.unwrap_or(10);
    Ok(Json(
        state
            .service
            .leaderboard(CampaignId(id), limit)
            .await?
            .into(),
    ))
}

/// `POST /campaigns/:id/updates`
async fn post_update(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
    ValidJson(body): ValidJson<UpdateBody>,
) -> Result<(StatusCode, Json<CampaignUpdate>), ApiError> {
    let update = state
        .service
        .post_update(CampaignId(id), body.title, body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(update)))
}

/// `GET /campaigns/:id/updates`
async fn list_updates(
    State(state): State<ApiState>,
    ValidPath(id): ValidPath<u64>,
) -> ApiResult<ListResponse<CampaignUpdate>> {
    Ok(Json(state.service.updates(CampaignId(id)).await?.into()))
}

/// `GET /donors/:id`
async fn donor_summary(
    State(state): State<ApiState>,
    ValidPath(donor): ValidPath<String>,
) -> ApiResult<DonorSummary> {
    Ok(Json(state.service.donor_summary(DonorId(donor)).await?))
}

/// `GET /creators/:id/dashboard`
async fn creator_dashboard(
    State(state): State<ApiState>,
    ValidPath(creator): ValidPath<String>,
) -> ApiResult<CreatorDashboard> {
    Ok(Json(
        state.service.creator_dashboard(CreatorId(creator)).await?,
    ))
}
