use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        biddtos::{BidPatch, CreateBidDto, ReplaceItemsDto},
        ApiResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::bidmodel::{Bid, BidItem},
    AppState,
};

pub fn bid_handler() -> Router {
    Router::new()
        .route("/bids", post(create_bid))
        .route("/bids/mine", get(get_my_bids))
        .route(
            "/bids/:id",
            get(get_bid).put(update_bid).delete(delete_bid),
        )
        .route("/bids/:id/items", put(replace_bid_items))
        .route("/bids/:id/submit", post(submit_bid))
        .route("/bids/:id/withdraw", post(withdraw_bid))
        .route("/bids/:id/accept", post(accept_bid))
        .route("/bids/:id/reject", post(reject_bid))
        .route("/bids/:id/start", post(start_project_from_bid))
        .route("/projects/:project_id/bids", get(get_project_bids))
}

#[derive(Debug, Serialize)]
pub struct BidWithItems {
    #[serde(flatten)]
    pub bid: Bid,
    pub items: Vec<BidItem>,
}

pub async fn create_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (bid, items) = app_state
        .bid_service
        .create_bid(&auth.user, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Bid created",
            BidWithItems { bid, items },
        )),
    ))
}

pub async fn update_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
    Json(body): Json<BidPatch>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .update_bid(auth.user.id, bid_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Bid updated", bid)))
}

pub async fn replace_bid_items(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
    Json(body): Json<ReplaceItemsDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let replaced = app_state
        .bid_service
        .replace_items(auth.user.id, bid_id, body.items)
        .await?;

    Ok(Json(ApiResponse::success("Bid items updated", replaced)))
}

pub async fn submit_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state.bid_service.submit(auth.user.id, bid_id).await?;
    Ok(Json(ApiResponse::success("Bid submitted", bid)))
}

pub async fn withdraw_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state.bid_service.withdraw(auth.user.id, bid_id).await?;
    Ok(Json(ApiResponse::success("Bid withdrawn", bid)))
}

pub async fn accept_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state.bid_service.accept(auth.user.id, bid_id).await?;
    Ok(Json(ApiResponse::success("Bid accepted", bid)))
}

pub async fn reject_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state.bid_service.reject(auth.user.id, bid_id).await?;
    Ok(Json(ApiResponse::success("Bid rejected", bid)))
}

pub async fn start_project_from_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .bid_service
        .start_project(auth.user.id, bid_id)
        .await?;
    Ok(Json(ApiResponse::success("Project started from bid", bid)))
}

pub async fn get_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let detail = app_state.bid_service.get_detail(auth.user.id, bid_id).await?;
    Ok(Json(ApiResponse::success("Bid retrieved", detail)))
}

pub async fn delete_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.bid_service.delete_bid(auth.user.id, bid_id).await?;
    Ok(Json(ApiResponse::success("Bid deleted", bid_id)))
}

pub async fn get_project_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state
        .bid_service
        .list_project_bids(auth.user.id, project_id)
        .await?;
    Ok(Json(ApiResponse::success("Project bids retrieved", bids)))
}

pub async fn get_my_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state.bid_service.list_my_bids(auth.user.id).await?;
    Ok(Json(ApiResponse::success("Bids retrieved", bids)))
}
