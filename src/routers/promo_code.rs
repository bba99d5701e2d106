use crate::models::api::prelude::*;
use crate::models::client::AuthedClient;
use crate::models::promo_code::{MAX_AMOUNT, MIN_AMOUNT, PromoCodeListItem};
use crate::services::promo::{PromoService, PromoServiceError};
use crate::services::promo_store::PromoError;
use crate::services::states::db::{PageQueryBinder, PageQueryResult};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

pub type PromoCodeRouterState = State<Arc<PromoService>>;

impl From<PromoServiceError> for ApiError {
    fn from(e: PromoServiceError) -> Self {
        match e {
            PromoServiceError::NotTeamMember(_) => {
                forbidden!(e, "You are not allowed to manage promo codes")
            }
            PromoServiceError::InvalidAmount(_) => bad_request!(
                e,
                format!("Amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}")
            ),
            PromoServiceError::InvalidCode => {
                bad_request!(e, "Promo code must be 6 letters or digits")
            }
            PromoServiceError::NotFound => not_found!(e, "Promo code not found"),
            PromoServiceError::AlreadyRedeemed => bad_request!(e, "Promo code already redeemed"),
            PromoServiceError::CreditFailed => {
                internal!(e, "Failed to credit your wallet, please try again")
            }
            PromoServiceError::CreditFailedUncompensated => {
                internal!(e, "Failed to credit your wallet, please contact support")
            }
            PromoServiceError::SagaAborted(_) => {
                internal!(e, "Redemption was interrupted, please contact support")
            }
            PromoServiceError::Identity(inner) => inner.into(),
            PromoServiceError::Store(inner @ PromoError::AmountOutOfRange) => bad_request!(
                inner,
                format!("Amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}")
            ),
            PromoServiceError::Store(inner @ PromoError::CodeSpaceExhausted { .. }) => {
                internal!(inner, "Failed to allocate a promo code")
            }
            PromoServiceError::Store(inner) => internal!(inner, "Database error"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePromoCodeReq {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromoCodeRes {
    pub code: String,
    pub amount: i64,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

/// Team check runs before the body is parsed, so outsiders always see 403.
pub async fn create_promo_code(
    caller: AuthedClient,
    State(promo): PromoCodeRouterState,
    body: Bytes,
) -> ApiResult<Json<GeneralResponse<CreatePromoCodeRes>>> {
    let member = promo.authorize_team(caller).await?;
    let ApiJson(req) = ApiJson::<CreatePromoCodeReq>::from_bytes(&body)?;
    let created = promo.create(member, req.amount).await?;
    Ok(general_json_res!(
        "Promo code created",
        CreatePromoCodeRes {
            code: created.code,
            amount: created.amount,
            created_at: created.created_at,
        }
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPromoCodeRes {
    pub code: String,
    pub amount: i64,
    pub is_redeemed: bool,
}

pub async fn preview_promo_code(
    _: AuthedClient,
    State(promo): PromoCodeRouterState,
    Path(code): Path<String>,
) -> ApiResult<Json<GeneralResponse<PreviewPromoCodeRes>>> {
    let preview = promo.preview(&code).await?;
    Ok(general_json_res!(
        "Promo code fetched",
        PreviewPromoCodeRes {
            code: preview.code,
            amount: preview.amount,
            is_redeemed: preview.is_redeemed,
        }
    ))
}

#[derive(Debug, Deserialize)]
pub struct RedeemPromoCodeReq {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemPromoCodeRes {
    pub code: String,
    pub amount: i64,
    pub message: String,
}

pub async fn redeem_promo_code(
    caller: AuthedClient,
    State(promo): PromoCodeRouterState,
    ApiJson(req): ApiJson<RedeemPromoCodeReq>,
) -> ApiResult<Json<GeneralResponse<RedeemPromoCodeRes>>> {
    let redeemed = promo.redeem(caller, &req.code).await?;
    let message = format!(
        "{}.{:02} has been added to your wallet",
        redeemed.amount / 100,
        redeemed.amount % 100
    );
    Ok(general_json_res!(
        "Promo code redeemed",
        RedeemPromoCodeRes {
            code: redeemed.code,
            amount: redeemed.amount,
            message,
        }
    ))
}

#[derive(Debug, Deserialize)]
pub struct PromoCodeListQueryReq {
    #[serde(flatten)]
    pub page_query: PageQueryBinder,
}

pub async fn list_promo_codes(
    caller: AuthedClient,
    State(promo): PromoCodeRouterState,
    body: Bytes,
) -> ApiResult<Json<GeneralResponse<PageQueryResult<PromoCodeListItem>>>> {
    let member = promo.authorize_team(caller).await?;
    let ApiJson(req) = ApiJson::<PromoCodeListQueryReq>::from_bytes(&body)?;
    let page = promo.list(member, req.page_query).await?;
    Ok(general_json_res!("Promo codes fetched", page))
}
